//! oompa - parallel agent-worker swarm orchestrator.
//!
//! Drives long-running agent CLI processes through cycles of
//! {isolate, work, signal, review, merge, record} against a shared git
//! repository:
//! - a filesystem task queue whose state is encoded by directories and
//!   mutated only by atomic renames
//! - per-cycle isolated git worktrees
//! - serialized integration onto main under a single process-wide mutex
//! - a bounded reviewer propose-fix loop
//! - an append-only event log written with tmp+rename

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
