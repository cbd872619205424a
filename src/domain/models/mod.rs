//! Domain models
//!
//! Pure domain entities with validation rules. These models are
//! framework-agnostic and contain no infrastructure concerns.

pub mod event;
pub mod signal;
pub mod swarm;
pub mod task;
pub mod worker;
pub mod workspace;

pub use event::{CycleEvent, ReviewEvent, StartedEvent, StopReason, StoppedEvent, Verdict};
pub use signal::Signal;
pub use swarm::{HarnessKind, ReviewerSpec, SwarmConfig, SwarmSettings, WorkerSpec};
pub use task::{ClaimResult, CompletionStamp, Task, TaskState};
pub use worker::{CycleOutcome, WorkerMetrics, WorkerState, WorkerStatus};
pub use workspace::Workspace;
