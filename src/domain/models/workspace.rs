//! Workspace handles.

use std::path::PathBuf;

/// An isolated per-cycle git worktree a worker mutates freely.
///
/// Created at cycle start, destroyed at cycle end (or carried into the
/// next cycle while the worker is resuming). A workspace exists iff its
/// worker holds the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Absolute path of the worktree directory.
    pub dir: PathBuf,
    /// Branch the worktree has checked out (`oompa/{worker}-c{cycle}`).
    pub branch: String,
    /// Stable dir slug, `{worker-id}-c{cycle}`.
    pub slug: String,
}

impl Workspace {
    /// Slug for a worker/cycle pair.
    pub fn slug_for(worker_id: &str, cycle: u32) -> String {
        format!("{worker_id}-c{cycle}")
    }

    /// Branch name for a worker/cycle pair.
    pub fn branch_for(worker_id: &str, cycle: u32) -> String {
        format!("oompa/{worker_id}-c{cycle}")
    }
}
