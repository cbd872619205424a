//! Worker runtime state and the cycle-outcome vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::swarm::WorkerSpec;
use super::workspace::Workspace;

/// Why a worker's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    /// Ran its full cycle budget.
    Exhausted,
    /// Hit the consecutive-error cap.
    Error,
    /// Stopped by the shutdown controller.
    Interrupted,
}

/// Outcome of one cycle, written once per cycle into its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    Merged,
    Rejected,
    Error,
    NoChanges,
    Done,
    Working,
    ExecutorDone,
    Claimed,
    SyncFailed,
    MergeFailed,
    Interrupted,
    Stuck,
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Merged => "merged",
            Self::Rejected => "rejected",
            Self::Error => "error",
            Self::NoChanges => "no-changes",
            Self::Done => "done",
            Self::Working => "working",
            Self::ExecutorDone => "executor-done",
            Self::Claimed => "claimed",
            Self::SyncFailed => "sync-failed",
            Self::MergeFailed => "merge-failed",
            Self::Interrupted => "interrupted",
            Self::Stuck => "stuck",
        };
        f.write_str(s)
    }
}

/// Typed per-worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub merges: u32,
    pub rejections: u32,
    pub errors: u32,
    pub recycled: u32,
    pub review_rounds_total: u32,
    pub claims: u32,
}

/// Mutable state a worker accumulates while executing.
///
/// The configuration is immutable after swarm start; everything else
/// here changes from cycle to cycle.
#[derive(Debug)]
pub struct WorkerState {
    pub spec: WorkerSpec,
    /// Cycles finished so far (also the 0-based index of the next cycle).
    pub cycles_completed: u32,
    /// Cycles in a row that ended with outcome `error`.
    pub consecutive_errors: u32,
    /// Harness session identifier, when the harness tracks sessions.
    pub session_id: Option<String>,
    /// Workspace carried into the next cycle while resuming.
    pub workspace: Option<Workspace>,
    /// Whether the next agent run resumes the previous session.
    pub resume: bool,
    /// Prompt to use verbatim on the next resume, if queued.
    pub prompt_override: Option<String>,
    /// Consecutive cycles that produced no terminal signal.
    pub working_resumes: u32,
    /// Task ids this worker currently holds in `current/`.
    pub claimed: BTreeSet<String>,
    pub metrics: WorkerMetrics,
}

impl WorkerState {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            cycles_completed: 0,
            consecutive_errors: 0,
            session_id: None,
            workspace: None,
            resume: false,
            prompt_override: None,
            working_resumes: 0,
            claimed: BTreeSet::new(),
            metrics: WorkerMetrics::default(),
        }
    }

    /// Forget the session: the next cycle starts fresh.
    ///
    /// The workspace handle is released separately by the engine, which
    /// owns the destroy side effect.
    pub fn reset_session(&mut self) {
        self.session_id = None;
        self.resume = false;
        self.prompt_override = None;
        self.working_resumes = 0;
    }
}
