//! The four immutable event record shapes.
//!
//! Dashboards, status commands and debugging derive all state from these
//! files; the framework never writes summaries or aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::swarm::{ReviewerSpec, WorkerSpec};
use super::worker::CycleOutcome;

/// Why the swarm stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    Completed,
    Interrupted,
    Error,
}

/// Reviewer verdict for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Approved,
    NeedsChanges,
    Rejected,
}

/// Written once at swarm launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedEvent {
    pub swarm_id: String,
    pub started_at: DateTime<Utc>,
    /// Orchestrator PID; readers combine it with started/stopped presence
    /// to decide liveness.
    pub pid: u32,
    pub config_path: String,
    pub workers: Vec<WorkerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<ReviewerSpec>,
}

/// Written once at swarm end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppedEvent {
    pub stopped_at: DateTime<Utc>,
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Written once per cycle per worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub worker_id: String,
    /// 1-indexed cycle number.
    pub cycle: u32,
    pub outcome: CycleOutcome,
    pub at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub claimed_task_ids: Vec<String>,
    #[serde(default)]
    pub recycled_tasks: Vec<String>,
    /// Truncated stderr/stdout when the outcome is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_snippet: Option<String>,
    pub review_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Written once per review round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub worker_id: String,
    pub cycle: u32,
    /// 1-indexed round number.
    pub round: u32,
    pub verdict: Verdict,
    pub at: DateTime<Utc>,
    pub reviewer_output: String,
    #[serde(default)]
    pub diff_files: Vec<String>,
}
