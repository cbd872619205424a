//! Swarm, worker and reviewer configuration records.
//!
//! Immutable after swarm start. Parsing and validation live in the
//! configuration loader; these are the records the rest of the system
//! consumes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Supported agent-CLI harness kinds.
///
/// The set is a configuration enumeration; an unknown kind is a
/// launch-time error, raised by the harness registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarnessKind {
    ClaudeCode,
    Codex,
}

impl std::fmt::Display for HarnessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for HarnessKind {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "claude-code" => Ok(Self::ClaudeCode),
            "codex" => Ok(Self::Codex),
            other => Err(DomainError::UnknownHarness(other.to_string())),
        }
    }
}

/// Configuration for one worker seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Positional identifier (`w0`, `w1`, ...), assigned at load time.
    #[serde(default)]
    pub id: String,
    /// Which agent CLI drives this worker.
    pub harness: HarnessKind,
    /// Model name passed through to the harness.
    pub model: String,
    /// Optional reasoning-effort tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Maximum cycles before the worker retires as exhausted.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    /// Prompt files concatenated into the fresh-start prompt.
    #[serde(default)]
    pub prompts: Vec<PathBuf>,
    /// Whether this worker may run with an empty task store.
    #[serde(default = "default_true")]
    pub can_plan: bool,
    /// Seconds to sleep between cycles (from cycle 2 on).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_between: Option<u64>,
    /// Whether the swarm reviewer (if any) adjudicates this worker's output.
    #[serde(default = "default_true")]
    pub review: bool,
}

/// Configuration for the optional reviewer seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerSpec {
    pub harness: HarnessKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Propose-fix rounds before a change is treated as not approved.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Optional file with the reviewer's standing instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PathBuf>,
}

/// Knobs shared by the whole swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmSettings {
    /// Integration branch workers merge into.
    pub main_branch: String,
    /// Task-store root, relative to the project root.
    pub tasks_root: PathBuf,
    /// Event-log root, relative to the project root.
    pub runs_root: PathBuf,
    /// Consecutive no-signal cycles tolerated before the stuck nudge.
    pub working_resumes_max: u32,
    /// Backpressure poll interval for `can_plan = false` workers.
    pub task_poll_secs: u64,
    /// Backpressure ceiling; past it the worker proceeds anyway.
    pub task_poll_timeout_secs: u64,
    /// Per-cycle subprocess timeout, enforced by the harness runner.
    pub subprocess_timeout_secs: u64,
    /// Grace window for workers to finish their cycle on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            tasks_root: PathBuf::from("tasks"),
            runs_root: PathBuf::from("runs"),
            working_resumes_max: 3,
            task_poll_secs: 5,
            task_poll_timeout_secs: 60,
            subprocess_timeout_secs: 300,
            shutdown_grace_secs: 10,
        }
    }
}

/// One orchestrator invocation: workers, optional reviewer, settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Short opaque identifier, 8 hex chars, generated at launch.
    pub id: String,
    /// Path of the config file this swarm was declared in.
    pub config_path: PathBuf,
    /// Worker seats in positional order. A planner seat, when declared,
    /// occupies position zero.
    pub workers: Vec<WorkerSpec>,
    /// At most one reviewer seat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<ReviewerSpec>,
    #[serde(default)]
    pub settings: SwarmSettings,
}

impl SwarmConfig {
    /// Generate a fresh swarm identifier: the first 8 hex chars of a v4 UUID.
    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_cycles() -> u32 {
    10
}

const fn default_max_rounds() -> u32 {
    3
}
