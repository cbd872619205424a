//! Task records and the directory-encoded task state.
//!
//! A task is a YAML file; its state is the directory that contains it
//! (`pending/`, `current/` or `complete/`), never a field inside the
//! record. Transitions between states are single atomic renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work handed to agent workers through the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, unique across the swarm.
    pub id: String,
    /// Short human-readable summary.
    pub summary: String,
    /// Longer description for the agent prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target file paths, if the author scoped the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Acceptance criteria, free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<String>,
    /// Difficulty tag (e.g. "easy", "hard").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Priority; larger is more urgent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Appended by the framework after a successful merge.
    #[serde(flatten)]
    pub completion: Option<CompletionStamp>,
}

/// Metadata the framework appends to a task file once its change has
/// landed on the main branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStamp {
    /// Worker that carried the task to a merge.
    pub completed_by: String,
    /// When the merge landed.
    pub completed_at: DateTime<Utc>,
    /// Review rounds the change went through.
    pub review_rounds: u32,
    /// Short hash of the merge commit on main.
    pub merged_commit: String,
}

impl Task {
    /// Create a task with only the required attributes set.
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            description: None,
            files: Vec::new(),
            acceptance: None,
            difficulty: None,
            priority: None,
            completion: None,
        }
    }

    /// Filename stem for this task's id: non-alphanumeric chars map to `-`.
    pub fn file_stem(&self) -> String {
        file_stem_for(&self.id)
    }
}

/// Derive a filesystem-safe filename stem from a task id.
pub fn file_stem_for(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// The three directory-encoded states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Current,
    Complete,
}

impl TaskState {
    /// Directory name that encodes this state under the task-store root.
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Current => "current",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Per-id outcome of a claim attempt against the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimResult {
    /// The rename from pending to current won.
    Claimed,
    /// No task with this id exists anywhere in the store.
    NotFound,
    /// Another worker already holds the task.
    AlreadyClaimed,
}

impl std::fmt::Display for ClaimResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Claimed => "claimed",
            Self::NotFound => "not-found",
            Self::AlreadyClaimed => "already-claimed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_maps_non_alphanumeric() {
        assert_eq!(file_stem_for("task-001"), "task-001");
        assert_eq!(file_stem_for("fix login/auth"), "fix-login-auth");
        assert_eq!(file_stem_for("a.b:c"), "a-b-c");
    }

    #[test]
    fn test_task_roundtrip_without_completion() {
        let task = Task::new("task-001", "Fix the login page");
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(!yaml.contains("completed_by"));
        let back: Task = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_completion_stamp_flattens() {
        let mut task = Task::new("task-002", "Add pagination");
        task.completion = Some(CompletionStamp {
            completed_by: "w0".to_string(),
            completed_at: Utc::now(),
            review_rounds: 2,
            merged_commit: "abc1234".to_string(),
        });
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(yaml.contains("completed_by: w0"));
        assert!(yaml.contains("merged_commit: abc1234"));
        let back: Task = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.completion.unwrap().review_rounds, 2);
    }

    #[test]
    fn test_state_dir_names() {
        assert_eq!(TaskState::Pending.dir_name(), "pending");
        assert_eq!(TaskState::Current.dir_name(), "current");
        assert_eq!(TaskState::Complete.dir_name(), "complete");
    }
}
