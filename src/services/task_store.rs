//! Filesystem task store.
//!
//! The only mechanism by which tasks move between states. State is
//! encoded by the containing directory (`pending/`, `current/`,
//! `complete/`) and every transition is a single `rename`, atomic on a
//! same-volume filesystem. A failed rename leaves the task where it
//! was; there is no split brain. No other module performs these
//! renames.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::{file_stem_for, ClaimResult, CompletionStamp, Task, TaskState};

/// Atomic filesystem-backed task queue shared by racing workers.
#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
    /// A store rooted at `root` (typically `{project-root}/tasks`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the three state directories if absent.
    pub async fn ensure_layout(&self) -> DomainResult<()> {
        for state in [TaskState::Pending, TaskState::Current, TaskState::Complete] {
            fs::create_dir_all(self.state_dir(state)).await?;
        }
        Ok(())
    }

    fn state_dir(&self, state: TaskState) -> PathBuf {
        self.root.join(state.dir_name())
    }

    fn task_path(&self, state: TaskState, id: &str) -> PathBuf {
        self.state_dir(state).join(format!("{}.yaml", file_stem_for(id)))
    }

    /// Enumerate task records in one state, ordered by filename.
    pub async fn list(&self, state: TaskState) -> DomainResult<Vec<Task>> {
        let dir = self.state_dir(state);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut tasks = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = fs::read_to_string(&path).await?;
            match serde_yaml::from_str::<Task>(&raw) {
                Ok(task) => tasks.push(task),
                Err(err) => {
                    // A malformed file must not wedge the whole queue.
                    warn!(path = %path.display(), error = %err, "Skipping unreadable task file");
                }
            }
        }
        Ok(tasks)
    }

    /// Set of task ids currently in one state.
    pub async fn ids_in(&self, state: TaskState) -> DomainResult<BTreeSet<String>> {
        Ok(self.list(state).await?.into_iter().map(|t| t.id).collect())
    }

    /// Whether `pending/` holds no tasks.
    pub async fn pending_is_empty(&self) -> DomainResult<bool> {
        Ok(self.ids_in(TaskState::Pending).await?.is_empty())
    }

    /// Attempt to claim each id: `pending/{id}.yaml` → `current/{id}.yaml`.
    ///
    /// Concurrent claims by different workers resolve atomically at the
    /// rename: exactly one wins per id, the loser observes
    /// `already-claimed`.
    pub async fn claim_by_ids(&self, ids: &[String]) -> DomainResult<Vec<(String, ClaimResult)>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let from = self.task_path(TaskState::Pending, id);
            let to = self.task_path(TaskState::Current, id);
            let result = match fs::rename(&from, &to).await {
                Ok(()) => ClaimResult::Claimed,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    if self.task_path(TaskState::Current, id).exists()
                        || self.task_path(TaskState::Complete, id).exists()
                    {
                        ClaimResult::AlreadyClaimed
                    } else {
                        ClaimResult::NotFound
                    }
                }
                Err(err) => return Err(err.into()),
            };
            debug!(task_id = %id, result = %result, "Claim attempt");
            results.push((id.clone(), result));
        }
        Ok(results)
    }

    /// Move tasks `current/` → `complete/`. Framework-only, called after
    /// a successful merge.
    pub async fn complete_by_ids(&self, ids: &[String]) -> DomainResult<()> {
        for id in ids {
            let from = self.task_path(TaskState::Current, id);
            let to = self.task_path(TaskState::Complete, id);
            fs::rename(&from, &to)
                .await
                .map_err(|_| DomainError::TaskNotFound(id.clone()))?;
        }
        Ok(())
    }

    /// Move tasks `current/` → `pending/` after an aborted cycle.
    ///
    /// Idempotent: an id already back in `pending/` (or absent from
    /// `current/`) is skipped. Returns the ids actually recycled.
    pub async fn recycle_by_ids(&self, ids: &[String]) -> DomainResult<Vec<String>> {
        let mut recycled = Vec::new();
        for id in ids {
            let from = self.task_path(TaskState::Current, id);
            let to = self.task_path(TaskState::Pending, id);
            match fs::rename(&from, &to).await {
                Ok(()) => recycled.push(id.clone()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(recycled)
    }

    /// Write a new task file into `pending/`.
    pub async fn create(&self, task: &Task) -> DomainResult<PathBuf> {
        self.ensure_layout().await?;
        let path = self.task_path(TaskState::Pending, &task.id);
        let yaml = serde_yaml::to_string(task)?;
        fs::write(&path, yaml).await?;
        Ok(path)
    }

    /// Append the completion stamp to a task already in `complete/`.
    pub async fn annotate_completion(&self, id: &str, stamp: CompletionStamp) -> DomainResult<()> {
        let path = self.task_path(TaskState::Complete, id);
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|_| DomainError::TaskNotFound(id.to_string()))?;
        let mut task: Task = serde_yaml::from_str(&raw)?;
        task.completion = Some(stamp);
        fs::write(&path, serde_yaml::to_string(&task)?).await?;
        Ok(())
    }
}
