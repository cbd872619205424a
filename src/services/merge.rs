//! Merge coordinator.
//!
//! Serializes integration of approved work onto the main branch. The
//! mutex here is the only explicit mutual-exclusion primitive in the
//! system: at most one worker is ever inside the critical section, so
//! the shared repository index is never mutated by two workers at once.
//! Ordering across workers is not a contract; whoever acquires wins.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::CompletionStamp;
use crate::domain::models::Workspace;
use crate::services::task_store::TaskStore;
use crate::services::workspace::WorkspaceService;

/// Serialized merge of workspace branches into main.
pub struct MergeCoordinator {
    project_root: PathBuf,
    main_branch: String,
    store: Arc<TaskStore>,
    workspaces: Arc<WorkspaceService>,
    lock: Mutex<()>,
}

impl MergeCoordinator {
    pub fn new(
        project_root: impl Into<PathBuf>,
        main_branch: impl Into<String>,
        store: Arc<TaskStore>,
        workspaces: Arc<WorkspaceService>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            main_branch: main_branch.into(),
            store,
            workspaces,
            lock: Mutex::new(()),
        }
    }

    /// Integrate the workspace branch into main.
    ///
    /// On success the claimed tasks move `current/` → `complete/` and are
    /// stamped with `{completed_by, completed_at, review_rounds,
    /// merged_commit}`; returns the short merge hash. On failure the
    /// merge is aborted (hard reset as a last resort) and `None` is
    /// returned. The mutex is released on every path, panic included.
    pub async fn merge(
        &self,
        workspace: &Workspace,
        worker_id: &str,
        claimed_ids: &[String],
        review_rounds: u32,
    ) -> DomainResult<Option<String>> {
        let _guard = self.lock.lock().await;

        self.workspaces
            .commit_residual(workspace, &format!("oompa {}: cycle work", workspace.slug))
            .await?;

        self.git_must(&["checkout", &self.main_branch]).await?;

        let merge = self.git(&["merge", "--no-edit", &workspace.branch]).await?;
        if !merge.status.success() {
            warn!(
                branch = %workspace.branch,
                stderr = %String::from_utf8_lossy(&merge.stderr).trim(),
                "Merge into main failed, aborting"
            );
            let abort = self.git(&["merge", "--abort"]).await?;
            if !abort.status.success() {
                error!(branch = %workspace.branch, "Merge abort failed, hard-resetting main");
                let _ = self.git(&["reset", "--hard", "HEAD"]).await;
            }
            return Ok(None);
        }

        let commit = self.git_ok(&["rev-parse", "--short", "HEAD"]).await?;
        let commit = commit.trim().to_string();
        info!(worker_id = %worker_id, commit = %commit, branch = %workspace.branch, "Merged into main");

        self.store.complete_by_ids(claimed_ids).await?;
        for id in claimed_ids {
            self.store
                .annotate_completion(
                    id,
                    CompletionStamp {
                        completed_by: worker_id.to_string(),
                        completed_at: Utc::now(),
                        review_rounds,
                        merged_commit: commit.clone(),
                    },
                )
                .await?;
        }

        Ok(Some(commit))
    }

    async fn git(&self, args: &[&str]) -> DomainResult<std::process::Output> {
        git_in(&self.project_root, args).await
    }

    async fn git_ok(&self, args: &[&str]) -> DomainResult<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(DomainError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn git_must(&self, args: &[&str]) -> DomainResult<()> {
        self.git_ok(args).await.map(|_| ())
    }
}

async fn git_in(cwd: &Path, args: &[&str]) -> DomainResult<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| DomainError::Git(format!("failed to run git {}: {e}", args.join(" "))))
}
