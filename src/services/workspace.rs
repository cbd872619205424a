//! Workspace manager.
//!
//! Creates and destroys per-cycle isolated git worktrees, inspects the
//! changes a worker produced, and syncs a workspace branch with main
//! ahead of a merge. Conflict resolution after a failed sync is driven
//! by the engine (it owns the agent subprocess); this module exposes
//! the begin/finish/abort seams around it. Syncing runs outside the
//! merge-coordinator lock.

use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Workspace;

/// Result of merging main into a workspace branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Clean merge; the branch now contains main.
    Synced,
    /// The merge stopped on conflicts in these files and is still open.
    Conflicted(Vec<String>),
    /// The merge could not proceed and was aborted.
    Failed,
}

/// Per-cycle worktree lifecycle and inspection.
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    project_root: PathBuf,
    main_branch: String,
    tasks_root: PathBuf,
}

impl WorkspaceService {
    pub fn new(
        project_root: impl Into<PathBuf>,
        main_branch: impl Into<String>,
        tasks_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            main_branch: main_branch.into(),
            tasks_root: tasks_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Create a fresh workspace for `{worker_id}-c{cycle}` from current
    /// main, force-removing any stale worktree or branch left at the
    /// same slug by a previous run.
    pub async fn acquire(&self, worker_id: &str, cycle: u32) -> DomainResult<Workspace> {
        let slug = Workspace::slug_for(worker_id, cycle);
        let branch = Workspace::branch_for(worker_id, cycle);
        let dir = self.project_root.join(format!(".w{slug}"));
        let dir_str = dir.display().to_string();

        // Stale state from a crashed run is removed, not reused.
        let _ = self
            .git(&self.project_root, &["worktree", "remove", "--force", &dir_str])
            .await;
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
        }
        let _ = self.git(&self.project_root, &["worktree", "prune"]).await;
        let _ = self.git(&self.project_root, &["branch", "-D", &branch]).await;

        let output = self
            .git(
                &self.project_root,
                &["worktree", "add", "-b", &branch, &dir_str, &self.main_branch],
            )
            .await?;
        if !output.status.success() {
            return Err(DomainError::Workspace(format!(
                "worktree add failed for {slug}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(slug = %slug, branch = %branch, "Workspace created");
        Ok(Workspace { dir, branch, slug })
    }

    /// Force-remove the worktree and delete its branch. Idempotent.
    pub async fn release(&self, workspace: &Workspace) -> DomainResult<()> {
        let dir_str = workspace.dir.display().to_string();
        let _ = self
            .git(&self.project_root, &["worktree", "remove", "--force", &dir_str])
            .await;
        if workspace.dir.exists() {
            fs::remove_dir_all(&workspace.dir).await?;
        }
        let _ = self.git(&self.project_root, &["worktree", "prune"]).await;
        let _ = self.git(&self.project_root, &["branch", "-D", &workspace.branch]).await;
        debug!(slug = %workspace.slug, "Workspace released");
        Ok(())
    }

    /// True when uncommitted changes exist or the branch has commits
    /// ahead of main.
    pub async fn has_changes(&self, workspace: &Workspace) -> DomainResult<bool> {
        let status = self.git_ok(&workspace.dir, &["status", "--porcelain"]).await?;
        if !status.trim().is_empty() {
            return Ok(true);
        }
        let range = format!("{}..HEAD", self.main_branch);
        let ahead = self.git_ok(&workspace.dir, &["rev-list", "--count", &range]).await?;
        Ok(ahead.trim().parse::<u64>().unwrap_or(0) > 0)
    }

    /// Files changed vs. main, committed or not, including untracked.
    pub async fn diff_filenames(&self, workspace: &Workspace) -> DomainResult<Vec<String>> {
        let mut files: Vec<String> = self
            .git_ok(&workspace.dir, &["diff", "--name-only", &self.main_branch])
            .await?
            .lines()
            .map(ToString::to_string)
            .collect();

        let status = self.git_ok(&workspace.dir, &["status", "--porcelain"]).await?;
        for line in status.lines() {
            if let Some(path) = line.strip_prefix("?? ") {
                files.push(path.to_string());
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    /// True iff every changed path lives under the task-store root.
    pub fn task_only_diff(&self, files: &[String]) -> bool {
        !files.is_empty()
            && files
                .iter()
                .all(|f| Path::new(f).starts_with(&self.tasks_root))
    }

    /// Workspace diff vs. main as text, truncated to `limit` chars.
    pub async fn diff_text(&self, workspace: &Workspace, limit: usize) -> DomainResult<String> {
        let mut diff = self.git_ok(&workspace.dir, &["diff", &self.main_branch]).await?;
        if diff.len() > limit {
            let mut cut = limit;
            while !diff.is_char_boundary(cut) {
                cut -= 1;
            }
            diff.truncate(cut);
            diff.push_str("\n[diff truncated]\n");
        }
        Ok(diff)
    }

    /// Commit anything uncommitted in the workspace. No-op when clean.
    pub async fn commit_residual(&self, workspace: &Workspace, message: &str) -> DomainResult<()> {
        let status = self.git_ok(&workspace.dir, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Ok(());
        }
        self.git_must(&workspace.dir, &["add", "-A"]).await?;
        self.git_must(&workspace.dir, &["commit", "--no-verify", "-m", message]).await?;
        Ok(())
    }

    /// Merge main into the workspace branch.
    ///
    /// On a clean merge returns [`SyncOutcome::Synced`]. On conflicts the
    /// merge is left open and the conflicted files are returned so the
    /// caller can run its resolver, then call [`Self::finish_sync`].
    pub async fn begin_sync(&self, workspace: &Workspace) -> DomainResult<SyncOutcome> {
        self.commit_residual(workspace, &format!("oompa {}: cycle work", workspace.slug))
            .await?;

        let output = self
            .git(&workspace.dir, &["merge", "--no-edit", &self.main_branch])
            .await?;
        if output.status.success() {
            return Ok(SyncOutcome::Synced);
        }

        let conflicted: Vec<String> = self
            .git_ok(&workspace.dir, &["diff", "--name-only", "--diff-filter=U"])
            .await?
            .lines()
            .map(ToString::to_string)
            .collect();

        if conflicted.is_empty() {
            // Merge failed for a reason conflict resolution cannot help.
            warn!(
                slug = %workspace.slug,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Sync merge failed without conflicts"
            );
            self.abort_sync(workspace).await;
            return Ok(SyncOutcome::Failed);
        }

        info!(slug = %workspace.slug, files = conflicted.len(), "Sync stopped on conflicts");
        Ok(SyncOutcome::Conflicted(conflicted))
    }

    /// After the resolver ran, commit the resolution if no conflict
    /// markers remain; otherwise abort the merge.
    pub async fn finish_sync(&self, workspace: &Workspace, conflicted: &[String]) -> DomainResult<bool> {
        for file in conflicted {
            let path = workspace.dir.join(file);
            let content = fs::read_to_string(&path).await.unwrap_or_default();
            if content.contains("<<<<<<<") || content.contains(">>>>>>>") {
                warn!(slug = %workspace.slug, file = %file, "Conflict markers remain, aborting sync");
                self.abort_sync(workspace).await;
                return Ok(false);
            }
        }

        self.git_must(&workspace.dir, &["add", "-A"]).await?;
        let commit = self.git(&workspace.dir, &["commit", "--no-edit", "--no-verify"]).await?;
        if !commit.status.success() {
            self.abort_sync(workspace).await;
            return Ok(false);
        }
        Ok(true)
    }

    /// Abort an open merge, ignoring failure (there may be none open).
    pub async fn abort_sync(&self, workspace: &Workspace) {
        let _ = self.git(&workspace.dir, &["merge", "--abort"]).await;
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> DomainResult<Output> {
        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| DomainError::Git(format!("failed to run git {}: {e}", args.join(" "))))
    }

    /// Run git and return stdout; the command itself must succeed.
    async fn git_ok(&self, cwd: &Path, args: &[&str]) -> DomainResult<String> {
        let output = self.git(cwd, args).await?;
        if !output.status.success() {
            return Err(DomainError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn git_must(&self, cwd: &Path, args: &[&str]) -> DomainResult<()> {
        self.git_ok(cwd, args).await.map(|_| ())
    }
}
