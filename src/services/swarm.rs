//! Swarm coordinator.
//!
//! Validates the environment, records the started event, spawns one
//! concurrent worker engine per configured seat and waits for them,
//! then records exactly one stopped event. Launch-time failures happen
//! before any event is written; a fault after launch records
//! `stopped(error)` and propagates.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::adapters::harness::HarnessRegistry;
use crate::domain::models::task::TaskState;
use crate::domain::models::{StartedEvent, StopReason, StoppedEvent, SwarmConfig};
use crate::services::merge::MergeCoordinator;
use crate::services::prompt::{self, PromptContext};
use crate::services::recorder::EventRecorder;
use crate::services::review::ReviewLoop;
use crate::services::shutdown::ShutdownController;
use crate::services::task_store::TaskStore;
use crate::services::worker::{WorkerEngine, WorkerSummary};
use crate::services::workspace::WorkspaceService;

/// One swarm invocation, start to stop.
pub struct SwarmCoordinator {
    config: SwarmConfig,
    project_root: PathBuf,
    registry: Arc<HarnessRegistry>,
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig, project_root: impl Into<PathBuf>, registry: Arc<HarnessRegistry>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
            registry,
        }
    }

    /// Run the swarm to completion. The returned reason mirrors the
    /// stopped event; launch-time validation failures return an error
    /// before any event exists.
    pub async fn launch(self) -> Result<StopReason> {
        self.preflight().await?;

        let settings = self.config.settings.clone();
        let store = Arc::new(TaskStore::new(self.project_root.join(&settings.tasks_root)));
        store.ensure_layout().await?;
        self.recover_orphans(&store).await?;

        let recorder = Arc::new(EventRecorder::new(
            self.project_root.join(&settings.runs_root),
            &self.config.id,
        ));
        recorder.ensure_layout().await?;
        recorder
            .record_started(&StartedEvent {
                swarm_id: self.config.id.clone(),
                started_at: Utc::now(),
                pid: std::process::id(),
                config_path: self.config.config_path.display().to_string(),
                workers: self.config.workers.clone(),
                reviewer: self.config.reviewer.clone(),
            })
            .await?;
        info!(swarm_id = %self.config.id, workers = self.config.workers.len(), "Swarm started");

        let stopped_written = Arc::new(AtomicBool::new(false));
        let result = self.run_workers(&store, &recorder).await;

        match result {
            Ok(reason) => {
                record_stopped_once(&recorder, &stopped_written, reason, None).await;
                Ok(reason)
            }
            Err(err) => {
                error!(error = %err, "Swarm coordinator fault");
                record_stopped_once(
                    &recorder,
                    &stopped_written,
                    StopReason::Error,
                    Some(err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Fail fast before anything is spawned or recorded.
    async fn preflight(&self) -> Result<()> {
        if self.config.workers.is_empty() {
            bail!("swarm config declares no workers");
        }

        let git = Command::new("git")
            .arg("--version")
            .output()
            .await
            .context("git binary not found on PATH")?;
        if !git.status.success() {
            bail!("git binary not usable");
        }

        // Untracked files (the task store, old run logs) are fine; dirty
        // tracked files are not.
        let status = Command::new("git")
            .args(["status", "--porcelain", "--untracked-files=no"])
            .current_dir(&self.project_root)
            .output()
            .await
            .context("failed to inspect working tree")?;
        if !status.status.success() {
            bail!("{} is not a git repository", self.project_root.display());
        }
        if !String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            bail!("working tree is dirty; commit or stash before launching a swarm");
        }

        for worker in &self.config.workers {
            for path in &worker.prompts {
                if !path.exists() {
                    bail!("prompt file {} for {} does not exist", path.display(), worker.id);
                }
            }
        }
        if let Some(reviewer) = &self.config.reviewer {
            if let Some(path) = &reviewer.prompt {
                if !path.exists() {
                    bail!("reviewer prompt file {} does not exist", path.display());
                }
            }
        }

        // Probe each unique harness+model pair with a short "say ok".
        let mut probed = std::collections::HashSet::new();
        let mut seats: Vec<(crate::domain::models::HarnessKind, String)> = self
            .config
            .workers
            .iter()
            .map(|w| (w.harness, w.model.clone()))
            .collect();
        if let Some(reviewer) = &self.config.reviewer {
            seats.push((reviewer.harness, reviewer.model.clone()));
        }
        for (kind, model) in seats {
            let runner = self.registry.runner(kind)?;
            if !runner.check_available() {
                bail!("harness binary for {kind} not found on PATH");
            }
            if probed.insert((kind, model.clone())) {
                runner
                    .probe(&model)
                    .await
                    .with_context(|| format!("probe failed for {kind} model {model}"))?;
                info!(harness = %kind, model = %model, "Probe ok");
            }
        }

        Ok(())
    }

    /// Tasks left in `current/` by a previous run belong to workers
    /// that no longer exist; return them to `pending/`.
    async fn recover_orphans(&self, store: &TaskStore) -> Result<()> {
        let stale: Vec<String> = store.ids_in(TaskState::Current).await?.into_iter().collect();
        if !stale.is_empty() {
            let recycled = store.recycle_by_ids(&stale).await?;
            warn!(count = recycled.len(), "Recycled orphaned tasks from a previous run");
        }
        Ok(())
    }

    async fn run_workers(
        &self,
        store: &Arc<TaskStore>,
        recorder: &Arc<EventRecorder>,
    ) -> Result<StopReason> {
        let settings = self.config.settings.clone();
        let controller = ShutdownController::new();
        controller.listen_for_signals();

        let workspaces = Arc::new(WorkspaceService::new(
            &self.project_root,
            settings.main_branch.clone(),
            settings.tasks_root.clone(),
        ));
        let merges = Arc::new(MergeCoordinator::new(
            &self.project_root,
            settings.main_branch.clone(),
            store.clone(),
            workspaces.clone(),
        ));

        let review_loop = match &self.config.reviewer {
            Some(reviewer) => {
                let runner = self.registry.runner(reviewer.harness)?;
                let text = match &reviewer.prompt {
                    Some(path) => fs::read_to_string(path)
                        .await
                        .with_context(|| format!("reviewer prompt {} unreadable", path.display()))?,
                    None => prompt::reviewer_default(),
                };
                Some(Arc::new(ReviewLoop::new(runner, reviewer.clone(), text)))
            }
            None => None,
        };

        let mut handles = Vec::with_capacity(self.config.workers.len());
        for spec in &self.config.workers {
            let engine = WorkerEngine::new(
                spec.clone(),
                self.registry.runner(spec.harness)?,
                store.clone(),
                workspaces.clone(),
                merges.clone(),
                recorder.clone(),
                if spec.review { review_loop.clone() } else { None },
                controller.signal(),
                settings.clone(),
                PromptContext::default(),
            );
            info!(worker_id = %spec.id, harness = %spec.harness, model = %spec.model, "Spawning worker");
            handles.push(tokio::spawn(engine.run()));
        }

        let mut signal = controller.signal();
        let all = futures::future::join_all(handles);
        tokio::pin!(all);

        let joined = tokio::select! {
            joined = &mut all => Some(joined),
            () = signal.wait() => None,
        };

        match joined {
            Some(joined) => {
                log_summaries(joined);
                let reason = if signal.is_requested() {
                    StopReason::Interrupted
                } else {
                    StopReason::Completed
                };
                Ok(reason)
            }
            None => {
                // Cooperative cancellation: give in-flight cycles a
                // grace window before the stopped event is forced.
                info!(grace_secs = settings.shutdown_grace_secs, "Shutdown requested, waiting for workers");
                match tokio::time::timeout(
                    Duration::from_secs(settings.shutdown_grace_secs),
                    &mut all,
                )
                .await
                {
                    Ok(joined) => log_summaries(joined),
                    Err(_) => warn!("Grace window expired with workers still running"),
                }
                Ok(StopReason::Interrupted)
            }
        }
    }
}

/// The single-write guard: the first caller records the stopped event,
/// later callers are no-ops.
async fn record_stopped_once(
    recorder: &EventRecorder,
    written: &AtomicBool,
    reason: StopReason,
    error: Option<String>,
) {
    if written.swap(true, Ordering::SeqCst) {
        return;
    }
    let event = StoppedEvent {
        stopped_at: Utc::now(),
        reason,
        error,
    };
    if let Err(err) = recorder.record_stopped(&event).await {
        error!(error = %err, "Failed to record stopped event");
    }
}

fn log_summaries(joined: Vec<std::result::Result<WorkerSummary, tokio::task::JoinError>>) {
    for result in joined {
        match result {
            Ok(summary) => info!(
                worker_id = %summary.worker_id,
                status = ?summary.status,
                cycles = summary.cycles,
                merges = summary.metrics.merges,
                rejections = summary.metrics.rejections,
                errors = summary.metrics.errors,
                recycled = summary.metrics.recycled,
                claims = summary.metrics.claims,
                "Worker finished"
            ),
            // A worker fault never aborts the others; it only loses its
            // own summary.
            Err(err) => error!(error = %err, "Worker task failed"),
        }
    }
}

/// Project root for a swarm: where the git repository lives.
pub fn resolve_project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().context("cannot determine current directory"),
    }
}
