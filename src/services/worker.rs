//! Worker engine.
//!
//! Drives a single worker through up to `max_cycles` cycles, reacting
//! to the signals its agent emits. Each cycle: ensure a workspace,
//! invoke the agent, parse the highest-priority signal, transition,
//! record exactly one cycle event. Sessions and workspaces carry across
//! cycles while the worker is resuming; any reset without a merge
//! recycles every task the worker holds, so no task is lost.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::task::{ClaimResult, TaskState};
use crate::domain::models::{
    CycleEvent, CycleOutcome, Signal, SwarmSettings, Verdict, WorkerMetrics, WorkerSpec,
    WorkerState, WorkerStatus, Workspace,
};
use crate::domain::ports::{AgentRunner, Invocation};
use crate::services::prompt::{self, PromptContext};
use crate::services::recorder::EventRecorder;
use crate::services::review::{FixContext, ReviewLoop};
use crate::services::task_store::TaskStore;
use crate::services::merge::MergeCoordinator;
use crate::services::shutdown::ShutdownSignal;
use crate::services::workspace::{SyncOutcome, WorkspaceService};

/// Consecutive `error` cycles tolerated before the worker stops.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Characters of stderr/stdout kept in an error snippet.
const ERROR_SNIPPET_LIMIT: usize = 400;

/// How one worker's loop ended, with its final counters.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub cycles: u32,
    pub metrics: WorkerMetrics,
}

/// Whether the loop proceeds after a cycle.
enum CycleFlow {
    Continue,
    Interrupted,
}

/// Everything a finished cycle reports into its event.
struct CycleReport {
    outcome: CycleOutcome,
    claimed: Vec<String>,
    recycled: Vec<String>,
    review_rounds: u32,
    error_snippet: Option<String>,
    session_id: Option<String>,
    interrupted: bool,
}

impl CycleReport {
    fn of(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            claimed: Vec::new(),
            recycled: Vec::new(),
            review_rounds: 0,
            error_snippet: None,
            session_id: None,
            interrupted: false,
        }
    }
}

/// Drives one worker's cycle state machine.
pub struct WorkerEngine {
    state: WorkerState,
    runner: Arc<dyn AgentRunner>,
    store: Arc<TaskStore>,
    workspaces: Arc<WorkspaceService>,
    merges: Arc<MergeCoordinator>,
    recorder: Arc<EventRecorder>,
    review: Option<Arc<ReviewLoop>>,
    shutdown: ShutdownSignal,
    settings: SwarmSettings,
    prompt_ctx: PromptContext,
}

impl WorkerEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: WorkerSpec,
        runner: Arc<dyn AgentRunner>,
        store: Arc<TaskStore>,
        workspaces: Arc<WorkspaceService>,
        merges: Arc<MergeCoordinator>,
        recorder: Arc<EventRecorder>,
        review: Option<Arc<ReviewLoop>>,
        shutdown: ShutdownSignal,
        settings: SwarmSettings,
        prompt_ctx: PromptContext,
    ) -> Self {
        Self {
            state: WorkerState::new(spec),
            runner,
            store,
            workspaces,
            merges,
            recorder,
            review,
            shutdown,
            settings,
            prompt_ctx,
        }
    }

    /// Run the worker to completion.
    #[instrument(skip(self), fields(worker_id = %self.state.spec.id))]
    pub async fn run(mut self) -> WorkerSummary {
        loop {
            if self.state.cycles_completed >= self.state.spec.max_cycles {
                info!(cycles = self.state.cycles_completed, "Worker exhausted its cycle budget");
                return self.summary(WorkerStatus::Exhausted);
            }
            if self.shutdown.is_requested() {
                let cycle = self.state.cycles_completed + 1;
                self.finalize_interrupted(cycle).await;
                return self.summary(WorkerStatus::Interrupted);
            }

            let cycle = self.state.cycles_completed + 1;

            if !self.state.spec.can_plan && !self.state.resume {
                self.wait_for_tasks().await;
            }
            if let Some(wait) = self.state.spec.wait_between {
                if cycle > 1 {
                    debug!(seconds = wait, "Inter-cycle wait");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
            }

            let flow = self.run_cycle(cycle).await;
            self.state.cycles_completed = cycle;

            match flow {
                CycleFlow::Interrupted => return self.summary(WorkerStatus::Interrupted),
                CycleFlow::Continue => {
                    if self.state.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        warn!("Worker stopping after {MAX_CONSECUTIVE_ERRORS} consecutive errors");
                        return self.summary(WorkerStatus::Error);
                    }
                }
            }
        }
    }

    fn summary(&self, status: WorkerStatus) -> WorkerSummary {
        WorkerSummary {
            worker_id: self.state.spec.id.clone(),
            status,
            cycles: self.state.cycles_completed,
            metrics: self.state.metrics,
        }
    }

    /// Backpressure: executors do not run against an empty task store.
    /// Poll, then proceed anyway past the ceiling.
    async fn wait_for_tasks(&self) {
        let deadline = Instant::now() + Duration::from_secs(self.settings.task_poll_timeout_secs);
        loop {
            if self.shutdown.is_requested() {
                return;
            }
            match self.store.pending_is_empty().await {
                Ok(false) => return,
                Ok(true) => {}
                Err(err) => {
                    warn!(error = %err, "Task store poll failed");
                    return;
                }
            }
            if Instant::now() >= deadline {
                debug!("Backpressure timeout, proceeding with empty task store");
                return;
            }
            tokio::time::sleep(Duration::from_secs(self.settings.task_poll_secs)).await;
        }
    }

    /// One cycle: execute, fold failures into the `error` outcome,
    /// write exactly one cycle event.
    async fn run_cycle(&mut self, cycle: u32) -> CycleFlow {
        let started = Instant::now();
        info!(cycle = cycle, resuming = self.state.resume, "Cycle start");

        let report = match self.execute_cycle(cycle).await {
            Ok(report) => report,
            Err(err) => self.conclude_error(err.to_string()).await,
        };

        if report.outcome == CycleOutcome::Error {
            self.state.consecutive_errors += 1;
            self.state.metrics.errors += 1;
        } else {
            self.state.consecutive_errors = 0;
        }

        let event = CycleEvent {
            worker_id: self.state.spec.id.clone(),
            cycle,
            outcome: report.outcome,
            at: Utc::now(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            claimed_task_ids: report.claimed,
            recycled_tasks: report.recycled,
            error_snippet: report.error_snippet,
            review_rounds: report.review_rounds,
            session_id: report.session_id,
        };
        if let Err(err) = self.recorder.record_cycle(&event).await {
            warn!(cycle = cycle, error = %err, "Failed to record cycle event");
        }
        info!(cycle = cycle, outcome = %event.outcome, "Cycle end");

        if report.interrupted {
            CycleFlow::Interrupted
        } else {
            CycleFlow::Continue
        }
    }

    async fn execute_cycle(&mut self, cycle: u32) -> DomainResult<CycleReport> {
        if self.state.workspace.is_none() {
            match self.workspaces.acquire(&self.state.spec.id, cycle).await {
                Ok(workspace) => self.state.workspace = Some(workspace),
                Err(err) => {
                    // Workspace-creation failure counts toward the error cap.
                    return Ok(self.conclude_error(err.to_string()).await);
                }
            }
        }
        let Some(workspace) = self.state.workspace.clone() else {
            return Ok(self.conclude_error("workspace handle missing".to_string()).await);
        };

        let prompt = if self.state.resume {
            match self.state.prompt_override.take() {
                Some(override_prompt) => override_prompt,
                None => prompt::continue_prompt(),
            }
        } else {
            let pending = self.store.list(TaskState::Pending).await?;
            let claimed: Vec<String> = self.state.claimed.iter().cloned().collect();
            prompt::assemble_fresh(&self.state.spec, cycle, &pending, &claimed, &self.prompt_ctx)
                .await?
        };

        if !self.state.resume {
            self.state.session_id = self.runner.make_session_id();
        }
        let session_used = self.state.session_id.clone();

        let invocation = Invocation {
            cwd: workspace.dir.clone(),
            model: self.state.spec.model.clone(),
            reasoning: self.state.spec.reasoning.clone(),
            session_id: self.state.session_id.clone(),
            resume: self.state.resume,
            prompt,
            structured: true,
        };
        let result = match self.runner.run(invocation).await {
            Ok(result) => result,
            Err(err) => {
                let mut report = self.conclude_error(err.to_string()).await;
                report.session_id = session_used;
                return Ok(report);
            }
        };

        // The subprocess is the long suspension point; honor a shutdown
        // that arrived while the agent was running.
        if self.shutdown.is_requested() {
            let mut report = self.conclude_interrupted().await;
            report.session_id = session_used;
            return Ok(report);
        }

        if result.exit_code != 0 {
            let snippet = snippet_of(&result.stderr, &result.stdout);
            let mut report = self.conclude_error(snippet).await;
            report.session_id = session_used;
            return Ok(report);
        }

        if result.session_id.is_some() {
            self.state.session_id = result.session_id.clone();
        }
        let session_used = self.state.session_id.clone();

        let mut report = match Signal::parse(&result.text) {
            Some(Signal::Done) => self.handle_done().await,
            Some(Signal::CompleteAndReadyForMerge) => {
                self.handle_complete(cycle, &workspace).await?
            }
            Some(Signal::Claim(ids)) => self.handle_claim(&ids).await?,
            None => self.handle_no_signal().await,
        };
        report.session_id = session_used;
        Ok(report)
    }

    /// `__DONE__`: reset the session and continue to the next cycle,
    /// planners and executors alike.
    async fn handle_done(&mut self) -> CycleReport {
        let outcome = if self.state.spec.can_plan {
            CycleOutcome::Done
        } else {
            CycleOutcome::ExecutorDone
        };
        let recycled = self.abandon_claims().await;
        self.release_and_reset().await;
        CycleReport {
            recycled,
            ..CycleReport::of(outcome)
        }
    }

    /// `CLAIM(ids)`: the framework claims atomically and the agent
    /// resumes with the injected claim-results prompt.
    async fn handle_claim(&mut self, ids: &[String]) -> DomainResult<CycleReport> {
        let results = self.store.claim_by_ids(ids).await?;
        let won: Vec<String> = results
            .iter()
            .filter(|(_, r)| *r == ClaimResult::Claimed)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &won {
            self.state.claimed.insert(id.clone());
        }
        self.state.metrics.claims += u32::try_from(won.len()).unwrap_or(u32::MAX);
        self.state.prompt_override = Some(prompt::claim_results(&results));
        self.state.resume = true;
        self.state.working_resumes = 0;

        info!(claimed = won.len(), requested = ids.len(), "Tasks claimed");
        Ok(CycleReport {
            claimed: won,
            ..CycleReport::of(CycleOutcome::Claimed)
        })
    }

    /// No terminal signal: keep the session going, nudge at the cap,
    /// declare the worker stuck past it.
    async fn handle_no_signal(&mut self) -> CycleReport {
        self.state.working_resumes += 1;
        let max = self.settings.working_resumes_max;

        if self.state.working_resumes > max {
            warn!(resumes = self.state.working_resumes, "Worker stuck, resetting session");
            let recycled = self.abandon_claims().await;
            self.release_and_reset().await;
            return CycleReport {
                recycled,
                ..CycleReport::of(CycleOutcome::Stuck)
            };
        }

        if self.state.working_resumes == max {
            self.state.prompt_override = Some(prompt::stuck_nudge());
        }
        self.state.resume = true;
        CycleReport::of(CycleOutcome::Working)
    }

    /// `COMPLETE_AND_READY_FOR_MERGE`: review (unless the diff touches
    /// only task files), sync with main, merge under the mutex.
    async fn handle_complete(
        &mut self,
        cycle: u32,
        workspace: &Workspace,
    ) -> DomainResult<CycleReport> {
        if !self.workspaces.has_changes(workspace).await? {
            debug!("Completion signaled with no changes, skipping");
            let recycled = self.abandon_claims().await;
            self.release_and_reset().await;
            return Ok(CycleReport {
                recycled,
                ..CycleReport::of(CycleOutcome::NoChanges)
            });
        }

        let files = self.workspaces.diff_filenames(workspace).await?;
        let task_only = self.workspaces.task_only_diff(&files);
        let mut review_rounds = 0;

        if !task_only {
            if let Some(review) = self.review.clone() {
                let fix = FixContext {
                    runner: self.runner.clone(),
                    model: self.state.spec.model.clone(),
                    reasoning: self.state.spec.reasoning.clone(),
                    session_id: self.state.session_id.clone(),
                };
                let outcome = review
                    .run(
                        &self.state.spec.id,
                        cycle,
                        workspace,
                        &self.workspaces,
                        &fix,
                        &self.recorder,
                    )
                    .await?;
                review_rounds = outcome.rounds;
                self.state.metrics.review_rounds_total += outcome.rounds;

                if outcome.verdict != Verdict::Approved {
                    self.state.metrics.rejections += 1;
                    let recycled = self.abandon_claims().await;
                    self.release_and_reset().await;
                    return Ok(CycleReport {
                        recycled,
                        review_rounds,
                        ..CycleReport::of(CycleOutcome::Rejected)
                    });
                }
            }

            if !self.sync_with_resolution(workspace).await? {
                let recycled = self.abandon_claims().await;
                self.release_and_reset().await;
                return Ok(CycleReport {
                    recycled,
                    review_rounds,
                    ..CycleReport::of(CycleOutcome::SyncFailed)
                });
            }
        }

        let claimed: Vec<String> = self.state.claimed.iter().cloned().collect();
        match self
            .merges
            .merge(workspace, &self.state.spec.id, &claimed, review_rounds)
            .await?
        {
            Some(commit) => {
                info!(commit = %commit, tasks = claimed.len(), "Cycle merged");
                self.state.metrics.merges += 1;
                self.state.claimed.clear();
                self.release_and_reset().await;
                Ok(CycleReport {
                    claimed,
                    review_rounds,
                    ..CycleReport::of(CycleOutcome::Merged)
                })
            }
            None => {
                let recycled = self.abandon_claims().await;
                self.release_and_reset().await;
                Ok(CycleReport {
                    recycled,
                    review_rounds,
                    ..CycleReport::of(CycleOutcome::MergeFailed)
                })
            }
        }
    }

    /// Sync the workspace with main, resolving conflicts through a
    /// one-shot agent run. Runs entirely outside the merge lock.
    async fn sync_with_resolution(&mut self, workspace: &Workspace) -> DomainResult<bool> {
        match self.workspaces.begin_sync(workspace).await? {
            SyncOutcome::Synced => Ok(true),
            SyncOutcome::Failed => Ok(false),
            SyncOutcome::Conflicted(files) => {
                info!(files = files.len(), "Invoking conflict resolver");
                let invocation = Invocation {
                    cwd: workspace.dir.clone(),
                    model: self.state.spec.model.clone(),
                    reasoning: self.state.spec.reasoning.clone(),
                    session_id: None,
                    resume: false,
                    prompt: prompt::conflict_resolution(&files),
                    structured: true,
                };
                match self.runner.run(invocation).await {
                    Ok(result) if result.exit_code == 0 => {
                        self.workspaces.finish_sync(workspace, &files).await
                    }
                    Ok(_) | Err(_) => {
                        self.workspaces.abort_sync(workspace).await;
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Error path shared by agent failures and framework faults inside a
    /// cycle: recycle, destroy the workspace, reset the session.
    async fn conclude_error(&mut self, snippet: String) -> CycleReport {
        warn!(error = %snippet, "Cycle ended in error");
        let recycled = self.abandon_claims().await;
        self.release_and_reset().await;
        CycleReport {
            recycled,
            error_snippet: Some(truncate(snippet, ERROR_SNIPPET_LIMIT)),
            ..CycleReport::of(CycleOutcome::Error)
        }
    }

    async fn conclude_interrupted(&mut self) -> CycleReport {
        let recycled = self.abandon_claims().await;
        self.release_and_reset().await;
        CycleReport {
            recycled,
            interrupted: true,
            ..CycleReport::of(CycleOutcome::Interrupted)
        }
    }

    /// Between-cycles shutdown: recycle, destroy, emit the interrupted
    /// cycle event, return.
    async fn finalize_interrupted(&mut self, cycle: u32) {
        let report = self.conclude_interrupted().await;
        let event = CycleEvent {
            worker_id: self.state.spec.id.clone(),
            cycle,
            outcome: CycleOutcome::Interrupted,
            at: Utc::now(),
            duration_ms: 0,
            claimed_task_ids: Vec::new(),
            recycled_tasks: report.recycled,
            error_snippet: None,
            review_rounds: 0,
            session_id: None,
        };
        if let Err(err) = self.recorder.record_cycle(&event).await {
            warn!(error = %err, "Failed to record interrupted cycle event");
        }
    }

    /// Recycle every task this worker holds. Safe to call with nothing
    /// claimed; recycling an id twice is a no-op in the store.
    async fn abandon_claims(&mut self) -> Vec<String> {
        if self.state.claimed.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = std::mem::take(&mut self.state.claimed).into_iter().collect();
        match self.store.recycle_by_ids(&ids).await {
            Ok(recycled) => {
                self.state.metrics.recycled += u32::try_from(recycled.len()).unwrap_or(u32::MAX);
                recycled
            }
            Err(err) => {
                warn!(error = %err, "Failed to recycle claimed tasks");
                Vec::new()
            }
        }
    }

    async fn release_and_reset(&mut self) {
        if let Some(workspace) = self.state.workspace.take() {
            if let Err(err) = self.workspaces.release(&workspace).await {
                warn!(slug = %workspace.slug, error = %err, "Workspace release failed");
            }
        }
        self.state.reset_session();
    }
}

fn snippet_of(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    truncate(source.trim().to_string(), ERROR_SNIPPET_LIMIT)
}

fn truncate(mut s: String, limit: usize) -> String {
    if s.len() > limit {
        let mut cut = limit;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}
