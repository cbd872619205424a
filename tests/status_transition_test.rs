//! Worker engine state-machine transitions, driven end to end against
//! real git repositories with a scripted agent.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{fast_settings, git, init_repo, worker_spec, Step, ScriptedRunner};
use tempfile::TempDir;

use oompa::domain::models::{
    CycleEvent, CycleOutcome, HarnessKind, ReviewEvent, ReviewerSpec, Task, TaskState, Verdict,
    WorkerSpec, WorkerStatus,
};
use oompa::services::prompt::PromptContext;
use oompa::services::{
    EventRecorder, MergeCoordinator, ReviewLoop, ShutdownController, TaskStore, WorkerEngine,
    WorkspaceService,
};

const SWARM_ID: &str = "deadbeef";

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    store: Arc<TaskStore>,
    workspaces: Arc<WorkspaceService>,
    merges: Arc<MergeCoordinator>,
    recorder: Arc<EventRecorder>,
    controller: Arc<ShutdownController>,
}

async fn fixture() -> Fixture {
    let (_tmp, root) = init_repo();
    let store = Arc::new(TaskStore::new(root.join("tasks")));
    store.ensure_layout().await.unwrap();
    let workspaces = Arc::new(WorkspaceService::new(&root, "main", "tasks"));
    let merges = Arc::new(MergeCoordinator::new(
        &root,
        "main",
        store.clone(),
        workspaces.clone(),
    ));
    let recorder = Arc::new(EventRecorder::new(root.join("runs"), SWARM_ID));
    recorder.ensure_layout().await.unwrap();
    Fixture {
        _tmp,
        root,
        store,
        workspaces,
        merges,
        recorder,
        controller: Arc::new(ShutdownController::new()),
    }
}

impl Fixture {
    fn engine(
        &self,
        spec: WorkerSpec,
        runner: Arc<ScriptedRunner>,
        review: Option<Arc<ReviewLoop>>,
    ) -> WorkerEngine {
        WorkerEngine::new(
            spec,
            runner,
            self.store.clone(),
            self.workspaces.clone(),
            self.merges.clone(),
            self.recorder.clone(),
            review,
            self.controller.signal(),
            fast_settings(),
            PromptContext::default(),
        )
    }

    fn cycle_event(&self, worker_id: &str, cycle: u32) -> CycleEvent {
        let path = self
            .root
            .join(format!("runs/{SWARM_ID}/cycles/{worker_id}-c{cycle}.yaml"));
        serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("missing cycle event {}: {e}", path.display())
        }))
        .unwrap()
    }

    fn review_event(&self, worker_id: &str, cycle: u32, round: u32) -> ReviewEvent {
        let path = self.root.join(format!(
            "runs/{SWARM_ID}/reviews/{worker_id}-c{cycle}-r{round}.yaml"
        ));
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

#[tokio::test]
async fn test_single_worker_claims_then_merges() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-001", "add feature")).await.unwrap();

    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("I'll take it. CLAIM(task-001)"),
        Step::text("COMPLETE_AND_READY_FOR_MERGE").with_action(|cwd| {
            std::fs::write(cwd.join("feature.txt"), "the feature\n").unwrap();
        }),
    ]));

    let summary = fix
        .engine(worker_spec("w0", 2, true), runner.clone(), None)
        .run()
        .await;

    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(summary.metrics.merges, 1);
    assert_eq!(summary.metrics.claims, 1);

    let c1 = fix.cycle_event("w0", 1);
    assert_eq!(c1.outcome, CycleOutcome::Claimed);
    assert_eq!(c1.claimed_task_ids, vec!["task-001".to_string()]);

    let c2 = fix.cycle_event("w0", 2);
    assert_eq!(c2.outcome, CycleOutcome::Merged);
    assert_eq!(c2.claimed_task_ids, vec!["task-001".to_string()]);
    assert_eq!(c2.review_rounds, 0);

    // The claim-results prompt was injected into the resumed session.
    let invocations = runner.invocations();
    assert!(invocations[1].resume);
    assert!(invocations[1].prompt.contains("task-001: claimed"));

    // The task landed in complete/ with its stamp, and main has the file.
    let complete = fix.store.list(TaskState::Complete).await.unwrap();
    assert_eq!(complete.len(), 1);
    let stamp = complete[0].completion.as_ref().unwrap();
    assert_eq!(stamp.completed_by, "w0");
    assert_eq!(stamp.review_rounds, 0);
    assert!(fix.root.join("feature.txt").exists());
    assert!(fix.store.list(TaskState::Pending).await.unwrap().is_empty());
    assert!(fix.store.list(TaskState::Current).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_done_resets_session_for_planners_and_executors() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-idle", "sit there")).await.unwrap();

    // Planner seat.
    let planner_runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("nothing to plan __DONE__"),
        Step::text("still nothing __DONE__"),
    ]));
    let summary = fix
        .engine(worker_spec("w0", 2, true), planner_runner.clone(), None)
        .run()
        .await;
    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(fix.cycle_event("w0", 1).outcome, CycleOutcome::Done);
    assert_eq!(fix.cycle_event("w0", 2).outcome, CycleOutcome::Done);
    // Session reset between cycles: the second run starts fresh.
    assert!(!planner_runner.invocations()[1].resume);

    // Executor seat: identical policy, executor-done outcome.
    let executor_runner = Arc::new(ScriptedRunner::new(vec![Step::text("__DONE__")]));
    let summary = fix
        .engine(worker_spec("w1", 1, false), executor_runner, None)
        .run()
        .await;
    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(fix.cycle_event("w1", 1).outcome, CycleOutcome::ExecutorDone);
}

#[tokio::test]
async fn test_three_consecutive_errors_stop_the_worker() {
    let fix = fixture().await;

    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::fail(1, "agent exploded"),
        Step::fail(1, "agent exploded"),
        Step::fail(1, "agent exploded"),
    ]));
    let summary = fix
        .engine(worker_spec("w0", 10, true), runner, None)
        .run()
        .await;

    assert_eq!(summary.status, WorkerStatus::Error);
    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.metrics.errors, 3);
    for cycle in 1..=3 {
        let event = fix.cycle_event("w0", cycle);
        assert_eq!(event.outcome, CycleOutcome::Error);
        assert!(event.error_snippet.as_ref().unwrap().contains("agent exploded"));
    }
    assert!(!fix.root.join("runs").join(SWARM_ID).join("cycles/w0-c4.yaml").exists());
}

#[tokio::test]
async fn test_error_streak_is_broken_by_a_good_cycle() {
    let fix = fixture().await;

    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::fail(1, "flaky"),
        Step::fail(1, "flaky"),
        Step::text("recovering __DONE__"),
        Step::fail(1, "flaky"),
    ]));
    let summary = fix
        .engine(worker_spec("w0", 4, true), runner, None)
        .run()
        .await;

    // Two errors, a success, one more error: the cap never fires.
    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(summary.metrics.errors, 3);
}

#[tokio::test]
async fn test_stuck_worker_gets_nudged_then_reset() {
    let fix = fixture().await;

    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("still thinking about the parser"),
        Step::text("hmm, tricky"),
    ]));
    let mut settings = fast_settings();
    settings.working_resumes_max = 1;

    let engine = WorkerEngine::new(
        worker_spec("w0", 2, true),
        runner.clone(),
        fix.store.clone(),
        fix.workspaces.clone(),
        fix.merges.clone(),
        fix.recorder.clone(),
        None,
        fix.controller.signal(),
        settings,
        PromptContext::default(),
    );
    let summary = engine.run().await;

    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(fix.cycle_event("w0", 1).outcome, CycleOutcome::Working);
    assert_eq!(fix.cycle_event("w0", 2).outcome, CycleOutcome::Stuck);

    // The cap queued a nudge override for the second run.
    let invocations = runner.invocations();
    assert!(invocations[1].resume);
    assert!(invocations[1].prompt.contains("without a terminal signal"));
}

#[tokio::test]
async fn test_complete_with_clean_worktree_emits_no_changes() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-n", "noop")).await.unwrap();

    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("CLAIM(task-n)"),
        Step::text("COMPLETE_AND_READY_FOR_MERGE"),
    ]));
    let summary = fix
        .engine(worker_spec("w0", 2, true), runner, None)
        .run()
        .await;

    assert_eq!(summary.status, WorkerStatus::Exhausted);
    let event = fix.cycle_event("w0", 2);
    assert_eq!(event.outcome, CycleOutcome::NoChanges);
    // The claim was recycled; the task is available again.
    assert_eq!(event.recycled_tasks, vec!["task-n".to_string()]);
    assert!(fix.store.ids_in(TaskState::Pending).await.unwrap().contains("task-n"));
}

#[tokio::test]
async fn test_shutdown_mid_cycle_interrupts_and_recycles() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-y", "doomed")).await.unwrap();

    let controller = fix.controller.clone();
    let runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("CLAIM(task-y)"),
        // Shutdown lands while the agent is "running".
        Step::text("half-finished work").with_action(move |_| controller.request()),
    ]));
    let summary = fix
        .engine(worker_spec("w0", 10, true), runner, None)
        .run()
        .await;

    assert_eq!(summary.status, WorkerStatus::Interrupted);
    let event = fix.cycle_event("w0", 2);
    assert_eq!(event.outcome, CycleOutcome::Interrupted);
    assert_eq!(event.recycled_tasks, vec!["task-y".to_string()]);
    assert!(fix.store.ids_in(TaskState::Pending).await.unwrap().contains("task-y"));
    assert!(fix.store.ids_in(TaskState::Current).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reviewer_rejects_twice_then_approves() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-x", "reviewed work")).await.unwrap();

    let worker_runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("CLAIM(task-x)"),
        Step::text("COMPLETE_AND_READY_FOR_MERGE").with_action(|cwd| {
            std::fs::write(cwd.join("lib.rs"), "pub fn answer() -> u32 { 41 }\n").unwrap();
        }),
        // Fix subprocesses for rounds 1 and 2.
        Step::text("fixed").with_action(|cwd| {
            std::fs::write(cwd.join("lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
        }),
        Step::text("fixed again"),
    ]));
    let reviewer_runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("off by one\nVERDICT: NEEDS_CHANGES"),
        Step::text("tests?\nVERDICT: NEEDS_CHANGES"),
        Step::text("VERDICT: APPROVED"),
    ]));
    let review = Arc::new(ReviewLoop::new(
        reviewer_runner,
        ReviewerSpec {
            harness: HarnessKind::ClaudeCode,
            model: "reviewer-model".to_string(),
            reasoning: None,
            max_rounds: 3,
            prompt: None,
        },
        "Review the change.".to_string(),
    ));

    let summary = fix
        .engine(worker_spec("w0", 2, true), worker_runner, Some(review))
        .run()
        .await;

    assert_eq!(summary.status, WorkerStatus::Exhausted);
    assert_eq!(summary.metrics.merges, 1);
    assert_eq!(summary.metrics.review_rounds_total, 3);

    let c2 = fix.cycle_event("w0", 2);
    assert_eq!(c2.outcome, CycleOutcome::Merged);
    assert_eq!(c2.review_rounds, 3);

    assert_eq!(fix.review_event("w0", 2, 1).verdict, Verdict::NeedsChanges);
    assert_eq!(fix.review_event("w0", 2, 2).verdict, Verdict::NeedsChanges);
    assert_eq!(fix.review_event("w0", 2, 3).verdict, Verdict::Approved);

    let complete = fix.store.list(TaskState::Complete).await.unwrap();
    assert_eq!(complete[0].completion.as_ref().unwrap().review_rounds, 3);
}

#[tokio::test]
async fn test_reviewer_rejection_recycles_the_claim() {
    let fix = fixture().await;
    fix.store.create(&Task::new("task-r", "rejected work")).await.unwrap();

    let worker_runner = Arc::new(ScriptedRunner::new(vec![
        Step::text("CLAIM(task-r)"),
        Step::text("COMPLETE_AND_READY_FOR_MERGE").with_action(|cwd| {
            std::fs::write(cwd.join("wat.rs"), "fn wat() {}\n").unwrap();
        }),
    ]));
    let reviewer_runner = Arc::new(ScriptedRunner::new(vec![Step::text("VERDICT: REJECTED")]));
    let review = Arc::new(ReviewLoop::new(
        reviewer_runner,
        ReviewerSpec {
            harness: HarnessKind::ClaudeCode,
            model: "reviewer-model".to_string(),
            reasoning: None,
            max_rounds: 3,
            prompt: None,
        },
        "Review the change.".to_string(),
    ));

    let summary = fix
        .engine(worker_spec("w0", 2, true), worker_runner, Some(review))
        .run()
        .await;

    assert_eq!(summary.metrics.rejections, 1);
    assert_eq!(summary.metrics.merges, 0);
    let c2 = fix.cycle_event("w0", 2);
    assert_eq!(c2.outcome, CycleOutcome::Rejected);
    assert_eq!(c2.review_rounds, 1);
    assert!(fix.store.ids_in(TaskState::Pending).await.unwrap().contains("task-r"));
}

#[tokio::test]
async fn test_sync_conflict_resolved_by_agent_still_merges() {
    let fix = fixture().await;
    let root = fix.root.clone();

    let runner = Arc::new(ScriptedRunner::new(vec![
        // The agent edits README.md while main moves underneath it.
        Step::text("COMPLETE_AND_READY_FOR_MERGE").with_action(move |cwd| {
            std::fs::write(cwd.join("README.md"), "# fixture\nworkspace line\n").unwrap();
            std::fs::write(root.join("README.md"), "# fixture\nmain line\n").unwrap();
            git(&root, &["add", "-A"]);
            git(&root, &["commit", "-m", "main moved"]);
        }),
        // Conflict-resolver run: rewrite the file without markers.
        Step::text("resolved").with_action(|cwd| {
            std::fs::write(cwd.join("README.md"), "# fixture\nmain line\nworkspace line\n")
                .unwrap();
        }),
    ]));

    let summary = fix
        .engine(worker_spec("w0", 1, true), runner, None)
        .run()
        .await;

    assert_eq!(summary.metrics.merges, 1);
    assert_eq!(fix.cycle_event("w0", 1).outcome, CycleOutcome::Merged);
    let merged = std::fs::read_to_string(fix.root.join("README.md")).unwrap();
    assert!(merged.contains("main line"));
    assert!(merged.contains("workspace line"));
}

#[tokio::test]
async fn test_task_only_diff_skips_review_and_sync() {
    let fix = fixture().await;

    // A planner that only writes a new task file merges without review.
    let reviewer_runner = Arc::new(ScriptedRunner::new(vec![Step::text("VERDICT: REJECTED")]));
    let review = Arc::new(ReviewLoop::new(
        reviewer_runner.clone(),
        ReviewerSpec {
            harness: HarnessKind::ClaudeCode,
            model: "reviewer-model".to_string(),
            reasoning: None,
            max_rounds: 3,
            prompt: None,
        },
        "Review the change.".to_string(),
    ));
    let runner = Arc::new(ScriptedRunner::new(vec![Step::text(
        "COMPLETE_AND_READY_FOR_MERGE",
    )
    .with_action(|cwd| {
        std::fs::create_dir_all(cwd.join("tasks/pending")).unwrap();
        std::fs::write(
            cwd.join("tasks/pending/task-new.yaml"),
            "id: task-new\nsummary: planned work\n",
        )
        .unwrap();
    })]));

    let summary = fix
        .engine(worker_spec("w0", 1, true), runner, Some(review))
        .run()
        .await;

    assert_eq!(summary.metrics.merges, 1);
    assert_eq!(fix.cycle_event("w0", 1).outcome, CycleOutcome::Merged);
    // The reviewer was never consulted.
    assert!(reviewer_runner.invocations().is_empty());
    assert!(fix.root.join("tasks/pending/task-new.yaml").exists());
}
