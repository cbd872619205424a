//! Shared fixtures: throwaway git repositories and a scripted agent
//! runner that stands in for real harness subprocesses.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

use oompa::domain::models::{HarnessKind, SwarmSettings, WorkerSpec};
use oompa::domain::ports::{AgentRunner, Invocation, InvocationResult};
use oompa::DomainResult;

/// Initialize a git repository with one commit on `main`.
pub fn init_repo() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    git(&root, &["init", "-b", "main"]);
    git(&root, &["config", "user.email", "swarm@example.com"]);
    git(&root, &["config", "user.name", "Swarm Fixture"]);
    std::fs::write(root.join("README.md"), "# fixture\n").unwrap();
    git(&root, &["add", "-A"]);
    git(&root, &["commit", "-m", "init"]);
    (tmp, root)
}

/// Run git in `root`, asserting success; returns stdout.
pub fn git(root: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A worker seat for tests.
pub fn worker_spec(id: &str, max_cycles: u32, can_plan: bool) -> WorkerSpec {
    WorkerSpec {
        id: id.to_string(),
        harness: HarnessKind::ClaudeCode,
        model: "test-model".to_string(),
        reasoning: None,
        max_cycles,
        prompts: vec![],
        can_plan,
        wait_between: None,
        review: true,
    }
}

/// Settings tuned so tests never sit in a polling loop.
pub fn fast_settings() -> SwarmSettings {
    SwarmSettings {
        task_poll_secs: 1,
        task_poll_timeout_secs: 1,
        shutdown_grace_secs: 1,
        ..SwarmSettings::default()
    }
}

type StepAction = Box<dyn Fn(&Path) + Send + Sync>;

/// One scripted agent response.
pub struct Step {
    pub text: String,
    pub exit_code: i32,
    pub stderr: String,
    pub action: Option<StepAction>,
}

impl Step {
    /// A successful run whose output is `text`.
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            exit_code: 0,
            stderr: String::new(),
            action: None,
        }
    }

    /// A failed run.
    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            text: String::new(),
            exit_code,
            stderr: stderr.to_string(),
            action: None,
        }
    }

    /// Run `action` against the invocation cwd (the workspace) before
    /// the response is returned, the way a real agent mutates files.
    pub fn with_action(mut self, action: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }
}

/// An [`AgentRunner`] that replays a fixed script instead of spawning
/// subprocesses. Runs past the end of the script produce empty output
/// (no signal).
pub struct ScriptedRunner {
    steps: Mutex<VecDeque<Step>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Every invocation the runner received, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> DomainResult<InvocationResult> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::text(""));
        if let Some(action) = &step.action {
            action(&invocation.cwd);
        }
        Ok(InvocationResult {
            stdout: step.text.clone(),
            stderr: step.stderr,
            exit_code: step.exit_code,
            text: step.text,
            session_id: None,
        })
    }

    fn make_session_id(&self) -> Option<String> {
        Some("scripted-session".to_string())
    }

    fn check_available(&self) -> bool {
        true
    }

    async fn probe(&self, _model: &str) -> DomainResult<()> {
        Ok(())
    }
}
