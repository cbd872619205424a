//! Subprocess runner for harness invocations.
//!
//! Spawns the adapter-built argv, pipes the adapter's stdin policy,
//! captures output and enforces the per-cycle timeout. The engine only
//! sees [`InvocationResult`]s; a non-zero exit is data, not an error.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AgentRunner, Harness, Invocation, InvocationResult};

/// Probes are short; they never get the full cycle budget.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes invocations against one harness adapter.
pub struct HarnessRunner {
    harness: Arc<dyn Harness>,
    timeout: Duration,
}

impl HarnessRunner {
    pub fn new(harness: Arc<dyn Harness>, timeout: Duration) -> Self {
        Self { harness, timeout }
    }

    async fn spawn_and_wait(
        &self,
        argv: Vec<String>,
        cwd: Option<&std::path::Path>,
        stdin_bytes: Vec<u8>,
        budget: Duration,
    ) -> DomainResult<std::process::Output> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DomainError::Invocation("harness built an empty argv".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        debug!(program = %program, args = args.len(), "Spawning agent subprocess");
        let mut child = cmd
            .spawn()
            .map_err(|e| DomainError::Invocation(format!("failed to spawn {program}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            if !stdin_bytes.is_empty() {
                stdin
                    .write_all(&stdin_bytes)
                    .await
                    .map_err(|e| DomainError::Invocation(format!("stdin write failed: {e}")))?;
            }
            drop(stdin);
        }

        match timeout(budget, child.wait_with_output()).await {
            Ok(output) => {
                output.map_err(|e| DomainError::Invocation(format!("wait failed: {e}")))
            }
            // kill_on_drop reaps the child.
            Err(_) => Err(DomainError::InvocationTimeout(budget.as_secs())),
        }
    }
}

#[async_trait]
impl AgentRunner for HarnessRunner {
    async fn run(&self, invocation: Invocation) -> DomainResult<InvocationResult> {
        let argv = self.harness.build_cmd(&invocation);
        let stdin_bytes = self.harness.process_stdin(&invocation.prompt);

        let output = self
            .spawn_and_wait(argv, Some(&invocation.cwd), stdin_bytes, self.timeout)
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let parsed = self
            .harness
            .parse_output(&stdout, invocation.session_id.as_deref());

        Ok(InvocationResult {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            text: parsed.text,
            session_id: parsed.session_id,
        })
    }

    fn make_session_id(&self) -> Option<String> {
        self.harness.make_session_id()
    }

    fn check_available(&self) -> bool {
        self.harness.check_available()
    }

    async fn probe(&self, model: &str) -> DomainResult<()> {
        let argv = self.harness.build_probe_cmd(model);
        let output = self
            .spawn_and_wait(argv, None, Vec::new(), PROBE_TIMEOUT)
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DomainError::Invocation(format!(
                "probe exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
