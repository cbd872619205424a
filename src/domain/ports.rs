//! Ports: the contracts the core consumes from harness adapters.
//!
//! The worker engine never learns how a given agent CLI is invoked. It
//! hands an [`Invocation`] to an [`AgentRunner`] and receives an
//! [`InvocationResult`]; the adapter behind the runner owns command
//! construction, stdin policy, output parsing and the subprocess
//! timeout.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::DomainResult;
use crate::domain::models::HarnessKind;

/// Everything the engine knows about one agent run.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Working directory for the subprocess (the worker's workspace).
    pub cwd: PathBuf,
    /// Model name passed through to the agent CLI.
    pub model: String,
    /// Optional reasoning-effort tag.
    pub reasoning: Option<String>,
    /// Session identifier, when the harness tracks sessions explicitly.
    pub session_id: Option<String>,
    /// Whether to resume the session instead of starting fresh.
    pub resume: bool,
    /// The prompt, opaque to the adapter.
    pub prompt: String,
    /// Request structured (streamed-event) output when supported.
    pub structured: bool,
}

/// Raw and parsed results of one agent run.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Assistant-visible text extracted from the raw output.
    pub text: String,
    /// Session identifier extracted from the output, if the harness
    /// surfaces one.
    pub session_id: Option<String>,
}

/// Output of [`Harness::parse_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub text: String,
    pub session_id: Option<String>,
}

/// Adapter contract for one agent CLI.
///
/// Implementations live outside the core; the set of recognized kinds is
/// a configuration enumeration and an unknown kind is a launch-time
/// error raised by the registry.
pub trait Harness: Send + Sync {
    /// Which kind this adapter serves.
    fn kind(&self) -> HarnessKind;

    /// Build the argv vector for an invocation.
    fn build_cmd(&self, invocation: &Invocation) -> Vec<String>;

    /// Bytes to pipe on stdin: the prompt, or empty to close immediately.
    fn process_stdin(&self, prompt: &str) -> Vec<u8>;

    /// A fresh session identifier, or `None` for harnesses that generate
    /// ids implicitly.
    fn make_session_id(&self) -> Option<String>;

    /// Extract assistant-visible text and the session identifier from
    /// raw stdout.
    fn parse_output(&self, raw: &str, current_session_id: Option<&str>) -> ParsedOutput;

    /// Whether the harness binary is on PATH.
    fn check_available(&self) -> bool;

    /// Argv for the startup-validation probe ("say ok").
    fn build_probe_cmd(&self, model: &str) -> Vec<String>;
}

/// Executes invocations against one harness.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent to completion and return its output.
    ///
    /// A non-zero exit is reported in the result, not as an error;
    /// errors mean the subprocess could not run (spawn failure,
    /// timeout).
    async fn run(&self, invocation: Invocation) -> DomainResult<InvocationResult>;

    /// Fresh session identifier for the underlying harness, if any.
    fn make_session_id(&self) -> Option<String>;

    /// Whether the harness binary is on PATH.
    fn check_available(&self) -> bool;

    /// Run the startup-validation probe ("say ok") for a model.
    async fn probe(&self, model: &str) -> DomainResult<()>;
}
