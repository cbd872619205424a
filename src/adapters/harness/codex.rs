//! Codex CLI harness.
//!
//! `codex exec --json` with the prompt piped on stdin. Codex generates
//! session ids implicitly; the id is lifted from the JSONL event
//! stream and later resumes pass it back as `exec resume <id>`.

use serde_json::Value;

use crate::domain::models::HarnessKind;
use crate::domain::ports::{Harness, Invocation, ParsedOutput};

use super::binary_on_path;

/// Adapter for the `codex` CLI.
#[derive(Debug, Clone)]
pub struct CodexHarness {
    binary: String,
}

impl Default for CodexHarness {
    fn default() -> Self {
        Self {
            binary: "codex".to_string(),
        }
    }
}

impl CodexHarness {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Harness for CodexHarness {
    fn kind(&self) -> HarnessKind {
        HarnessKind::Codex
    }

    fn build_cmd(&self, invocation: &Invocation) -> Vec<String> {
        let mut args = vec![self.binary.clone(), "exec".to_string()];

        if invocation.resume {
            if let Some(session_id) = &invocation.session_id {
                args.push("resume".to_string());
                args.push(session_id.clone());
            }
        }

        if invocation.structured {
            args.push("--json".to_string());
        }

        args.push("--model".to_string());
        args.push(invocation.model.clone());
        if let Some(reasoning) = &invocation.reasoning {
            args.push("-c".to_string());
            args.push(format!("model_reasoning_effort=\"{reasoning}\""));
        }

        args.push("--skip-git-repo-check".to_string());
        args.push("--dangerously-bypass-approvals-and-sandbox".to_string());

        // `-` reads the prompt from stdin.
        args.push("-".to_string());
        args
    }

    fn process_stdin(&self, prompt: &str) -> Vec<u8> {
        prompt.as_bytes().to_vec()
    }

    /// Codex mints its own session ids.
    fn make_session_id(&self) -> Option<String> {
        None
    }

    fn parse_output(&self, raw: &str, current_session_id: Option<&str>) -> ParsedOutput {
        let mut text = String::new();
        let mut session_id = current_session_id.map(ToString::to_string);

        for line in raw.lines() {
            let Ok(json) = serde_json::from_str::<Value>(line) else {
                if !line.trim().is_empty() {
                    text.push_str(line);
                    text.push('\n');
                }
                continue;
            };

            for key in ["session_id", "thread_id", "conversation_id"] {
                if let Some(sid) = json.get(key).and_then(Value::as_str) {
                    session_id = Some(sid.to_string());
                }
            }

            // Event payloads nest under "msg"; agent messages carry the
            // assistant-visible text.
            let msg = json.get("msg").unwrap_or(&json);
            let is_message = msg
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t == "agent_message" || t == "item.completed");
            if is_message {
                let chunk = msg
                    .get("message")
                    .or_else(|| msg.get("text"))
                    .and_then(Value::as_str);
                if let Some(chunk) = chunk {
                    text.push_str(chunk);
                    text.push('\n');
                }
            }
        }

        ParsedOutput { text, session_id }
    }

    fn check_available(&self) -> bool {
        binary_on_path(&self.binary)
    }

    fn build_probe_cmd(&self, model: &str) -> Vec<String> {
        vec![
            self.binary.clone(),
            "exec".to_string(),
            "--model".to_string(),
            model.to_string(),
            "--skip-git-repo-check".to_string(),
            "say ok".to_string(),
        ]
    }
}
