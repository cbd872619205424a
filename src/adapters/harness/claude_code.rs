//! Claude Code CLI harness.
//!
//! Non-interactive `claude --print` runs with explicit session ids.
//! With structured output requested the CLI streams JSON events, one
//! per line; assistant text and the session id are extracted from the
//! stream.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::HarnessKind;
use crate::domain::ports::{Harness, Invocation, ParsedOutput};

use super::binary_on_path;

/// Adapter for the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeHarness {
    binary: String,
}

impl Default for ClaudeCodeHarness {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }
}

impl ClaudeCodeHarness {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn extract_text(json: &Value) -> Option<String> {
        match json.get("type").and_then(Value::as_str)? {
            "assistant" => {
                let content = json.get("message")?.get("content")?;
                match content {
                    Value::String(text) => Some(text.clone()),
                    Value::Array(parts) => {
                        let mut text = String::new();
                        for part in parts {
                            if part.get("type").and_then(Value::as_str) == Some("text") {
                                if let Some(chunk) = part.get("text").and_then(Value::as_str) {
                                    text.push_str(chunk);
                                    text.push('\n');
                                }
                            }
                        }
                        (!text.is_empty()).then_some(text)
                    }
                    _ => None,
                }
            }
            "result" => json
                .get("result")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        }
    }
}

impl Harness for ClaudeCodeHarness {
    fn kind(&self) -> HarnessKind {
        HarnessKind::ClaudeCode
    }

    fn build_cmd(&self, invocation: &Invocation) -> Vec<String> {
        let mut args = vec![self.binary.clone(), "--print".to_string()];

        if invocation.structured {
            args.push("--output-format".to_string());
            args.push("stream-json".to_string());
            args.push("--verbose".to_string());
        }

        args.push("--model".to_string());
        args.push(invocation.model.clone());

        // Agents run unattended inside a disposable worktree.
        args.push("--dangerously-skip-permissions".to_string());

        if let Some(session_id) = &invocation.session_id {
            if invocation.resume {
                args.push("--resume".to_string());
            } else {
                args.push("--session-id".to_string());
            }
            args.push(session_id.clone());
        }

        args.push(invocation.prompt.clone());
        args
    }

    /// The prompt travels in argv; stdin closes immediately.
    fn process_stdin(&self, _prompt: &str) -> Vec<u8> {
        Vec::new()
    }

    fn make_session_id(&self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }

    fn parse_output(&self, raw: &str, current_session_id: Option<&str>) -> ParsedOutput {
        let mut text = String::new();
        let mut session_id = current_session_id.map(ToString::to_string);

        for line in raw.lines() {
            let Ok(json) = serde_json::from_str::<Value>(line) else {
                // Plain output from an older CLI or a debugging human.
                if !line.trim().is_empty() {
                    text.push_str(line);
                    text.push('\n');
                }
                continue;
            };
            if let Some(sid) = json.get("session_id").and_then(Value::as_str) {
                session_id = Some(sid.to_string());
            }
            if let Some(chunk) = Self::extract_text(&json) {
                text.push_str(&chunk);
                if !text.ends_with('\n') {
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
            "--print".to_string(),
            "--model".to_string(),
            model.to_string(),
            "say ok".to_string(),
        ]
    }
}
