//! Prompt assembly.
//!
//! Composes the fresh-start prompt (task header + status block + the
//! worker's prompt files) and the small fixed prompts the engine
//! injects mid-session. Substitution context is built by the caller;
//! the templates themselves are opaque strings.

use std::collections::BTreeMap;
use tokio::fs;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::task::{ClaimResult, Task};
use crate::domain::models::WorkerSpec;

/// Token values substituted into prompt templates as `{token}`.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub context_header: String,
    pub targets: String,
    pub mode_hint: String,
    /// Additional caller-supplied tokens.
    pub extra: BTreeMap<String, String>,
}

impl PromptContext {
    fn tokens(&self) -> BTreeMap<&str, &str> {
        let mut map: BTreeMap<&str, &str> = BTreeMap::new();
        map.insert("context_header", self.context_header.as_str());
        map.insert("targets", self.targets.as_str());
        map.insert("mode_hint", self.mode_hint.as_str());
        for (k, v) in &self.extra {
            map.insert(k.as_str(), v.as_str());
        }
        map
    }
}

/// Replace every `{token}` occurrence with its context value. Unknown
/// tokens are left in place.
pub fn substitute(template: &str, ctx: &PromptContext) -> String {
    let mut out = template.to_string();
    for (token, value) in ctx.tokens() {
        out = out.replace(&format!("{{{token}}}"), value);
    }
    out
}

/// The fresh-start prompt: task header, status block, then the worker's
/// prompt files in order, with token substitution applied to the files.
pub async fn assemble_fresh(
    spec: &WorkerSpec,
    cycle: u32,
    pending: &[Task],
    claimed: &[String],
    ctx: &PromptContext,
) -> DomainResult<String> {
    let mut prompt = String::new();
    prompt.push_str(&task_header(spec, cycle));
    prompt.push_str(&status_block(pending, claimed));

    for path in &spec.prompts {
        let text = fs::read_to_string(path).await.map_err(|e| {
            DomainError::Config(format!("prompt file {} unreadable: {e}", path.display()))
        })?;
        prompt.push_str(&substitute(&text, ctx));
        prompt.push('\n');
    }

    Ok(prompt)
}

fn task_header(spec: &WorkerSpec, cycle: u32) -> String {
    format!(
        "You are worker {} (cycle {cycle} of {}).\n\
         Claim tasks by printing CLAIM(id, ...). When your change is ready, print \
         COMPLETE_AND_READY_FOR_MERGE. Print __DONE__ when there is nothing left for you to do.\n\n",
        spec.id, spec.max_cycles
    )
}

fn status_block(pending: &[Task], claimed: &[String]) -> String {
    let mut block = String::from("## Task board\n");
    if pending.is_empty() {
        block.push_str("No pending tasks.\n");
    } else {
        for task in pending {
            block.push_str(&format!("- {}: {}\n", task.id, task.summary));
        }
    }
    if !claimed.is_empty() {
        block.push_str(&format!("Currently claimed by you: {}\n", claimed.join(", ")));
    }
    block.push('\n');
    block
}

/// Minimal resume prompt used when no override is queued.
pub fn continue_prompt() -> String {
    "Continue working.".to_string()
}

/// Override queued when the working-resume counter reaches its cap.
pub fn stuck_nudge() -> String {
    "You have gone several turns without a terminal signal. Either finish and print \
     COMPLETE_AND_READY_FOR_MERGE, or print __DONE__ if you cannot make progress."
        .to_string()
}

/// Override injected after the framework processed a CLAIM.
pub fn claim_results(results: &[(String, ClaimResult)]) -> String {
    let mut prompt = String::from("Claim results:\n");
    for (id, result) in results {
        prompt.push_str(&format!("- {id}: {result}\n"));
    }
    prompt.push_str(
        "Work only on the tasks listed as claimed. When the change is ready, print \
         COMPLETE_AND_READY_FOR_MERGE.\n",
    );
    prompt
}

/// One-shot prompt for the agent-driven conflict resolver.
pub fn conflict_resolution(files: &[String]) -> String {
    format!(
        "A merge of the main branch into this workspace stopped on conflicts in:\n{}\n\
         Resolve every conflict in place, removing all conflict markers. Do not commit.",
        files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// Prompt for the fix subprocess between review rounds.
pub fn fix_feedback(feedback: &str) -> String {
    format!(
        "A reviewer looked at your change and asked for fixes. Address every point below, \
         then stop.\n\n{feedback}"
    )
}

/// Standing reviewer instructions used when the reviewer config names
/// no prompt file.
pub fn reviewer_default() -> String {
    "You are reviewing a change produced by an autonomous coding agent. Judge whether the \
     diff below is correct, complete and safe to land on the main branch."
        .to_string()
}

/// Prompt for one reviewer round.
pub fn review_round(reviewer_text: &str, diff: &str, previous_feedback: &str) -> String {
    let mut prompt = format!(
        "{reviewer_text}\n\nRespond with a line `VERDICT: APPROVED`, `VERDICT: NEEDS_CHANGES` \
         or `VERDICT: REJECTED`, followed by your reasoning.\n\n## Diff\n{diff}\n"
    );
    if !previous_feedback.is_empty() {
        prompt.push_str(&format!(
            "\n## Previous rounds\nYou already reviewed earlier revisions of this change. \
             Verify the points below were addressed; do not raise new issues.\n{previous_feedback}\n"
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::HarnessKind;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            id: "w0".to_string(),
            harness: HarnessKind::ClaudeCode,
            model: "opus".to_string(),
            reasoning: None,
            max_cycles: 5,
            prompts: vec![],
            can_plan: true,
            wait_between: None,
            review: true,
        }
    }

    #[test]
    fn test_substitute_known_and_unknown_tokens() {
        let ctx = PromptContext {
            context_header: "repo: oompa".to_string(),
            targets: "src/".to_string(),
            mode_hint: String::new(),
            extra: BTreeMap::new(),
        };
        let out = substitute("{context_header} | {targets} | {unknown}", &ctx);
        assert_eq!(out, "repo: oompa | src/ | {unknown}");
    }

    #[tokio::test]
    async fn test_assemble_fresh_lists_pending_tasks() {
        let pending = vec![Task::new("task-001", "fix login")];
        let prompt = assemble_fresh(&spec(), 1, &pending, &[], &PromptContext::default())
            .await
            .unwrap();
        assert!(prompt.contains("worker w0"));
        assert!(prompt.contains("task-001: fix login"));
    }

    #[test]
    fn test_claim_results_prompt() {
        let results = vec![
            ("task-a".to_string(), ClaimResult::Claimed),
            ("task-b".to_string(), ClaimResult::AlreadyClaimed),
        ];
        let prompt = claim_results(&results);
        assert!(prompt.contains("task-a: claimed"));
        assert!(prompt.contains("task-b: already-claimed"));
    }

    #[test]
    fn test_review_round_mentions_previous_feedback_block() {
        let with = review_round("Review this.", "diff", "round 1: rename the fn");
        assert!(with.contains("Previous rounds"));
        assert!(with.contains("do not raise new issues"));
        let without = review_round("Review this.", "diff", "");
        assert!(!without.contains("Previous rounds"));
    }
}
