//! Review loop.
//!
//! Bounded propose-fix iteration between a worker and the reviewer. The
//! reviewer is stateless: every round runs a fresh subprocess over the
//! current diff plus the accumulated feedback from earlier rounds. Each
//! round emits exactly one review event.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use chrono::Utc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ReviewEvent, ReviewerSpec, Verdict, Workspace};
use crate::domain::ports::{AgentRunner, Invocation};
use crate::services::prompt;
use crate::services::recorder::EventRecorder;
use crate::services::workspace::WorkspaceService;

/// Diff sent to the reviewer is truncated to this many characters.
const DIFF_LIMIT: usize = 8000;

/// What the loop decided, and after how many rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub verdict: Verdict,
    pub rounds: u32,
}

/// The worker-side half of a fix round: which runner and session apply
/// the reviewer's feedback inside the workspace.
#[derive(Clone)]
pub struct FixContext {
    pub runner: Arc<dyn AgentRunner>,
    pub model: String,
    pub reasoning: Option<String>,
    pub session_id: Option<String>,
}

/// Bounded reviewer adjudication for one worker's change.
pub struct ReviewLoop {
    runner: Arc<dyn AgentRunner>,
    spec: ReviewerSpec,
    reviewer_text: String,
}

impl ReviewLoop {
    pub fn new(runner: Arc<dyn AgentRunner>, spec: ReviewerSpec, reviewer_text: String) -> Self {
        Self {
            runner,
            spec,
            reviewer_text,
        }
    }

    /// Run up to `max_rounds` reviewer rounds over the workspace diff.
    ///
    /// Returns `approved`/`rejected` as soon as the reviewer says so; a
    /// `needs-changes` verdict triggers a fix subprocess and another
    /// round, until the budget runs out and the change is returned as
    /// not approved.
    pub async fn run(
        &self,
        worker_id: &str,
        cycle: u32,
        workspace: &Workspace,
        workspaces: &WorkspaceService,
        fix: &FixContext,
        recorder: &EventRecorder,
    ) -> DomainResult<ReviewOutcome> {
        let mut feedback = String::new();

        for round in 1..=self.spec.max_rounds {
            let diff = workspaces.diff_text(workspace, DIFF_LIMIT).await?;
            let diff_files = workspaces.diff_filenames(workspace).await?;

            let invocation = Invocation {
                cwd: workspace.dir.clone(),
                model: self.spec.model.clone(),
                reasoning: self.spec.reasoning.clone(),
                session_id: None,
                resume: false,
                prompt: prompt::review_round(&self.reviewer_text, &diff, &feedback),
                structured: false,
            };
            let result = self.runner.run(invocation).await?;
            let verdict = parse_verdict(&result.text);

            info!(
                worker_id = %worker_id,
                cycle = cycle,
                round = round,
                verdict = ?verdict,
                "Review round finished"
            );
            recorder
                .record_review(&ReviewEvent {
                    worker_id: worker_id.to_string(),
                    cycle,
                    round,
                    verdict,
                    at: Utc::now(),
                    reviewer_output: result.text.clone(),
                    diff_files,
                })
                .await?;

            match verdict {
                Verdict::Approved | Verdict::Rejected => {
                    return Ok(ReviewOutcome { verdict, rounds: round });
                }
                Verdict::NeedsChanges => {
                    if round == self.spec.max_rounds {
                        return Ok(ReviewOutcome { verdict, rounds: round });
                    }
                    feedback.push_str(&format!("### Round {round}\n{}\n", result.text));

                    let fix_invocation = Invocation {
                        cwd: workspace.dir.clone(),
                        model: fix.model.clone(),
                        reasoning: fix.reasoning.clone(),
                        session_id: fix.session_id.clone(),
                        resume: fix.session_id.is_some(),
                        prompt: prompt::fix_feedback(&feedback),
                        structured: true,
                    };
                    let fix_result = fix.runner.run(fix_invocation).await?;
                    if fix_result.exit_code != 0 {
                        // The next round reviews whatever state remains.
                        warn!(
                            worker_id = %worker_id,
                            cycle = cycle,
                            round = round,
                            "Fix subprocess exited non-zero"
                        );
                    }
                }
            }
        }

        // max_rounds >= 1 always returns inside the loop.
        Ok(ReviewOutcome {
            verdict: Verdict::NeedsChanges,
            rounds: self.spec.max_rounds,
        })
    }
}

/// Parse a reviewer verdict from raw output.
///
/// Precedence: an explicit `VERDICT: ...` line; then the first of
/// `APPROVED` or `REJECTED` as a standalone word (case-insensitive);
/// otherwise needs-changes.
pub fn parse_verdict(text: &str) -> Verdict {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    static WORD_RE: OnceLock<Regex> = OnceLock::new();

    let line_re = LINE_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*VERDICT:\s*(APPROVED|NEEDS_CHANGES|REJECTED)\b").unwrap()
    });
    if let Some(caps) = line_re.captures(text) {
        return match &caps[1] {
            "APPROVED" => Verdict::Approved,
            "REJECTED" => Verdict::Rejected,
            _ => Verdict::NeedsChanges,
        };
    }

    let word_re = WORD_RE.get_or_init(|| Regex::new(r"(?i)\b(APPROVED|REJECTED)\b").unwrap());
    if let Some(m) = word_re.find(text) {
        if m.as_str().eq_ignore_ascii_case("APPROVED") {
            return Verdict::Approved;
        }
        return Verdict::Rejected;
    }

    Verdict::NeedsChanges
}
