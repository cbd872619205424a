//! Terminal signals agents emit on stdout.
//!
//! Signals are deliberately text-shaped so a human can type them into a
//! transcript while debugging. Recognition is plain substring matching,
//! except `CLAIM(...)` which extracts its id list.

use regex::Regex;
use std::sync::OnceLock;

/// A recognized terminal token in agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `__DONE__`: the agent considers its mission over for this session.
    Done,
    /// `COMPLETE_AND_READY_FOR_MERGE`: work in the workspace is ready.
    CompleteAndReadyForMerge,
    /// `CLAIM(id1, id2, ...)`: the agent wants these tasks.
    Claim(Vec<String>),
}

const DONE_TOKEN: &str = "__DONE__";
const MERGE_TOKEN: &str = "COMPLETE_AND_READY_FOR_MERGE";

fn claim_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"CLAIM\(([^)]*)\)").unwrap())
}

impl Signal {
    /// Parse the highest-priority signal present in `output`, if any.
    ///
    /// Priority: `__DONE__` > `COMPLETE_AND_READY_FOR_MERGE` > `CLAIM`.
    /// When several signals appear in one output only the highest acts.
    /// Matching is case-sensitive.
    pub fn parse(output: &str) -> Option<Self> {
        if output.contains(DONE_TOKEN) {
            return Some(Self::Done);
        }
        if output.contains(MERGE_TOKEN) {
            return Some(Self::CompleteAndReadyForMerge);
        }
        claim_re().captures(output).map(|caps| {
            let ids = caps[1]
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect();
            Self::Claim(ids)
        })
    }
}
