//! Harness registry.
//!
//! Resolves a configured [`HarnessKind`] to its runner. The registry
//! replaces any dispatch-by-kind in the core: the engine asks for a
//! runner once at spawn time and an unregistered kind is a launch-time
//! error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::HarnessKind;
use crate::domain::ports::AgentRunner;

use super::claude_code::ClaudeCodeHarness;
use super::codex::CodexHarness;
use super::runner::HarnessRunner;

/// Kind-indexed runners for every supported agent CLI.
pub struct HarnessRegistry {
    runners: HashMap<HarnessKind, Arc<dyn AgentRunner>>,
}

impl HarnessRegistry {
    /// Registry with every built-in adapter, each sharing one
    /// per-cycle subprocess timeout.
    pub fn with_defaults(subprocess_timeout: Duration) -> Self {
        let mut registry = Self {
            runners: HashMap::new(),
        };
        registry.register(
            HarnessKind::ClaudeCode,
            Arc::new(HarnessRunner::new(
                Arc::new(ClaudeCodeHarness::default()),
                subprocess_timeout,
            )),
        );
        registry.register(
            HarnessKind::Codex,
            Arc::new(HarnessRunner::new(
                Arc::new(CodexHarness::default()),
                subprocess_timeout,
            )),
        );
        registry
    }

    /// Register (or replace) the runner for a kind.
    pub fn register(&mut self, kind: HarnessKind, runner: Arc<dyn AgentRunner>) {
        self.runners.insert(kind, runner);
    }

    /// Runner for a configured kind.
    pub fn runner(&self, kind: HarnessKind) -> DomainResult<Arc<dyn AgentRunner>> {
        self.runners
            .get(&kind)
            .cloned()
            .ok_or_else(|| DomainError::UnknownHarness(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = HarnessRegistry::with_defaults(Duration::from_secs(300));
        assert!(registry.runner(HarnessKind::ClaudeCode).is_ok());
        assert!(registry.runner(HarnessKind::Codex).is_ok());
    }

    #[test]
    fn test_empty_registry_rejects_kind() {
        let registry = HarnessRegistry {
            runners: HashMap::new(),
        };
        assert!(matches!(
            registry.runner(HarnessKind::Codex),
            Err(DomainError::UnknownHarness(_))
        ));
    }
}
