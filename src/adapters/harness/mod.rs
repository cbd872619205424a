//! Harness adapter implementations.
//!
//! One adapter per supported agent CLI, each implementing the
//! [`Harness`](crate::domain::ports::Harness) contract, plus the runner
//! that executes invocations and the registry that resolves a
//! configured kind to its adapter.

pub mod claude_code;
pub mod codex;
pub mod registry;
pub mod runner;

pub use claude_code::ClaudeCodeHarness;
pub use codex::CodexHarness;
pub use registry::HarnessRegistry;
pub use runner::HarnessRunner;

use std::path::Path;

/// Whether `name` resolves to a file on the PATH.
pub(crate) fn binary_on_path(name: &str) -> bool {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(name).is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_on_path_finds_sh() {
        assert!(binary_on_path("sh"));
    }

    #[test]
    fn test_binary_on_path_misses_nonsense() {
        assert!(!binary_on_path("definitely-not-a-real-binary-9f2c"));
    }
}
