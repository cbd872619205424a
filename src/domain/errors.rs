//! Domain errors for the oompa swarm system.

use thiserror::Error;

/// Domain-level errors that can occur while a swarm is running.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown harness kind: {0}")]
    UnknownHarness(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Workspace operation failed: {0}")]
    Workspace(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Agent invocation failed: {0}")]
    Invocation(String),

    #[error("Agent invocation timed out after {0}s")]
    InvocationTimeout(u64),

    #[error("Event already recorded at {0}")]
    EventExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
