//! Event recorder.
//!
//! Append-only, immutable event files under `runs/{swarm-id}/`. Every
//! write serializes to YAML, lands in `{path}.tmp` and is renamed into
//! place, so readers see either no file or a complete one. A final path
//! is never opened for write: attempting to record over an existing
//! event is an error. The recorder keeps no aggregates; summarization
//! is a reader concern.

use std::path::{Path, PathBuf};
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CycleEvent, ReviewEvent, StartedEvent, StoppedEvent};

/// File extension for event and task records.
pub const EVENT_EXT: &str = "yaml";

/// Writes the four immutable event shapes for one swarm run.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    run_dir: PathBuf,
}

impl EventRecorder {
    /// Recorder for `{runs_root}/{swarm_id}`.
    pub fn new(runs_root: impl AsRef<Path>, swarm_id: &str) -> Self {
        Self {
            run_dir: runs_root.as_ref().join(swarm_id),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Create the run directory and its subdirectories.
    pub async fn ensure_layout(&self) -> DomainResult<()> {
        fs::create_dir_all(self.run_dir.join("cycles")).await?;
        fs::create_dir_all(self.run_dir.join("reviews")).await?;
        Ok(())
    }

    /// Record the one `started` event, at swarm launch.
    pub async fn record_started(&self, event: &StartedEvent) -> DomainResult<PathBuf> {
        self.write(&format!("started.{EVENT_EXT}"), event).await
    }

    /// Record the one `stopped` event, at swarm end.
    pub async fn record_stopped(&self, event: &StoppedEvent) -> DomainResult<PathBuf> {
        self.write(&format!("stopped.{EVENT_EXT}"), event).await
    }

    /// Record a cycle event at `cycles/{worker-id}-c{N}.yaml`.
    pub async fn record_cycle(&self, event: &CycleEvent) -> DomainResult<PathBuf> {
        let rel = format!("cycles/{}-c{}.{EVENT_EXT}", event.worker_id, event.cycle);
        self.write(&rel, event).await
    }

    /// Record a review event at `reviews/{worker-id}-c{N}-r{R}.yaml`.
    pub async fn record_review(&self, event: &ReviewEvent) -> DomainResult<PathBuf> {
        let rel = format!(
            "reviews/{}-c{}-r{}.{EVENT_EXT}",
            event.worker_id, event.cycle, event.round
        );
        self.write(&rel, event).await
    }

    async fn write<T: Serialize>(&self, rel: &str, event: &T) -> DomainResult<PathBuf> {
        let path = self.run_dir.join(rel);
        if path.exists() {
            return Err(DomainError::EventExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let yaml = serde_yaml::to_string(event)?;
        let tmp = path.with_extension(format!("{EVENT_EXT}.tmp"));
        fs::write(&tmp, yaml).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Event recorded");
        Ok(path)
    }
}
