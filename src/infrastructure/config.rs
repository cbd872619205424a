//! Swarm configuration loader.
//!
//! Hierarchical merging with figment, then a validation pass that
//! fails fast. An unknown harness kind, a missing model or a malformed
//! file never make it past launch.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{ReviewerSpec, SwarmConfig, SwarmSettings, WorkerSpec};

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Swarm declares no workers (and no planner)")]
    NoWorkers,

    #[error("Worker {0} has an empty model string")]
    EmptyModel(String),

    #[error("Worker {0} has max_cycles 0; the worker would never run")]
    ZeroCycles(String),

    #[error("Invalid working_resumes_max: 0. The stuck detector needs at least one resume")]
    ZeroWorkingResumes,

    #[error("Invalid task_poll_secs: 0. Backpressure polling needs a positive interval")]
    ZeroPollInterval,

    #[error("Reviewer has an empty model string")]
    EmptyReviewerModel,
}

/// On-disk shape of the swarm file: worker list, optional planner seat,
/// optional reviewer seat, shared settings.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawSwarm {
    #[serde(default)]
    workers: Vec<WorkerSpec>,
    #[serde(default)]
    planner: Option<WorkerSpec>,
    #[serde(default)]
    reviewer: Option<ReviewerSpec>,
    #[serde(default)]
    settings: SwarmSettings,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a swarm declaration.
    ///
    /// Precedence (lowest to highest): programmatic defaults, the YAML
    /// file, `OOMPA_*` environment variables.
    pub fn load(path: &Path) -> Result<SwarmConfig> {
        let raw: RawSwarm = Figment::new()
            .merge(Serialized::defaults(RawSwarm::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("OOMPA_").split("__"))
            .extract()
            .with_context(|| format!("failed to load swarm config from {}", path.display()))?;

        let mut workers = Vec::with_capacity(raw.workers.len() + 1);
        if let Some(mut planner) = raw.planner {
            planner.can_plan = true;
            workers.push(planner);
        }
        workers.extend(raw.workers);

        // Positional ids, unless the file named a seat explicitly.
        for (position, worker) in workers.iter_mut().enumerate() {
            if worker.id.is_empty() {
                worker.id = format!("w{position}");
            }
        }

        let config = SwarmConfig {
            id: SwarmConfig::generate_id(),
            config_path: path.to_path_buf(),
            workers,
            reviewer: raw.reviewer,
            settings: raw.settings,
        };
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a loaded configuration.
    pub fn validate(config: &SwarmConfig) -> Result<(), ConfigError> {
        if config.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }
        for worker in &config.workers {
            if worker.model.trim().is_empty() {
                return Err(ConfigError::EmptyModel(worker.id.clone()));
            }
            if worker.max_cycles == 0 {
                return Err(ConfigError::ZeroCycles(worker.id.clone()));
            }
        }
        if let Some(reviewer) = &config.reviewer {
            if reviewer.model.trim().is_empty() {
                return Err(ConfigError::EmptyReviewerModel);
            }
        }
        if config.settings.working_resumes_max == 0 {
            return Err(ConfigError::ZeroWorkingResumes);
        }
        if config.settings.task_poll_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}
