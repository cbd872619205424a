//! `oompa run`: launch a swarm.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapters::harness::HarnessRegistry;
use crate::infrastructure::{config::ConfigLoader, logging};
use crate::services::swarm::{resolve_project_root, SwarmCoordinator};

/// Load the config, set up logging for the run, launch the swarm and
/// wait for its stopped reason.
pub async fn handle_run(project_root: Option<&Path>, config_path: &Path) -> Result<()> {
    let project_root = resolve_project_root(project_root)?;
    let config = ConfigLoader::load(config_path)?;

    let run_dir = project_root
        .join(&config.settings.runs_root)
        .join(&config.id);
    let _log_guard = logging::init_with_run_file(&run_dir)?;

    let registry = Arc::new(HarnessRegistry::with_defaults(Duration::from_secs(
        config.settings.subprocess_timeout_secs,
    )));

    let swarm_id = config.id.clone();
    let reason = SwarmCoordinator::new(config, project_root, registry)
        .launch()
        .await?;
    info!(swarm_id = %swarm_id, reason = ?reason, "Swarm stopped");
    Ok(())
}
