//! Logging setup.
//!
//! Structured tracing to stderr, filtered by `RUST_LOG` (default
//! `info`), plus a per-run `orchestrator.log` under the run directory
//! when a swarm is launching. Event files remain the source of truth;
//! the log is for humans watching a run.

use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize stderr-only logging (CLI subcommands).
pub fn init() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

/// Initialize stderr logging plus a non-blocking `orchestrator.log`
/// inside the run directory. The returned guard must live until exit
/// so buffered lines are flushed.
pub fn init_with_run_file(run_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(run_dir)?;
    let appender = tracing_appender::rolling::never(run_dir, "orchestrator.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    Ok(guard)
}
