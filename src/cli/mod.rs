//! CLI definitions and dispatch.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// oompa: parallel agent-worker swarm orchestrator.
#[derive(Debug, Parser)]
#[command(name = "oompa", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a swarm declared in a config file.
    Run {
        /// Swarm config file.
        #[arg(short, long, default_value = "swarm.yaml")]
        config: PathBuf,
    },

    /// Task-store operations.
    #[command(subcommand)]
    Task(TaskCommands),
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    /// Create a pending task.
    Add {
        /// Stable task identifier, unique across the swarm.
        id: String,
        /// Short summary.
        summary: String,
        /// Longer description for the agent prompt.
        #[arg(long)]
        description: Option<String>,
        /// Target file path (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,
        /// Priority; larger is more urgent.
        #[arg(long)]
        priority: Option<i64>,
        /// Task-store root, relative to the project root.
        #[arg(long, default_value = "tasks")]
        tasks_root: PathBuf,
    },
}
