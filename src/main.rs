//! oompa CLI entry point.

use anyhow::Result;
use clap::Parser;

use oompa::cli::{commands, Cli, Commands, TaskCommands};
use oompa::infrastructure::logging;
use oompa::services::swarm::resolve_project_root;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            // Logging for a run is initialized once the swarm id is
            // known, so the log can live in the run directory.
            commands::run::handle_run(cli.project_root.as_deref(), &config).await
        }
        Commands::Task(TaskCommands::Add {
            id,
            summary,
            description,
            files,
            priority,
            tasks_root,
        }) => {
            logging::init()?;
            let project_root = resolve_project_root(cli.project_root.as_deref())?;
            commands::task::handle_add(
                &project_root,
                &tasks_root,
                id,
                summary,
                description,
                files,
                priority,
            )
            .await
        }
    }
}
