//! Command implementations

mod config;
mod grid;
mod jobs;

use crate::cli::{Cli, Commands};
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use anyhow::Result;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Grid(args) => grid::execute(args, &config, &output),
        Commands::Jobs(command) => jobs::execute(command, &config, &output).await,
        Commands::Config => config::execute(&config, &output),
    }
}
