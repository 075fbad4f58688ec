//! `launchkit`: launch and supervise a coding agent CLI from the terminal.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use color_eyre::eyre::eyre;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();
    logging::init_logging(cli.log_level).map_err(|e| eyre!(e))?;

    commands::run(cli).await
}
