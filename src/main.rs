// ABOUTME: Entry point for the stagecoach CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stagecoach::config::Config;
use stagecoach::error::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = Config::locate(cli.config.as_deref());
    match cli.command {
        Commands::Serve { listen } => commands::serve(&config_path, listen).await,
        Commands::Deploy {
            project,
            branch,
            archive,
        } => commands::deploy(&config_path, &project, &branch, archive).await,
        Commands::Check => commands::check(&config_path),
    }
}
