// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagecoach")]
#[command(about = "Self-hosted continuous deployment with atomic release swaps")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: $STAGECOACH_CONFIG or /usr/local/etc/stagecoach.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the deployment daemon
    Serve {
        /// Address to listen on, overriding the configuration
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Deploy a project branch in the foreground
    Deploy {
        /// Project name as configured
        project: String,

        /// Branch to deploy
        branch: String,

        /// Deploy from a gzip-compressed tarball instead of the repository
        #[arg(short, long)]
        archive: Option<PathBuf>,
    },

    /// Validate the configuration file
    Check,
}
