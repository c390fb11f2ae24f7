// ABOUTME: Deploy command implementation.
// ABOUTME: Runs one deployment in the foreground and reports the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stagecoach::config::Config;
use stagecoach::deploy::{DeployEngine, DeployRequest, EngineOptions, Source};
use stagecoach::error::Result;
use stagecoach::notify::WebhookNotifier;
use stagecoach::shutdown::ShutdownCoordinator;

/// Deploy `branch` of `project` now, from the repository or a local archive.
pub async fn deploy(
    config_path: &Path,
    project: &str,
    branch: &str,
    archive: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let settings = config.resolve(project, branch)?;
    let source = match archive {
        Some(path) => Source::Archive {
            path,
            discard: false,
        },
        None => Source::Repository,
    };

    let engine = DeployEngine::new(
        EngineOptions::from_config(&config),
        Arc::new(WebhookNotifier::new()),
        ShutdownCoordinator::new(),
    );

    println!("Deploying {project} ({branch})...");
    let outcome = engine.deploy(DeployRequest { settings, source }).await?;

    for warning in &outcome.warnings {
        eprintln!("Warning: {}", warning.message);
    }
    println!(
        "Deployed {} as {} ({})",
        project,
        outcome.id,
        outcome.content
    );
    Ok(())
}
