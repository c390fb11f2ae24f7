// ABOUTME: Serve command: runs the HTTP trigger endpoint and background watchers.
// ABOUTME: Exits once a restart was requested and the last deployment has finished.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stagecoach::config::{ConfigStore, watch_config};
use stagecoach::deploy::{DeployEngine, EngineOptions};
use stagecoach::error::Result;
use stagecoach::notify::WebhookNotifier;
use stagecoach::server::{self, AppState};
use stagecoach::shutdown::{ShutdownCoordinator, watch_executable};

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

pub async fn serve(config_path: &Path, listen: Option<String>) -> Result<()> {
    let store = ConfigStore::open(config_path)?;
    let config = store.config();
    let shutdown = ShutdownCoordinator::new();

    let engine = DeployEngine::new(
        EngineOptions::from_config(&config),
        Arc::new(WebhookNotifier::new()),
        shutdown.clone(),
    );

    tokio::spawn(watch_config(store.clone(), WATCH_INTERVAL));

    match std::env::current_exe() {
        Ok(exe) => {
            tokio::spawn(watch_executable(shutdown.clone(), exe, WATCH_INTERVAL));
        }
        Err(e) => tracing::warn!("cannot locate own executable, restart on upgrade disabled: {e}"),
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(
                    "interrupt received; exiting after {} deployment(s) finish",
                    shutdown.in_flight()
                );
                shutdown.request_exit();
            }
        });
    }

    let listen = listen.unwrap_or_else(|| config.listen.clone());
    server::serve(
        AppState {
            engine,
            config: store,
        },
        &listen,
    )
    .await?;

    tracing::info!("no deployments in flight, exiting");
    Ok(())
}
