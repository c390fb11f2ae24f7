// ABOUTME: HTTP trigger endpoint and deployment log reader.
// ABOUTME: Validates project, key, and branch, then hands the request to the engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::config::ConfigStore;
use crate::deploy::{DeployEngine, DeployRequest, DeploymentLog, Source};
use crate::error::{Error, Result};

/// Largest accepted archive upload.
const MAX_UPLOAD: usize = 1024 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static UPLOADS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: DeployEngine,
    pub config: ConfigStore,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/stagecoach/deploy/:project/:branch",
            get(trigger_deploy).post(trigger_deploy),
        )
        .route("/stagecoach/deployment-logs/:file", get(deployment_log))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD))
        .with_state(state)
}

/// Serve until the shutdown coordinator has drained.
pub async fn serve(state: AppState, listen: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|source| Error::Bind {
            addr: listen.to_string(),
            source,
        })?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let shutdown = state.engine.shutdown().clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.drained().await })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TriggerQuery {
    key: Option<String>,
}

async fn trigger_deploy(
    State(state): State<AppState>,
    Path((project, branch)): Path<(String, String)>,
    Query(query): Query<TriggerQuery>,
    body: Bytes,
) -> Response {
    let config = state.config.config();

    let Ok(spec) = config.project(&project) else {
        return (StatusCode::NOT_FOUND, "no such project\n").into_response();
    };
    let Some(key) = query.key.filter(|k| !k.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing key\n").into_response();
    };
    if !spec.key_matches(&key) {
        tracing::warn!("rejected trigger for {project} ({branch}): bad key");
        return (StatusCode::FORBIDDEN, "invalid key\n").into_response();
    }
    let settings = match spec.resolve(&project, &branch, config.notify.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return (StatusCode::NOT_FOUND, format!("{e}\n")).into_response(),
    };

    let source = if body.is_empty() {
        Source::Repository
    } else if body.starts_with(&GZIP_MAGIC) {
        match store_upload(&state, settings.short_name.as_str(), &body).await {
            Ok(path) => Source::Archive {
                path,
                discard: true,
            },
            Err(e) => {
                tracing::error!("failed to store upload for {project}: {e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "cannot store upload\n")
                    .into_response();
            }
        }
    } else {
        return (StatusCode::BAD_REQUEST, "body must be a gzip-compressed tarball\n")
            .into_response();
    };

    match state.engine.trigger(DeployRequest { settings, source }) {
        Ok(accepted) => {
            tracing::info!(deployment = %accepted.id, "accepted trigger for {project} ({branch})");
            (StatusCode::OK, "deploying\n").into_response()
        }
        Err(Error::ShuttingDown) => {
            (StatusCode::SERVICE_UNAVAILABLE, "restarting, try again shortly\n").into_response()
        }
        Err(e) => {
            tracing::error!("failed to start deployment of {project} ({branch}): {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "cannot start deployment\n").into_response()
        }
    }
}

async fn store_upload(state: &AppState, short_name: &str, body: &[u8]) -> std::io::Result<PathBuf> {
    let dir = state.engine.layout().uploads_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let n = UPLOADS.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("{short_name}-{}-{n}.tar.gz", std::process::id()));
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

async fn deployment_log(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let dir = state.engine.layout().logs_dir();
    let Some(path) = DeploymentLog::locate(&dir, &file) else {
        return (StatusCode::NOT_FOUND, "no such log\n").into_response();
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            (StatusCode::NOT_FOUND, "no such log\n").into_response()
        }
    }
}
