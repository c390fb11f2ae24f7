// ABOUTME: Application-wide error types for stagecoach.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployFailure;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("no such project: {0}")]
    UnknownProject(String),

    #[error("no branch '{branch}' configured for deployment of {project}")]
    UnknownBranch { project: String, branch: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shutting down, not accepting deployments")]
    ShuttingDown,

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Deploy(#[from] Box<DeployFailure>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
