//! Error types for the GitLab reconciler

use thiserror::Error;

use crate::config::ConfigError;
use crate::host::HostError;
use crate::relations::{ProxyConfigError, RelationError};
use crate::store::StoreError;

/// Error variants are named with the `Error` suffix for clarity (e.g., `StoreError`, `ValidationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Host error: {0}")]
    HostError(#[from] HostError),

    #[error("Relation error: {0}")]
    RelationError(#[from] RelationError),

    #[error("Reverse proxy configuration error: {0}")]
    ProxyConfigError(#[from] ProxyConfigError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("IO error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid version {version:?}: {message}")]
    InvalidVersion { version: String, message: String },

    #[error("GitLab upgrade did not converge after {0} rounds")]
    UpgradeDidNotConverge(usize),

    #[error("Unknown hook: {0}")]
    UnknownHook(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

impl Error {
    /// Whether the failure is caused by operator input rather than the host
    pub fn is_config_problem(&self) -> bool {
        matches!(
            self,
            Error::ValidationError(_)
                | Error::InvalidVersion { .. }
                | Error::ConfigError(_)
                | Error::ProxyConfigError(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
