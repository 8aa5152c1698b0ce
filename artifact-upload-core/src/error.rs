//! Error types for configuration resolution and upload runs.

use std::path::PathBuf;

use crate::contract::{BuildInfoError, ServiceError};

/// Errors produced while resolving configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': expected a boolean, got '{value}'")]
    InvalidBoolean { field: &'static str, value: String },

    #[error("invalid minimum checksum deploy size '{value}': {source}")]
    InvalidMinChecksumDeploySize {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid repository authentication: {0}")]
    InvalidAuth(String),

    #[error("invalid service configuration: {0}")]
    InvalidServiceConfig(String),
}

/// Errors surfaced by an upload run.
///
/// Initialisation variants abort the run before any transfer starts. Per-entry failures are
/// only logged and collapse into [`UploadError::FinishedWithErrors`].
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to prepare security directory {path}: {source}")]
    SecurityDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create repository service: {0}")]
    ServiceInit(ServiceError),

    #[error("failed to save build general details: {0}")]
    BuildGeneralDetails(BuildInfoError),

    #[error("Upload finished with errors. Please review the logs")]
    FinishedWithErrors,

    #[error("failed to save build info: {0}")]
    BuildInfoCommit(BuildInfoError),
}
