//! # contract: collaborator interfaces for the upload pipeline
//!
//! This module defines the two seams the orchestrator talks through:
//!
//! - [`RepositoryService`]: transfers the files selected by one set of [`UploadParams`]
//!   to a remote artifact repository and reports what happened.
//! - [`BuildInfoStore`]: persists build-info general details and partial build infos, and
//!   formats build properties for a build.
//!
//! Both traits are annotated for `mockall` so tests can script deterministic collaborators.
//! Error types are boxed: implementors convert their own failures into a boxed error.
//!
//! The plain data types here ([`FileInfo`], [`BuildArtifact`], [`PartialBuildInfo`],
//! [`TransferSummary`]) are what flows back from the collaborators.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::upload_params::UploadParams;

/// Error returned by a repository service implementation.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by a build-info store implementation.
pub type BuildInfoError = Box<dyn std::error::Error + Send + Sync>;

/// Describes one file the repository service transferred successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Local path the file was read from.
    pub local_path: PathBuf,
    /// Path inside the repository, starting with the repository key.
    pub repository_path: String,
    /// Hex-encoded SHA-256 of the uploaded content.
    pub sha256: String,
    pub size: u64,
}

impl FileInfo {
    /// Projects the descriptor into the record attached to a build.
    pub fn to_build_artifact(&self) -> BuildArtifact {
        let name = self
            .repository_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository_path)
            .to_string();
        BuildArtifact {
            name,
            path: self.repository_path.clone(),
            sha256: self.sha256.clone(),
        }
    }
}

/// An artifact as recorded in build info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub name: String,
    pub path: String,
    pub sha256: String,
}

/// One contribution to a build, written by a single upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialBuildInfo {
    /// Milliseconds since the Unix epoch at which the partial was created.
    pub timestamp: i64,
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
}

/// Callback that fills in a partial build info before it is persisted.
pub type PopulatePartial = Box<dyn FnOnce(&mut PartialBuildInfo) + Send>;

/// Result of uploading the files selected by one set of upload parameters.
///
/// `succeeded` and `failed` are meaningful even when `error` is set.
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub files: Vec<FileInfo>,
    pub succeeded: usize,
    pub failed: usize,
    pub error: Option<ServiceError>,
}

/// Trait for transferring local files to a remote artifact repository.
///
/// Implementations may parallelise internally, but must return a complete tally for the
/// given parameters before the future resolves. Each call is independent.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Upload every file selected by `params`.
    async fn upload_files(&self, params: UploadParams) -> TransferSummary;
}

/// Trait for recording build provenance for uploaded artifacts.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait BuildInfoStore: Send + Sync {
    /// Record the general details (name, number, start time) of a build.
    fn save_general_details(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<(), BuildInfoError>;

    /// Persist a partial build info for a build after `populate` has filled it in.
    fn save_partial_build_info(
        &self,
        build_name: &str,
        build_number: &str,
        populate: PopulatePartial,
    ) -> Result<(), BuildInfoError>;

    /// Format the semicolon-delimited property fragment that tags artifacts with a build.
    fn create_build_properties(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<String, BuildInfoError>;
}
