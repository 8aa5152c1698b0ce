//! Top-level upload pipeline: spec entries → upload parameters → repository service → build info.
//!
//! This module provides [`upload`], which drives one upload run:
//!   - Prepares the certificate directory, resolves the checksum-deploy threshold and constructs
//!     the repository service from a [`ServiceConfig`]
//!   - When build info is collected, records the build's general details and tags every spec
//!     entry with build properties
//!   - Uploads spec entries one after another, in spec order
//!   - Aggregates counts across entries and, on full success, records the uploaded artifacts as a
//!     partial build info
//!
//! # Error Handling
//! Initialisation failures (certificates, configuration, service construction, general build
//! details) abort the run with zero counts. Failures of a single entry never stop the run: they
//! are logged and the run ends with [`UploadError::FinishedWithErrors`]. Failed files without
//! any error are a soft failure: `fail_count > 0` and no error. Callers must check both.
//!
//! # Navigation
//! - Main entrypoint: [`upload`]
//! - Outcome: [`UploadOutcome`]

use tracing::{error, info, warn};

use crate::build_props::add_build_props;
use crate::config::{
    create_upload_service_config, resolve_min_checksum_deploy_size, security_dir, ServiceConfig,
    UploadConfiguration,
};
use crate::contract::{
    BuildArtifact, BuildInfoError, BuildInfoStore, FileInfo, PartialBuildInfo, RepositoryService,
    ServiceError, TransferSummary,
};
use crate::error::UploadError;
use crate::spec::{File, SpecFiles};
use crate::upload_params::build_upload_params;

/// Result of an upload run.
///
/// Counts are always meaningful, including when `error` is set.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub success_count: usize,
    pub fail_count: usize,
    pub error: Option<UploadError>,
}

impl UploadOutcome {
    fn aborted(error: UploadError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// No error and no failed files.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.fail_count == 0
    }

    /// Some files failed, but every entry ran without error.
    pub fn is_soft_failure(&self) -> bool {
        self.error.is_none() && self.fail_count > 0
    }
}

/// Accumulates per-entry results over a run.
#[derive(Debug, Default)]
struct UploadTally {
    files: Vec<FileInfo>,
    success_count: usize,
    fail_count: usize,
    errors_occurred: bool,
}

impl UploadTally {
    fn record_entry_error(&mut self) {
        self.errors_occurred = true;
    }

    fn absorb(&mut self, summary: TransferSummary) -> Option<ServiceError> {
        self.files.extend(summary.files);
        self.success_count += summary.succeeded;
        self.fail_count += summary.failed;
        if summary.error.is_some() {
            self.errors_occurred = true;
        }
        summary.error
    }

    fn into_outcome(self, error: Option<UploadError>) -> UploadOutcome {
        UploadOutcome {
            success_count: self.success_count,
            fail_count: self.fail_count,
            error,
        }
    }
}

/// Uploads the files selected by `spec` and, when a build is given, records them as build info.
///
/// `connect` constructs the repository service from the assembled [`ServiceConfig`].
pub async fn upload<S, C, B>(
    spec: SpecFiles,
    configuration: &UploadConfiguration,
    connect: C,
    build_info: &B,
) -> UploadOutcome
where
    S: RepositoryService,
    C: FnOnce(ServiceConfig) -> Result<S, ServiceError>,
    B: BuildInfoStore + ?Sized,
{
    info!(entries = spec.files.len(), "[UPLOAD] Starting upload run");

    let service = match connect_service(configuration, connect) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "[UPLOAD][ERROR] Failed to initialise repository service");
            return UploadOutcome::aborted(e);
        }
    };

    let collect_build_info = configuration.is_collect_build_info() && !configuration.dry_run;
    let entries = if collect_build_info {
        if let Err(e) =
            build_info.save_general_details(&configuration.build_name, &configuration.build_number)
        {
            error!(error = %e, "[UPLOAD][ERROR] Failed to save build general details");
            return UploadOutcome::aborted(UploadError::BuildGeneralDetails(e));
        }
        tag_with_build_props(spec, configuration, build_info)
    } else {
        spec.files.into_iter().map(Ok).collect()
    };

    let mut tally = UploadTally::default();
    for (index, entry) in entries.into_iter().enumerate() {
        let file = match entry {
            Ok(file) => file,
            Err(e) => {
                error!(entry = index, error = %e, "[UPLOAD][ERROR] Failed to add build properties, skipping entry");
                tally.record_entry_error();
                continue;
            }
        };

        let params = match build_upload_params(&file, configuration) {
            Ok(params) => params,
            Err(e) => {
                error!(entry = index, pattern = %file.pattern, error = %e, "[UPLOAD][ERROR] Invalid upload parameters, skipping entry");
                tally.record_entry_error();
                continue;
            }
        };

        info!(entry = index, pattern = %file.pattern, destination = %file.target, "[UPLOAD] Uploading entry");
        let summary = service.upload_files(params).await;
        let (succeeded, failed) = (summary.succeeded, summary.failed);
        match tally.absorb(summary) {
            Some(e) => {
                error!(entry = index, succeeded, failed, error = %e, "[UPLOAD][ERROR] Entry upload failed");
            }
            None => {
                info!(entry = index, succeeded, failed, "[UPLOAD] Entry uploaded");
            }
        }
    }

    if tally.errors_occurred {
        return tally.into_outcome(Some(UploadError::FinishedWithErrors));
    }
    if tally.fail_count > 0 {
        warn!(
            succeeded = tally.success_count,
            failed = tally.fail_count,
            "[UPLOAD] Some files failed to upload"
        );
        return tally.into_outcome(None);
    }

    let mut commit_error = None;
    if collect_build_info {
        let artifacts = to_build_artifacts(&tally.files);
        info!(
            artifacts = artifacts.len(),
            build_name = %configuration.build_name,
            build_number = %configuration.build_number,
            "[UPLOAD] Recording uploaded artifacts in build info"
        );
        let result = build_info.save_partial_build_info(
            &configuration.build_name,
            &configuration.build_number,
            Box::new(move |partial: &mut PartialBuildInfo| partial.artifacts = artifacts),
        );
        if let Err(e) = result {
            error!(error = %e, "[UPLOAD][ERROR] Failed to save partial build info");
            commit_error = Some(UploadError::BuildInfoCommit(e));
        }
    }

    info!(
        succeeded = tally.success_count,
        "[UPLOAD] Upload run complete"
    );
    tally.into_outcome(commit_error)
}

fn connect_service<S, C>(configuration: &UploadConfiguration, connect: C) -> Result<S, UploadError>
where
    C: FnOnce(ServiceConfig) -> Result<S, ServiceError>,
{
    let certificates_path =
        security_dir(&configuration.home_dir).map_err(|source| UploadError::SecurityDir {
            path: configuration.home_dir.join("security"),
            source,
        })?;
    let min_checksum_deploy_size =
        resolve_min_checksum_deploy_size(configuration.min_checksum_deploy_size_kb.as_deref())?;
    let service_config = create_upload_service_config(
        &configuration.repository,
        configuration,
        &certificates_path,
        min_checksum_deploy_size,
    )?;
    connect(service_config).map_err(UploadError::ServiceInit)
}

/// Appends build properties to every entry. Entries whose properties could not be built are
/// returned as errors so the upload loop can skip them.
fn tag_with_build_props<B>(
    spec: SpecFiles,
    configuration: &UploadConfiguration,
    build_info: &B,
) -> Vec<Result<File, BuildInfoError>>
where
    B: BuildInfoStore + ?Sized,
{
    spec.files
        .into_iter()
        .map(|mut file| {
            file.props = add_build_props(
                &file.props,
                &configuration.build_name,
                &configuration.build_number,
                build_info,
            )?;
            Ok(file)
        })
        .collect()
}

fn to_build_artifacts(files: &[FileInfo]) -> Vec<BuildArtifact> {
    files.iter().map(FileInfo::to_build_artifact).collect()
}
