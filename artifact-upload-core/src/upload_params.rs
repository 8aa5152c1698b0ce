use crate::config::UploadConfiguration;
use crate::error::ConfigError;
use crate::spec::{CommonParams, File};

/// Fully resolved transfer request for one spec entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadParams {
    pub common: CommonParams,
    pub recursive: bool,
    pub regexp: bool,
    pub include_dirs: bool,
    pub flat: bool,
    pub explode_archive: bool,
    pub deb: String,
    pub symlink: bool,
    pub retries: u32,
}

/// Resolves the upload parameters for a single spec entry.
pub fn build_upload_params(
    file: &File,
    configuration: &UploadConfiguration,
) -> Result<UploadParams, ConfigError> {
    Ok(UploadParams {
        common: file.to_common_params(),
        recursive: file.is_recursive(true)?,
        regexp: file.is_regexp(false)?,
        include_dirs: file.is_include_dirs(false)?,
        flat: file.is_flat(true)?,
        explode_archive: file.is_explode(false)?,
        deb: configuration.deb.clone(),
        symlink: configuration.symlink,
        retries: configuration.retries,
    })
}
