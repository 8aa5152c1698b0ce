//! File-system build-info store.
//!
//! Each build gets a directory under the store root, `<name>/<number>`, with both parts
//! percent-encoded.
//! It holds `general.json` with the build's start time and a `partials/` directory with one
//! JSON document per upload run that contributed artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use artifact_upload_core::contract::{
    BuildInfoError, BuildInfoStore, PartialBuildInfo, PopulatePartial,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const GENERAL_DETAILS_FILE: &str = "general.json";
const PARTIALS_DIR: &str = "partials";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("build info I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed build info document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no general details saved for build {name}/{number}")]
    MissingGeneralDetails { name: String, number: String },
}

/// Name, number and start time of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildGeneralDetails {
    pub name: String,
    pub number: String,
    /// Start time, formatted as `2006-01-02T15:04:05.000-0700`.
    pub started: String,
    /// Start time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

pub struct FsBuildInfoStore {
    root: PathBuf,
}

impl FsBuildInfoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<name>/<number>`, each part encoded into a single path segment.
    fn build_dir(&self, build_name: &str, build_number: &str) -> PathBuf {
        self.root
            .join(path_segment(build_name))
            .join(path_segment(build_number))
    }

    /// Reads the general details saved for a build.
    pub fn general_details(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<BuildGeneralDetails, StoreError> {
        let path = self
            .build_dir(build_name, build_number)
            .join(GENERAL_DETAILS_FILE);
        if !path.exists() {
            return Err(StoreError::MissingGeneralDetails {
                name: build_name.to_string(),
                number: build_number.to_string(),
            });
        }
        read_json(&path)
    }

    /// Reads every partial saved for a build, oldest first.
    pub fn partials(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<Vec<PartialBuildInfo>, StoreError> {
        let dir = self.build_dir(build_name, build_number).join(PARTIALS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| io_error(&dir, source))?;
        let mut partials = Vec::new();
        for entry in entries {
            let path = entry.map_err(|source| io_error(&dir, source))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                partials.push(read_json::<PartialBuildInfo>(&path)?);
            }
        }
        partials.sort_by_key(|partial| partial.timestamp);
        Ok(partials)
    }
}

impl BuildInfoStore for FsBuildInfoStore {
    fn save_general_details(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<(), BuildInfoError> {
        let dir = self.build_dir(build_name, build_number);
        let path = dir.join(GENERAL_DETAILS_FILE);
        if path.exists() {
            debug!(path = %path.display(), "Build general details already saved");
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        let now = Utc::now();
        let details = BuildGeneralDetails {
            name: build_name.to_string(),
            number: build_number.to_string(),
            started: now.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string(),
            timestamp: now.timestamp_millis(),
        };
        write_json(&path, &details)?;
        info!(build_name, build_number, "Saved build general details");
        Ok(())
    }

    fn save_partial_build_info(
        &self,
        build_name: &str,
        build_number: &str,
        populate: PopulatePartial,
    ) -> Result<(), BuildInfoError> {
        let dir = self.build_dir(build_name, build_number).join(PARTIALS_DIR);
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        let mut partial = PartialBuildInfo {
            timestamp: Utc::now().timestamp_millis(),
            ..PartialBuildInfo::default()
        };
        populate(&mut partial);

        let path = dir.join(format!("{}.json", uuid::Uuid::new_v4()));
        write_json(&path, &partial)?;
        info!(
            build_name,
            build_number,
            artifacts = partial.artifacts.len(),
            path = %path.display(),
            "Saved partial build info"
        );
        Ok(())
    }

    fn create_build_properties(
        &self,
        build_name: &str,
        build_number: &str,
    ) -> Result<String, BuildInfoError> {
        let details = self.general_details(build_name, build_number)?;
        Ok(format!(
            "build.name={build_name};build.number={build_number};build.timestamp={}",
            details.timestamp
        ))
    }
}

/// Percent-encodes `value` so it cannot contain separators or name a parent directory.
fn path_segment(value: &str) -> String {
    let encoded = urlencoding::encode(value).into_owned();
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{rest}"),
        None => encoded,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| io_error(path, source))
}
