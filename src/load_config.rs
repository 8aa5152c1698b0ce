/// `load_config` module: loads server details, file specs and environment overrides into the core's
/// strongly-typed configuration.
///
/// This module is the only place where user-supplied YAML/JSON and environment variables are read.
///
/// # Responsibilities
/// - Parse the server config YAML (URL, user) and inject secrets from the environment
/// - Parse JSON file specs into [`SpecFiles`]
/// - Read process-wide overrides (home directory, minimum checksum-deploy size) once at startup,
///   so the core never looks at the environment itself
///
/// # Errors
/// All errors use `anyhow::Error` with context, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use artifact_upload_core::config::{RepositoryDetails, MIN_CHECKSUM_DEPLOY_SIZE_ENV};
use artifact_upload_core::spec::SpecFiles;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const URL_ENV: &str = "ARTIFACTORY_URL";
pub const USER_ENV: &str = "ARTIFACTORY_USER";
pub const PASSWORD_ENV: &str = "ARTIFACTORY_PASSWORD";
pub const ACCESS_TOKEN_ENV: &str = "ARTIFACTORY_ACCESS_TOKEN";
pub const API_KEY_ENV: &str = "ARTIFACTORY_API_KEY";
pub const HOME_DIR_ENV: &str = "JFROG_CLI_HOME_DIR";

/// Non-secret server details, as stored in the server config file.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// Loads the server config YAML file.
pub fn load_server_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading server configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read server config file");
            return Err(anyhow::anyhow!(
                "Failed to read server config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str(&content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed server config YAML successfully");
            Ok(config)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse server config YAML");
            Err(anyhow::anyhow!("Failed to parse server config YAML: {e}"))
        }
    }
}

/// Combines the optional server config file, environment variables and command-line overrides
/// into repository details. Command-line values win over the environment, which wins over the file.
pub fn load_repository_details(
    server_config: Option<&Path>,
    url: Option<&str>,
    user: Option<&str>,
) -> Result<RepositoryDetails> {
    let file = match server_config {
        Some(path) => load_server_config(path)?,
        None => ServerConfig::default(),
    };

    let url = url
        .map(str::to_string)
        .or_else(|| env_var(URL_ENV))
        .unwrap_or(file.url);
    let user = user
        .map(str::to_string)
        .or_else(|| env_var(USER_ENV))
        .or(file.user);

    let details = RepositoryDetails {
        url,
        user,
        password: env_var(PASSWORD_ENV),
        access_token: env_var(ACCESS_TOKEN_ENV),
        api_key: env_var(API_KEY_ENV),
    };
    info!(
        url = %details.url,
        user = details.user.as_deref().unwrap_or(""),
        password_set = details.password.is_some(),
        access_token_set = details.access_token.is_some(),
        api_key_set = details.api_key.is_some(),
        "Repository details loaded"
    );
    Ok(details)
}

/// Loads a JSON file spec.
pub fn load_spec<P: AsRef<Path>>(path: P) -> Result<SpecFiles> {
    let path_ref = path.as_ref();
    info!(spec_path = ?path_ref, "Loading file spec");
    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read file spec {:?}", path_ref))?;
    let spec: SpecFiles = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse file spec JSON {:?}", path_ref))?;
    info!(entries = spec.files.len(), "Parsed file spec");
    Ok(spec)
}

/// Root directory for local state: `JFROG_CLI_HOME_DIR`, else `~/.jfrog`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(dir) = env_var(HOME_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let base = directories::BaseDirs::new().context("Could not determine the home directory")?;
    Ok(base.home_dir().join(".jfrog"))
}

/// Raw minimum checksum-deploy size override, in kilobytes.
pub fn min_checksum_deploy_size_kb() -> Option<String> {
    env_var(MIN_CHECKSUM_DEPLOY_SIZE_ENV)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
