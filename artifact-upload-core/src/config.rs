//! Upload configuration and the repository service configuration built from it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Environment variable overriding the minimum checksum-deploy size, in kilobytes.
pub const MIN_CHECKSUM_DEPLOY_SIZE_ENV: &str = "JFROG_CLI_MIN_CHECKSUM_DEPLOY_SIZE_KB";

/// Minimum checksum-deploy size used when no override is given, in kilobytes.
pub const DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB: u64 = 10240;

/// Connection details for a repository server, as stored by the user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDetails {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl fmt::Debug for RepositoryDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryDetails")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// How requests to the repository are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic { user: String, password: String },
    AccessToken(String),
    ApiKey { user: Option<String>, key: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Anonymous => write!(f, "Anonymous"),
            Credentials::Basic { user, .. } => write!(f, "Basic({user}, ***)"),
            Credentials::AccessToken(_) => write!(f, "AccessToken(***)"),
            Credentials::ApiKey { user, .. } => write!(f, "ApiKey({user:?}, ***)"),
        }
    }
}

/// Validated, ready-to-use authentication for one repository server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Base URL of the repository server, always ending with `/`.
    pub url: String,
    pub credentials: Credentials,
}

impl RepositoryDetails {
    /// Validates the stored details and turns them into an [`AuthConfig`].
    ///
    /// An access token wins over an API key, which wins over a password.
    pub fn create_auth_config(&self) -> Result<AuthConfig, ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidAuth("repository URL is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidAuth(format!(
                "repository URL must start with http:// or https://, got '{url}'"
            )));
        }
        let url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };

        let user = self.user.clone().filter(|u| !u.is_empty());
        let credentials = if let Some(token) = self.access_token.clone().filter(|t| !t.is_empty()) {
            Credentials::AccessToken(token)
        } else if let Some(key) = self.api_key.clone().filter(|k| !k.is_empty()) {
            Credentials::ApiKey { user, key }
        } else if let Some(password) = self.password.clone().filter(|p| !p.is_empty()) {
            let user = user.ok_or_else(|| {
                ConfigError::InvalidAuth("a password was given without a user".into())
            })?;
            Credentials::Basic { user, password }
        } else {
            Credentials::Anonymous
        };

        Ok(AuthConfig { url, credentials })
    }
}

/// Per-run upload settings, built once from command-line and environment input.
#[derive(Debug, Clone)]
pub struct UploadConfiguration {
    /// Debian coordinates as `distribution/component/architecture`, empty when unused.
    pub deb: String,
    pub threads: usize,
    /// Raw value of the minimum checksum-deploy size override, in kilobytes.
    pub min_checksum_deploy_size_kb: Option<String>,
    pub build_name: String,
    pub build_number: String,
    pub dry_run: bool,
    pub symlink: bool,
    pub explode_archive: bool,
    pub repository: RepositoryDetails,
    pub retries: u32,
    /// Root directory for local state such as trusted certificates.
    pub home_dir: PathBuf,
}

impl UploadConfiguration {
    /// Whether this run should record build info (both name and number given).
    pub fn is_collect_build_info(&self) -> bool {
        !self.build_name.is_empty() && !self.build_number.is_empty()
    }

    pub fn trace_loaded(&self) {
        info!(
            url = %self.repository.url,
            threads = self.threads,
            retries = self.retries,
            dry_run = self.dry_run,
            build_name = %self.build_name,
            build_number = %self.build_number,
            "Loaded upload configuration"
        );
        debug!(?self, "Upload configuration (full debug)");
    }
}

/// Directory holding trusted certificates, created when missing.
pub fn security_dir(home_dir: &Path) -> std::io::Result<PathBuf> {
    let dir = home_dir.join("security");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Resolves the minimum checksum-deploy size in bytes from an optional kilobyte override.
///
/// Kilobytes are scaled by 1000.
pub fn resolve_min_checksum_deploy_size(raw_kb: Option<&str>) -> Result<u64, ConfigError> {
    let kb = match raw_kb {
        None | Some("") => DEFAULT_MIN_CHECKSUM_DEPLOY_SIZE_KB,
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|source| ConfigError::InvalidMinChecksumDeploySize {
                value: raw.to_string(),
                source,
            })?,
    };
    Ok(kb.saturating_mul(1000))
}

/// Everything a repository service client needs to be constructed.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub auth: AuthConfig,
    pub dry_run: bool,
    pub certificates_path: PathBuf,
    /// Files at least this large (bytes) are first deployed by checksum.
    pub min_checksum_deploy: u64,
    pub threads: usize,
    /// Span the client records its events under.
    pub span: tracing::Span,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    auth: Option<AuthConfig>,
    dry_run: bool,
    certificates_path: Option<PathBuf>,
    min_checksum_deploy: u64,
    threads: usize,
    span: Option<tracing::Span>,
}

impl ServiceConfigBuilder {
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn certificates_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificates_path = Some(path.into());
        self
    }

    pub fn min_checksum_deploy(mut self, bytes: u64) -> Self {
        self.min_checksum_deploy = bytes;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        let auth = self
            .auth
            .ok_or_else(|| ConfigError::InvalidServiceConfig("missing repository auth".into()))?;
        if self.threads == 0 {
            return Err(ConfigError::InvalidServiceConfig(
                "thread count must be at least 1".into(),
            ));
        }
        Ok(ServiceConfig {
            auth,
            dry_run: self.dry_run,
            certificates_path: self.certificates_path.unwrap_or_default(),
            min_checksum_deploy: self.min_checksum_deploy,
            threads: self.threads,
            span: self.span.unwrap_or_else(tracing::Span::none),
        })
    }
}

/// Assembles the service configuration for an upload run.
pub fn create_upload_service_config(
    details: &RepositoryDetails,
    configuration: &UploadConfiguration,
    certificates_path: &Path,
    min_checksum_deploy_size: u64,
) -> Result<ServiceConfig, ConfigError> {
    let auth = details.create_auth_config()?;
    ServiceConfig::builder()
        .auth(auth)
        .dry_run(configuration.dry_run)
        .certificates_path(certificates_path)
        .min_checksum_deploy(min_checksum_deploy_size)
        .threads(configuration.threads)
        .span(tracing::info_span!("repository_service", url = %details.url))
        .build()
}
