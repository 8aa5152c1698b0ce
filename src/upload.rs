#![doc = "HTTP repository service: implements the core `RepositoryService` contract against an artifact repository's REST deploy endpoint."]
//
//! # Repository client (CLI <-> Core)
//!
//! This module provides [`HttpRepositoryService`], the client the CLI hands to
//! [`artifact_upload_core::upload`]. For every set of upload parameters it:
//!
//! - resolves the local candidates with [`crate::collect`],
//! - uploads them concurrently, bounded by the configured thread count,
//! - tries a checksum deploy first for files at or above the configured size,
//! - retries transport failures and server errors,
//! - reports per-file failures as failed counts rather than as an error.
//!
//! File contents are hashed and sent as streams, never held in memory whole.
//! Dry runs resolve and checksum every candidate but send nothing.

use std::path::Path;

use artifact_upload_core::config::{Credentials, ServiceConfig};
use artifact_upload_core::contract::{FileInfo, RepositoryService, ServiceError, TransferSummary};
use artifact_upload_core::upload_params::UploadParams;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::Instrument;

use crate::collect::{collect_candidates, CandidateKind, CollectError, UploadCandidate};

const CHECKSUM_DEPLOY_HEADER: &str = "X-Checksum-Deploy";
const CHECKSUM_SHA256_HEADER: &str = "X-Checksum-Sha256";
const EXPLODE_ARCHIVE_HEADER: &str = "X-Explode-Archive";
const API_KEY_HEADER: &str = "X-JFrog-Art-Api";

/// Errors from uploading a single candidate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("repository returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot upload {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error(transparent)]
    Collect(#[from] CollectError),
}

pub struct HttpRepositoryService {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl HttpRepositoryService {
    /// Builds the HTTP client, trusting every PEM certificate found in the certificates path.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("artifact-upload/", env!("CARGO_PKG_VERSION")));
        for certificate in load_certificates(&config.certificates_path)? {
            builder = builder.add_root_certificate(certificate);
        }
        let http = builder.build()?;
        tracing::info!(
            url = %config.auth.url,
            threads = config.threads,
            dry_run = config.dry_run,
            min_checksum_deploy = config.min_checksum_deploy,
            "Initialized repository client"
        );
        Ok(Self { http, config })
    }

    async fn upload_all(&self, params: UploadParams) -> TransferSummary {
        let candidates = match collect_candidates(&params) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(pattern = %params.common.pattern, error = %e, "Failed to resolve upload candidates");
                return TransferSummary {
                    error: Some(Box::new(TransferError::from(e))),
                    ..TransferSummary::default()
                };
            }
        };
        tracing::info!(
            pattern = %params.common.pattern,
            candidates = candidates.len(),
            "Resolved upload candidates"
        );

        let props = matrix_params(&params.common.props, &params.deb);
        let props = props.as_str();
        let params = &params;
        let results: Vec<(String, Result<FileInfo, TransferError>)> = stream::iter(candidates)
            .map(move |candidate| async move {
                let target = candidate.target_path.clone();
                (target, self.upload_candidate(candidate, props, params).await)
            })
            .buffer_unordered(self.config.threads.max(1))
            .collect()
            .await;

        let mut summary = TransferSummary::default();
        for (target, result) in results {
            match result {
                Ok(info) => {
                    summary.succeeded += 1;
                    summary.files.push(info);
                }
                Err(e) => {
                    tracing::error!(repo_path = %target, error = %e, "Failed to upload file");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn upload_candidate(
        &self,
        candidate: UploadCandidate,
        props: &str,
        params: &UploadParams,
    ) -> Result<FileInfo, TransferError> {
        let (sha256, size, props) = match &candidate.kind {
            CandidateKind::File => {
                let (sha256, size) = sha256_file(&candidate.local_path).await?;
                (sha256, size, props.to_string())
            }
            CandidateKind::EmptyDir => (sha256_hex(&[]), 0, props.to_string()),
            CandidateKind::Symlink { dest } => {
                let dest = dest.to_string_lossy().replace('\\', "/");
                let props = format!("{props};symlink.dest={}", urlencoding::encode(&dest));
                (sha256_hex(&[]), 0, props)
            }
            CandidateKind::Unreadable { reason } => {
                return Err(TransferError::Unreadable {
                    path: candidate.local_path.display().to_string(),
                    reason: reason.clone(),
                });
            }
        };
        let info = FileInfo {
            local_path: candidate.local_path.clone(),
            repository_path: candidate.target_path.clone(),
            sha256: sha256.clone(),
            size,
        };

        if self.config.dry_run {
            tracing::info!(
                local = %candidate.local_path.display(),
                repo_path = %candidate.target_path,
                "[Dry run] Would upload"
            );
            return Ok(info);
        }

        let url = format!(
            "{}{}{}",
            self.config.auth.url,
            encode_path(&candidate.target_path),
            props
        );

        let is_file = candidate.kind == CandidateKind::File;
        if is_file && size >= self.config.min_checksum_deploy {
            let response = self
                .send_with_retries(params.retries, || {
                    Ok(self
                        .http
                        .put(&url)
                        .header(CHECKSUM_DEPLOY_HEADER, "true")
                        .header(CHECKSUM_SHA256_HEADER, &sha256))
                })
                .await?;
            if response.status().is_success() {
                tracing::info!(repo_path = %candidate.target_path, "Deployed by checksum");
                return Ok(info);
            }
            tracing::debug!(
                repo_path = %candidate.target_path,
                status = response.status().as_u16(),
                "Checksum unknown to repository, uploading content"
            );
        }

        let explode = is_file && params.explode_archive;
        let response = self
            .send_with_retries(params.retries, || {
                let mut request = self
                    .http
                    .put(&url)
                    .header(CHECKSUM_SHA256_HEADER, &sha256);
                request = if is_file {
                    request
                        .header(CONTENT_LENGTH, size)
                        .body(file_body(&candidate.local_path)?)
                } else {
                    request.body(Vec::new())
                };
                if explode {
                    request = request.header(EXPLODE_ARCHIVE_HEADER, "true");
                }
                Ok(request)
            })
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Status {
                status: status.as_u16(),
                path: candidate.target_path,
                body,
            });
        }
        tracing::info!(repo_path = %candidate.target_path, size, "Uploaded file");
        Ok(info)
    }

    /// Sends a request, retrying transport failures and server errors up to `retries` times.
    async fn send_with_retries<F>(&self, retries: u32, build: F) -> Result<Response, TransferError>
    where
        F: Fn() -> Result<RequestBuilder, TransferError>,
    {
        let mut attempt = 0;
        loop {
            let result = self.authorize(build()?).send().await;
            match result {
                Ok(response) if is_retryable(response.status()) && attempt < retries => {
                    tracing::warn!(status = response.status().as_u16(), attempt, "Server error, retrying");
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < retries => {
                    tracing::warn!(error = %e, attempt, "Request failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth.credentials {
            Credentials::Anonymous => request,
            Credentials::Basic { user, password } => request.basic_auth(user, Some(password)),
            Credentials::AccessToken(token) => request.bearer_auth(token),
            Credentials::ApiKey { key, .. } => request.header(API_KEY_HEADER, key),
        }
    }
}

#[async_trait]
impl RepositoryService for HttpRepositoryService {
    async fn upload_files(&self, params: UploadParams) -> TransferSummary {
        let span = self.config.span.clone();
        self.upload_all(params).instrument(span).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn load_certificates(dir: &Path) -> Result<Vec<reqwest::Certificate>, ServiceError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut certificates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pem = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("pem" | "crt")
        );
        if !is_pem {
            continue;
        }
        let pem = std::fs::read(&path)?;
        certificates.push(reqwest::Certificate::from_pem(&pem)?);
        tracing::debug!(path = %path.display(), "Trusting certificate");
    }
    Ok(certificates)
}

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Streams a file through SHA-256, returning the hex digest and the byte count.
async fn sha256_file(path: &Path) -> Result<(String, u64), TransferError> {
    let io_error = |source| TransferError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(io_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

/// Opens `path` as a streamed request body. Each call reopens the file.
fn file_body(path: &Path) -> Result<Body, TransferError> {
    let file = std::fs::File::open(path).map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let stream = ReaderStream::new(tokio::fs::File::from_std(file));
    Ok(Body::wrap_stream(stream))
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Percent-encodes each segment of a repository path, keeping the `/` separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Renders properties and Debian coordinates as `;key=value` matrix parameters.
pub fn matrix_params(props: &str, deb: &str) -> String {
    let mut rendered = String::new();
    for prop in props.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = prop.split_once('=').unwrap_or((prop, ""));
        rendered.push(';');
        rendered.push_str(&urlencoding::encode(key));
        rendered.push('=');
        rendered.push_str(&urlencoding::encode(value));
    }
    let deb_keys = ["deb.distribution", "deb.component", "deb.architecture"];
    for (key, value) in deb_keys.iter().zip(deb.split('/')) {
        if value.is_empty() {
            continue;
        }
        rendered.push(';');
        rendered.push_str(key);
        rendered.push('=');
        rendered.push_str(&urlencoding::encode(value));
    }
    rendered
}
