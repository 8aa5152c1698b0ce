use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use artifact_upload::upload::HttpRepositoryService;
use artifact_upload_core::config::{AuthConfig, Credentials, ServiceConfig};
use artifact_upload_core::contract::RepositoryService;
use artifact_upload_core::spec::CommonParams;
use artifact_upload_core::upload_params::UploadParams;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A request as seen by the fake repository. The head is lower-cased.
#[derive(Debug, Clone)]
struct Recorded {
    head: String,
    body: Vec<u8>,
}

/// How the fake repository answers.
#[derive(Debug, Clone, Copy)]
struct Behaviour {
    /// Checksum deploys get 201 when set, otherwise 404.
    knows_checksums: bool,
    /// The first `failures` requests get `failure_status` instead of a normal answer.
    failures: usize,
    failure_status: &'static str,
}

impl Behaviour {
    fn healthy(knows_checksums: bool) -> Self {
        Self {
            knows_checksums,
            failures: 0,
            failure_status: "500 Internal Server Error",
        }
    }

    fn failing(failures: usize, failure_status: &'static str) -> Self {
        Self {
            knows_checksums: false,
            failures,
            failure_status,
        }
    }
}

/// Minimal HTTP/1.1 repository that answers every PUT with 201.
async fn spawn_repository(knows_checksums: bool) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    spawn_repository_with(Behaviour::healthy(knows_checksums)).await
}

async fn spawn_repository_with(behaviour: Behaviour) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let answered = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let requests = recorded.clone();
            let answered = answered.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < header_end + length {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = buf[header_end..buf.len().min(header_end + length)].to_vec();

                let checksum_deploy = head.contains("x-checksum-deploy: true");
                let status = if answered.fetch_add(1, Ordering::SeqCst) < behaviour.failures {
                    behaviour.failure_status
                } else if checksum_deploy && !behaviour.knows_checksums {
                    "404 Not Found"
                } else {
                    "201 Created"
                };
                requests.lock().unwrap().push(Recorded { head, body });
                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (url, requests)
}

fn service(url: &str, dry_run: bool, min_checksum_deploy: u64, credentials: Credentials) -> HttpRepositoryService {
    let config = ServiceConfig::builder()
        .auth(AuthConfig {
            url: url.to_string(),
            credentials,
        })
        .dry_run(dry_run)
        .certificates_path("/nonexistent/security")
        .min_checksum_deploy(min_checksum_deploy)
        .threads(2)
        .build()
        .expect("service config");
    HttpRepositoryService::new(config).expect("client")
}

fn local_files() -> TempDir {
    let dir = tempfile::Builder::new().prefix("upload").tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("build")).unwrap();
    std::fs::write(dir.path().join("build/app.jar"), b"app-content").unwrap();
    std::fs::write(dir.path().join("build/lib.jar"), b"lib-content").unwrap();
    dir
}

fn params(root: &Path, pattern: &str, props: &str) -> UploadParams {
    UploadParams {
        common: CommonParams {
            pattern: format!("{}/{}", root.display(), pattern),
            target: "libs/".to_string(),
            props: props.to_string(),
            exclusions: Vec::new(),
        },
        recursive: true,
        regexp: false,
        include_dirs: false,
        flat: true,
        explode_archive: false,
        deb: String::new(),
        symlink: false,
        retries: 0,
    }
}

#[tokio::test]
async fn dry_run_checksums_every_candidate_without_requests() {
    let files = local_files();
    // Nothing listens on port 1; a request would fail the transfer.
    let service = service("http://127.0.0.1:1/", true, 0, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/*.jar", "")).await;

    assert!(summary.error.is_none());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    let mut paths: Vec<&str> = summary.files.iter().map(|f| f.repository_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["libs/app.jar", "libs/lib.jar"]);
    assert!(summary.files.iter().all(|f| f.sha256.len() == 64));
}

#[tokio::test]
async fn uploads_content_with_matrix_params_and_checksum_header() {
    let files = local_files();
    let (url, requests) = spawn_repository(false).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);

    let summary = service
        .upload_files(params(files.path(), "build/app.jar", "team=core;build.name=my app"))
        .await;

    assert!(summary.error.is_none());
    assert_eq!(summary.succeeded, 1);
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .head
        .starts_with("put /libs/app.jar;team=core;build.name=my%20app http/1.1"));
    assert!(requests[0].head.contains("x-checksum-sha256: "));
    assert!(!requests[0].head.contains("x-checksum-deploy"));
    assert_eq!(requests[0].body, b"app-content");
}

#[tokio::test]
async fn checksum_deploy_skips_content_when_known() {
    let files = local_files();
    let (url, requests) = spawn_repository(true).await;
    let service = service(&url, false, 0, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/app.jar", "")).await;

    assert_eq!(summary.succeeded, 1);
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].head.contains("x-checksum-deploy: true"));
    assert!(requests[0].body.is_empty());
}

#[tokio::test]
async fn checksum_miss_falls_back_to_full_upload() {
    let files = local_files();
    let (url, requests) = spawn_repository(false).await;
    let service = service(&url, false, 0, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/app.jar", "")).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].head.contains("x-checksum-deploy: true"));
    assert!(!requests[1].head.contains("x-checksum-deploy"));
    assert_eq!(requests[1].body, b"app-content");
}

#[tokio::test]
async fn explode_and_credentials_are_sent() {
    let files = local_files();
    let (url, requests) = spawn_repository(false).await;
    let service = service(
        &url,
        false,
        u64::MAX,
        Credentials::Basic {
            user: "ci".to_string(),
            password: "secret".to_string(),
        },
    );
    let mut params = params(files.path(), "build/app.jar", "");
    params.explode_archive = true;

    let summary = service.upload_files(params).await;

    assert_eq!(summary.succeeded, 1);
    let requests = requests.lock().unwrap().clone();
    assert!(requests[0].head.contains("x-explode-archive: true"));
    assert!(requests[0].head.contains("authorization: basic "));
}

#[tokio::test]
async fn unreachable_repository_counts_failures_without_error() {
    let files = local_files();
    let service = service("http://127.0.0.1:1/", false, u64::MAX, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/*.jar", "")).await;

    assert!(summary.error.is_none());
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);
    assert!(summary.files.is_empty());
}

#[tokio::test]
async fn unresolvable_pattern_is_a_service_error() {
    let files = local_files();
    let service = service("http://127.0.0.1:1/", true, 0, Credentials::Anonymous);
    let mut params = params(files.path(), "build/[broken", "");
    params.regexp = true;

    let summary = service.upload_files(params).await;

    assert!(summary.error.is_some());
    assert_eq!(summary.succeeded + summary.failed, 0);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let files = local_files();
    let (url, requests) = spawn_repository_with(Behaviour::failing(2, "500 Internal Server Error")).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);
    let mut params = params(files.path(), "build/app.jar", "");
    params.retries = 3;

    let summary = service.upload_files(params).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.body == b"app-content"));
}

#[tokio::test]
async fn persistent_server_errors_fail_the_file_after_all_retries() {
    let files = local_files();
    let (url, requests) =
        spawn_repository_with(Behaviour::failing(usize::MAX, "500 Internal Server Error")).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);
    let mut params = params(files.path(), "build/app.jar", "");
    params.retries = 2;

    let summary = service.upload_files(params).await;

    assert!(summary.error.is_none());
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let files = local_files();
    let (url, requests) = spawn_repository_with(Behaviour::failing(1, "429 Too Many Requests")).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);
    let mut params = params(files.path(), "build/app.jar", "");
    params.retries = 1;

    let summary = service.upload_files(params).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let files = local_files();
    let (url, requests) = spawn_repository_with(Behaviour::failing(usize::MAX, "404 Not Found")).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);
    let mut params = params(files.path(), "build/app.jar", "");
    params.retries = 3;

    let summary = service.upload_files(params).await;

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn large_files_are_streamed_intact() {
    let files = local_files();
    let content: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(files.path().join("build/big.bin"), &content).unwrap();
    let (url, requests) = spawn_repository(false).await;
    let service = service(&url, false, u64::MAX, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/big.bin", "")).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.files[0].size, content.len() as u64);
    let requests = requests.lock().unwrap().clone();
    assert!(requests[0]
        .head
        .contains(&format!("content-length: {}", content.len())));
    assert!(requests[0].body == content);
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_selected_path_fails_only_that_file() {
    let files = local_files();
    std::os::unix::fs::symlink("../gone.jar", files.path().join("build/stale.jar")).unwrap();
    let service = service("http://127.0.0.1:1/", true, 0, Credentials::Anonymous);

    let summary = service.upload_files(params(files.path(), "build/*.jar", "")).await;

    assert!(summary.error.is_none());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
}
