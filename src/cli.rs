use anyhow::{Context, Result};
use artifact_upload_core::config::UploadConfiguration;
use artifact_upload_core::spec::{File, SpecFiles};
use artifact_upload_core::{upload, UploadOutcome};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::build_info::FsBuildInfoStore;
use crate::load_config::{home_dir, load_repository_details, load_spec, min_checksum_deploy_size_kb};
use crate::upload::HttpRepositoryService;

/// CLI for artifact-upload: upload local files to an artifact repository.
#[derive(Parser)]
#[clap(
    name = "artifact-upload",
    version,
    about = "Upload files selected by patterns or file specs to an artifact repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files matching PATTERN to TARGET, or every entry of a file spec
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file pattern, e.g. `build/libs/*.jar`
    #[clap(required_unless_present = "spec")]
    pub pattern: Option<String>,

    /// Repository target path, e.g. `libs-release/app/`
    #[clap(required_unless_present = "spec")]
    pub target: Option<String>,

    /// Path to a JSON file spec; replaces PATTERN and TARGET
    #[clap(long, conflicts_with_all = ["pattern", "target"])]
    pub spec: Option<PathBuf>,

    /// Path to the YAML server config file
    #[clap(long)]
    pub server_config: Option<PathBuf>,

    /// Repository URL, overriding the server config and environment
    #[clap(long)]
    pub url: Option<String>,

    /// Repository user, overriding the server config and environment
    #[clap(long)]
    pub user: Option<String>,

    #[clap(long, requires = "build_number")]
    pub build_name: Option<String>,

    #[clap(long, requires = "build_name")]
    pub build_number: Option<String>,

    /// Resolve and checksum files without uploading anything
    #[clap(long)]
    pub dry_run: bool,

    /// Number of parallel uploads
    #[clap(long, default_value_t = 3)]
    pub threads: usize,

    /// Retries per request on transport and server errors
    #[clap(long, default_value_t = 3)]
    pub retries: u32,

    /// Debian coordinates as `distribution/component/architecture`
    #[clap(long, default_value = "")]
    pub deb: String,

    /// Upload symlinks as references instead of following them
    #[clap(long)]
    pub symlinks: bool,

    /// Extract uploaded archives in the repository
    #[clap(long)]
    pub explode: bool,

    /// Properties to attach, as `key=value;key=value`
    #[clap(long)]
    pub props: Option<String>,

    #[clap(long)]
    pub recursive: Option<String>,

    #[clap(long)]
    pub flat: Option<String>,

    #[clap(long)]
    pub regexp: Option<String>,

    #[clap(long)]
    pub include_dirs: Option<String>,
}

/// Totals printed once a run finishes.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub status: &'static str,
    pub totals: Totals,
}

#[derive(Debug, Serialize)]
pub struct Totals {
    pub success: usize,
    pub failure: usize,
}

impl From<&UploadOutcome> for Summary {
    fn from(outcome: &UploadOutcome) -> Self {
        Self {
            status: if outcome.is_success() { "success" } else { "failure" },
            totals: Totals {
                success: outcome.success_count,
                failure: outcome.fail_count,
            },
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload(args) => run_upload(args).await,
    }
}

async fn run_upload(args: UploadArgs) -> Result<()> {
    let spec = spec_from_args(&args)?;
    let configuration = configuration_from_args(&args)?;
    configuration.trace_loaded();

    let store = FsBuildInfoStore::new(configuration.home_dir.join("builds"));
    let outcome = upload(spec, &configuration, HttpRepositoryService::new, &store).await;

    let summary = Summary::from(&outcome);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match outcome.error {
        Some(e) => Err(anyhow::Error::new(e).context("Upload failed")),
        None if outcome.fail_count > 0 => Err(anyhow::anyhow!(
            "{} file(s) failed to upload",
            outcome.fail_count
        )),
        None => Ok(()),
    }
}

/// Builds the file spec from `--spec`, or from PATTERN/TARGET and the per-entry flags.
pub fn spec_from_args(args: &UploadArgs) -> Result<SpecFiles> {
    if let Some(path) = &args.spec {
        return load_spec(path);
    }
    let (Some(pattern), Some(target)) = (&args.pattern, &args.target) else {
        anyhow::bail!("PATTERN and TARGET are required without --spec");
    };
    let mut file = File::new(pattern.clone(), target.clone());
    file.props = args.props.clone().unwrap_or_default();
    file.recursive = args.recursive.clone();
    file.flat = args.flat.clone();
    file.regexp = args.regexp.clone();
    file.include_dirs = args.include_dirs.clone();
    if args.explode {
        file.explode = Some("true".to_string());
    }
    Ok(SpecFiles::new(vec![file]))
}

/// Builds the run configuration. The environment is read here and nowhere else.
pub fn configuration_from_args(args: &UploadArgs) -> Result<UploadConfiguration> {
    let repository = load_repository_details(
        args.server_config.as_deref(),
        args.url.as_deref(),
        args.user.as_deref(),
    )
    .context("Failed to load repository details")?;

    Ok(UploadConfiguration {
        deb: args.deb.clone(),
        threads: args.threads,
        min_checksum_deploy_size_kb: min_checksum_deploy_size_kb(),
        build_name: args.build_name.clone().unwrap_or_default(),
        build_number: args.build_number.clone().unwrap_or_default(),
        dry_run: args.dry_run,
        symlink: args.symlinks,
        explode_archive: args.explode,
        repository,
        retries: args.retries,
        home_dir: home_dir()?,
    })
}
