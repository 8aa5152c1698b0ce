#![doc = "artifact-upload-core: upload orchestration for artifact-upload."]

//! This crate contains the transport-independent logic of artifact-upload: file specs,
//! upload parameter resolution, build-property injection, service configuration and the
//! upload orchestrator itself.
//!
//! Concrete repository clients and build-info stores live outside this crate and plug in
//! through the traits in [`contract`].
//!
//! # Usage
//! Build an [`config::UploadConfiguration`] and a [`spec::SpecFiles`], then call
//! [`upload::upload`] with a service constructor and a [`contract::BuildInfoStore`].

pub mod build_props;
pub mod config;
pub mod contract;
pub mod error;
pub mod spec;
pub mod upload;
pub mod upload_params;

pub use error::{ConfigError, UploadError};
pub use upload::{upload, UploadOutcome};
