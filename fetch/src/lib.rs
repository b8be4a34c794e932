//! Artifact storage access for pyprov.
//!
//! - **`retry`**: exponential backoff retry policy for HTTP requests
//! - **`client`**: artifact URL layout, HEAD existence check, streamed download
//! - **`archive`**: tarball extraction (zstd or gzip)

pub mod archive;
pub mod client;
pub mod retry;

pub use archive::{ArchiveFormat, ExtractError};
pub use client::{ArtifactClient, Availability, CONNECT_TIMEOUT, artifact_url};
pub use retry::RetryConfig;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("download of {url} failed with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("download of {url} failed after {attempts} attempt(s): {source}")]
    Connection {
        url: String,
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("download of {url} was interrupted: {source}")]
    Body { url: String, source: reqwest::Error },
    #[error("failed to spool download to disk: {0}")]
    Spool(#[source] std::io::Error),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}
