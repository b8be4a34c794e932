//! Artifact storage client: existence checks and streamed downloads.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use url::Url;

use pyprov_types::{Arch, PythonVersion, Stack};

use crate::FetchError;
use crate::archive::{self, ArchiveFormat};
use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deterministic artifact URL:
/// `{base}/python-{version}-{distro}-{distro_version}-{arch}.tar.zst`.
pub fn artifact_url(
    base: &Url,
    version: PythonVersion,
    stack: &Stack,
    arch: Arch,
) -> Result<Url, url::ParseError> {
    let raw = format!(
        "{base}/{tag}-{distro}-{distro_version}-{arch}.tar.zst",
        base = base.as_str().trim_end_matches('/'),
        tag = version.runtime_tag(),
        distro = stack.distro(),
        distro_version = stack.distro_version(),
    );
    Url::parse(&raw)
}

/// Result of asking artifact storage whether a runtime build exists.
#[derive(Debug)]
pub enum Availability {
    Available,
    /// Storage answered with a non-success status (404, or 403 for unlisted keys).
    Missing { status: StatusCode },
    /// Storage could not be reached, even after retries.
    Unreachable { attempts: u32, detail: String },
}

#[derive(Debug, Clone)]
pub struct ArtifactClient {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl ArtifactClient {
    pub fn new(retry: RetryConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("pyprov/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { http, retry })
    }

    /// HEAD the artifact with retries.
    pub async fn check(&self, url: &Url) -> Availability {
        match send_with_retry(|| self.http.head(url.clone()), &self.retry).await {
            RetryOutcome::Success(_) => Availability::Available,
            RetryOutcome::HttpError(response) => Availability::Missing {
                status: response.status(),
            },
            RetryOutcome::ConnectionError { attempts, source } => Availability::Unreachable {
                attempts,
                detail: source.to_string(),
            },
            RetryOutcome::NonRetryable(source) => Availability::Unreachable {
                attempts: 1,
                detail: source.to_string(),
            },
        }
    }

    /// Stream the artifact into a scratch file under `scratch_dir`, then unpack it into `dest`.
    ///
    /// The scratch file is removed on every path. Returns the number of bytes downloaded.
    pub async fn download_and_extract(
        &self,
        url: &Url,
        dest: &Path,
        scratch_dir: &Path,
    ) -> Result<u64, FetchError> {
        let format = ArchiveFormat::from_name(url.path())
            .ok_or_else(|| archive::ExtractError::UnsupportedFormat(url.to_string()))?;

        let response = match send_with_retry(|| self.http.get(url.clone()), &self.retry).await {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: response.status(),
                });
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(FetchError::Connection {
                    url: url.to_string(),
                    attempts,
                    source,
                });
            }
            RetryOutcome::NonRetryable(source) => {
                return Err(FetchError::Connection {
                    url: url.to_string(),
                    attempts: 1,
                    source,
                });
            }
        };

        let mut spool = NamedTempFile::new_in(scratch_dir).map_err(FetchError::Spool)?;
        let mut downloaded: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })?;
            spool.write_all(&chunk).map_err(FetchError::Spool)?;
            downloaded += chunk.len() as u64;
        }
        spool.flush().map_err(FetchError::Spool)?;
        tracing::info!(url = %url, bytes = downloaded, "Downloaded artifact");

        archive::extract(spool.path(), format, dest)?;
        Ok(downloaded)
    }
}
