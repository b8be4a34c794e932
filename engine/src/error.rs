//! Fatal provisioning errors.
//!
//! Every variant aborts the build. [`ProvisionError::failure_reason`] is the
//! stable tag recorded in build metadata so failures can be grouped
//! without parsing messages.

use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use pyprov_config::PinError;
use pyprov_fetch::FetchError;
use pyprov_types::{PythonVersion, ReleaseLine, VersionParseError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid Python version in {}: '{raw}' ({source})", .file.display())]
    InvalidVersion {
        file: PathBuf,
        raw: String,
        source: VersionParseError,
    },

    #[error(
        "Python {line} reached its upstream end-of-life on {eol} and is no longer supported.\n\
         Update your runtime.txt to a supported Python version."
    )]
    VersionEndOfLife { line: ReleaseLine, eol: NaiveDate },

    #[error(
        "Requested runtime '{requested}' is not available for this stack ({stack}).\n\
         Check that the version exists and is supported on this stack."
    )]
    VersionNotFound { requested: String, stack: String },

    #[error("Failed to download and install Python {version}: {source}")]
    DownloadFailed {
        version: PythonVersion,
        source: FetchError,
    },

    #[error("Could not find the pip installer bundled with Python (looked for '{pattern}')")]
    BootstrapArtifactMissing { pattern: String },

    #[error("Failed to install pip, setuptools and wheel: {detail}")]
    BootstrapFailed { detail: String },

    #[error("Failed to read pinned tool versions: {0}")]
    ToolPins(#[from] PinError),

    #[error("Failed to {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(action: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            action: action.into(),
            source,
        }
    }

    /// Metadata value stored under `failure_reason`.
    #[must_use]
    pub const fn failure_reason(&self) -> &'static str {
        match self {
            Self::InvalidVersion { .. } => "python-version-invalid",
            Self::VersionEndOfLife { .. } => "python-version-eol",
            Self::VersionNotFound { .. } => "python-version-not-found",
            Self::DownloadFailed { .. } => "python-download",
            Self::BootstrapArtifactMissing { .. } => "bundled-pip-not-found",
            Self::BootstrapFailed { .. } => "pip-bootstrap",
            Self::ToolPins(_) => "pip-requirements",
            Self::Io { .. } => "python-io",
        }
    }
}
