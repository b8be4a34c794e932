//! Python release policy: latest patches, end-of-life and deprecated lines.
//!
//! ```toml
//! default_version = "3.12"
//!
//! [latest]
//! "3.12" = "3.12.7"
//!
//! [end_of_life]
//! "3.6" = "2021-12-23"
//!
//! [deprecated]
//! "3.9" = "2025-10-31"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use pyprov_types::{PythonVersion, ReleaseLine, VersionSpec};

const BUILTIN_POLICY: &str = include_str!("../policy.toml");
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read version policy {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse version policy: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid date '{raw}' for {line} in [{section}]; expected YYYY-MM-DD")]
    InvalidDate {
        section: &'static str,
        line: ReleaseLine,
        raw: String,
    },
    #[error("[latest] entry for {line} names {version}, which is not on that line")]
    LatestMismatch {
        line: ReleaseLine,
        version: PythonVersion,
    },
    #[error("default_version {0} has no [latest] entry")]
    DefaultWithoutLatest(ReleaseLine),
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    default_version: ReleaseLine,
    latest: BTreeMap<ReleaseLine, PythonVersion>,
    #[serde(default)]
    end_of_life: BTreeMap<ReleaseLine, String>,
    #[serde(default)]
    deprecated: BTreeMap<ReleaseLine, String>,
}

/// Typed release policy, keyed by [`ReleaseLine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPolicy {
    default_line: ReleaseLine,
    latest: BTreeMap<ReleaseLine, PythonVersion>,
    end_of_life: BTreeMap<ReleaseLine, NaiveDate>,
    deprecated: BTreeMap<ReleaseLine, NaiveDate>,
}

impl VersionPolicy {
    /// The policy compiled into the binary.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_toml(BUILTIN_POLICY)
    }

    /// Load a replacement policy from disk, or the builtin one when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loading version policy override");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, PolicyError> {
        let raw: RawPolicy = toml::from_str(content)?;

        for (line, version) in &raw.latest {
            if version.line() != *line {
                return Err(PolicyError::LatestMismatch {
                    line: *line,
                    version: *version,
                });
            }
        }
        if !raw.latest.contains_key(&raw.default_version) {
            return Err(PolicyError::DefaultWithoutLatest(raw.default_version));
        }

        Ok(Self {
            default_line: raw.default_version,
            latest: raw.latest,
            end_of_life: parse_dates("end_of_life", raw.end_of_life)?,
            deprecated: parse_dates("deprecated", raw.deprecated)?,
        })
    }

    #[must_use]
    pub const fn default_line(&self) -> ReleaseLine {
        self.default_line
    }

    #[must_use]
    pub fn latest(&self, line: ReleaseLine) -> Option<PythonVersion> {
        self.latest.get(&line).copied()
    }

    #[must_use]
    pub fn end_of_life(&self, line: ReleaseLine) -> Option<NaiveDate> {
        self.end_of_life.get(&line).copied()
    }

    /// End-of-life date of a line that still builds but is scheduled for removal.
    #[must_use]
    pub fn deprecation(&self, line: ReleaseLine) -> Option<NaiveDate> {
        self.deprecated.get(&line).copied()
    }

    /// Pin a request: exact versions pass through, release lines take the latest patch.
    ///
    /// `None` when an un-pinned line has no known latest patch.
    #[must_use]
    pub fn resolve(&self, spec: VersionSpec) -> Option<PythonVersion> {
        match spec {
            VersionSpec::Exact(version) => Some(version),
            VersionSpec::Line(line) => self.latest(line),
        }
    }

    /// The newer patch on the same line, if `version` is behind it.
    #[must_use]
    pub fn patch_upgrade(&self, version: PythonVersion) -> Option<PythonVersion> {
        self.latest(version.line())
            .filter(|latest| latest.patch() > version.patch())
    }
}

fn parse_dates(
    section: &'static str,
    raw: BTreeMap<ReleaseLine, String>,
) -> Result<BTreeMap<ReleaseLine, NaiveDate>, PolicyError> {
    raw.into_iter()
        .map(|(line, value)| {
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
                .map(|date| (line, date))
                .map_err(|_| PolicyError::InvalidDate {
                    section,
                    line,
                    raw: value,
                })
        })
        .collect()
}
