//! Python version types.
//!
//! Versions are compared structurally, never by string prefix: `3.10` sorts after `3.9`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix used by runtime tags (`python-3.11.9`) and accepted on input.
const RUNTIME_TAG_PREFIX: &str = "python-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("'{raw}' is not a valid Python version; expected major.minor or major.minor.patch")]
    Malformed { raw: String },
    #[error("'{raw}' must be a full major.minor.patch version")]
    NotPinned { raw: String },
}

/// A `major.minor` release line, e.g. `3.11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseLine {
    major: u16,
    minor: u16,
}

impl ReleaseLine {
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ReleaseLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ReleaseLine {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<VersionSpec>()? {
            VersionSpec::Line(line) => Ok(line),
            VersionSpec::Exact(_) => Err(VersionParseError::Malformed { raw: s.to_string() }),
        }
    }
}

impl TryFrom<String> for ReleaseLine {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReleaseLine> for String {
    fn from(value: ReleaseLine) -> Self {
        value.to_string()
    }
}

/// A fully pinned `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion {
    major: u16,
    minor: u16,
    patch: u16,
}

impl PythonVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    #[must_use]
    pub const fn line(self) -> ReleaseLine {
        ReleaseLine::new(self.major, self.minor)
    }

    #[must_use]
    pub const fn patch(self) -> u16 {
        self.patch
    }

    /// Tag used in artifact names and the cached version marker: `python-3.11.9`.
    #[must_use]
    pub fn runtime_tag(self) -> String {
        format!("{RUNTIME_TAG_PREFIX}{self}")
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PythonVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<VersionSpec>()? {
            VersionSpec::Exact(version) => Ok(version),
            VersionSpec::Line(_) => Err(VersionParseError::NotPinned {
                raw: s.trim().to_string(),
            }),
        }
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PythonVersion> for String {
    fn from(value: PythonVersion) -> Self {
        value.to_string()
    }
}

/// What the application asked for: a release line or an exact version.
///
/// Accepts `3.11`, `3.11.4`, `python-3.11` and `python-3.11.4`; surrounding
/// whitespace is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSpec {
    Line(ReleaseLine),
    Exact(PythonVersion),
}

impl VersionSpec {
    #[must_use]
    pub const fn line(self) -> ReleaseLine {
        match self {
            Self::Line(line) => line,
            Self::Exact(version) => version.line(),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => write!(f, "{RUNTIME_TAG_PREFIX}{line}"),
            Self::Exact(version) => write!(f, "{RUNTIME_TAG_PREFIX}{version}"),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let malformed = || VersionParseError::Malformed {
            raw: trimmed.to_string(),
        };

        let body = trimmed.strip_prefix(RUNTIME_TAG_PREFIX).unwrap_or(trimmed);
        let mut parts = Vec::with_capacity(3);
        for component in body.split('.') {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            parts.push(component.parse::<u16>().map_err(|_| malformed())?);
        }

        match parts.as_slice() {
            [major, minor] => Ok(Self::Line(ReleaseLine::new(*major, *minor))),
            [major, minor, patch] => Ok(Self::Exact(PythonVersion::new(*major, *minor, *patch))),
            _ => Err(malformed()),
        }
    }
}
