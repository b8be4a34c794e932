//! Build metadata store.
//!
//! Metadata is telemetry: losing it must never fail a build, so persistence
//! errors are logged and swallowed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pyprov_utils::{atomic_write, read_optional};

pub const FAILURE_REASON: &str = "failure_reason";
pub const PYTHON_VERSION: &str = "python_version";
pub const PYTHON_VERSION_MAJOR: &str = "python_version_major";
pub const PIP_VERSION: &str = "pip_version";
pub const SETUPTOOLS_VERSION: &str = "setuptools_version";
pub const WHEEL_VERSION: &str = "wheel_version";

/// `key=value` store, optionally backed by a file.
#[derive(Debug, Default)]
pub struct BuildMetadata {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl BuildMetadata {
    /// Open the store at `path`, keeping entries earlier build steps wrote.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_optional(&path) {
            Ok(Some(bytes)) => parse(&String::from_utf8_lossy(&bytes)),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read build metadata");
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            entries,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        tracing::debug!(key, value = %value, "Recording build metadata");
        self.entries.insert(key.to_string(), value);
        self.persist();
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let mut rendered = String::new();
        for (key, value) in &self.entries {
            rendered.push_str(key);
            rendered.push('=');
            rendered.push_str(value);
            rendered.push('\n');
        }
        if let Err(e) = atomic_write(path, rendered.as_bytes()) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist build metadata");
        }
    }
}

fn parse(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
