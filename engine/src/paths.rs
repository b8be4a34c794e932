//! Command search path handed to child processes.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `PATH` entries for subprocesses. The process's own environment is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPaths {
    entries: Vec<PathBuf>,
}

impl CommandPaths {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_path_var(env::var_os("PATH"))
    }

    #[must_use]
    pub fn from_path_var(value: Option<OsString>) -> Self {
        let entries = value
            .map(|value| {
                env::split_paths(&value)
                    .filter(|entry| !entry.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    /// Put `bin_dir` first so a freshly installed runtime shadows anything
    /// resolved before it. Repeated refreshes do not duplicate the entry.
    pub fn refresh(&mut self, bin_dir: &Path) {
        self.entries.retain(|entry| entry != bin_dir);
        self.entries.insert(0, bin_dir.to_path_buf());
        tracing::debug!(bin_dir = %bin_dir.display(), "Refreshed command paths");
    }

    #[must_use]
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Joined value for a child's `PATH`. `None` if an entry contains the separator.
    #[must_use]
    pub fn to_path_var(&self) -> Option<OsString> {
        env::join_paths(&self.entries).ok()
    }
}
