//! Pinned versions of pip and its companion packaging tools.
//!
//! The buildpack ships one requirements file per tool under `requirements/`,
//! each holding a single `name==version` line.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PinError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} does not pin {package} (expected a '{package}==<version>' line)", .path.display())]
    Missing { package: &'static str, path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPins {
    pub pip: String,
    pub setuptools: String,
    pub wheel: String,
}

impl ToolPins {
    pub fn load(requirements_dir: &Path) -> Result<Self, PinError> {
        Ok(Self {
            pip: read_pin(requirements_dir, "pip")?,
            setuptools: read_pin(requirements_dir, "setuptools")?,
            wheel: read_pin(requirements_dir, "wheel")?,
        })
    }

    /// `pip==X`, `setuptools==Y`, `wheel==Z`, in install order.
    #[must_use]
    pub fn requirement_specifiers(&self) -> [String; 3] {
        [
            format!("pip=={}", self.pip),
            format!("setuptools=={}", self.setuptools),
            format!("wheel=={}", self.wheel),
        ]
    }
}

fn read_pin(requirements_dir: &Path, package: &'static str) -> Result<String, PinError> {
    let path = requirements_dir.join(format!("{package}.txt"));
    let content = std::fs::read_to_string(&path).map_err(|source| PinError::Read {
        path: path.clone(),
        source,
    })?;
    parse_pin(&content, package).ok_or(PinError::Missing { package, path })
}

/// Find `package==version` in requirements text. Package names compare case-insensitively.
fn parse_pin(content: &str, package: &str) -> Option<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .find_map(|line| {
            let (name, version) = line.split_once("==")?;
            let version = version.trim();
            (name.trim().eq_ignore_ascii_case(package) && !version.is_empty())
                .then(|| version.to_string())
        })
}
