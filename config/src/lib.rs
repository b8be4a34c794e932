//! Build context for pyprov.
//!
//! The outer build driver communicates through environment variables. They are
//! read once into [`BuildContext`] so nothing downstream touches process state.
//!
//! | Variable              | Meaning                                               |
//! |-----------------------|-------------------------------------------------------|
//! | `STACK`               | Stack identifier, e.g. `heroku-22` (required)         |
//! | `BUILD_DIR`           | Application build directory (required)                |
//! | `CACHE_DIR`           | Build cache directory (required)                      |
//! | `BUILDPACK_DIR`       | Buildpack root holding `requirements/`                |
//! | `S3_BASE_URL`         | Artifact storage base URL                             |
//! | `CACHED_PYTHON_STACK` | Stack recorded by the previous build                  |
//! | `ARCH_COMMAND`        | Architecture query, default `dpkg --print-architecture` |
//! | `PYPROV_POLICY_FILE`  | Replacement version policy TOML                       |

mod pins;
mod policy;

pub use pins::{PinError, ToolPins};
pub use policy::{PolicyError, VersionPolicy};

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use url::Url;

use pyprov_types::{Arch, PlatformParseError, Stack};

pub const DEFAULT_ARTIFACT_BASE_URL: &str =
    "https://heroku-buildpack-python.s3.us-east-1.amazonaws.com";
pub const DEFAULT_ARCH_COMMAND: &str = "dpkg --print-architecture";

/// Directory inside the build dir that persists between builds.
const CACHE_ROOT_DIR: &str = ".heroku";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),
    #[error(transparent)]
    Platform(#[from] PlatformParseError),
    #[error("could not determine CPU architecture from '{command}': {detail}")]
    Arch { command: String, detail: String },
    #[error("invalid artifact base URL '{raw}': {source}")]
    BaseUrl { raw: String, source: url::ParseError },
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Application source being built; `runtime.txt` and `requirements.txt` live here.
    pub build_dir: PathBuf,
    /// Driver-owned cache dir; build metadata is written under it.
    pub cache_dir: PathBuf,
    /// Buildpack checkout; tool pins are read from `requirements/`.
    pub buildpack_dir: PathBuf,
    pub stack: Stack,
    /// Stack the driver says the cache was built for. Falls back to the
    /// on-disk marker when `None`.
    pub cached_stack: Option<String>,
    pub arch: Arch,
    pub artifact_base_url: Url,
    pub policy: VersionPolicy,
}

impl BuildContext {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a context from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::MissingVar(name));

        let stack = Stack::parse(&required("STACK")?)?;
        let build_dir = PathBuf::from(required("BUILD_DIR")?);
        let cache_dir = PathBuf::from(required("CACHE_DIR")?);
        let buildpack_dir = var("BUILDPACK_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from);

        let raw_url = var("S3_BASE_URL").unwrap_or_else(|| DEFAULT_ARTIFACT_BASE_URL.to_string());
        let artifact_base_url = Url::parse(raw_url.trim_end_matches('/'))
            .map_err(|source| ConfigError::BaseUrl { raw: raw_url, source })?;

        let arch_command = var("ARCH_COMMAND").unwrap_or_else(|| DEFAULT_ARCH_COMMAND.to_string());
        let arch = detect_arch(&arch_command)?;

        let policy_file = var("PYPROV_POLICY_FILE").map(PathBuf::from);
        let policy = VersionPolicy::load(policy_file.as_deref())?;

        let context = Self {
            build_dir,
            cache_dir,
            buildpack_dir,
            stack,
            cached_stack: var("CACHED_PYTHON_STACK").map(|s| s.trim().to_string()),
            arch,
            artifact_base_url,
            policy,
        };
        tracing::debug!(
            stack = %context.stack,
            arch = %context.arch,
            build_dir = %context.build_dir.display(),
            "Build context loaded"
        );
        Ok(context)
    }

    /// `<BUILD_DIR>/.heroku`: runtime, markers and cached manifest.
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        self.build_dir.join(CACHE_ROOT_DIR)
    }

    /// File naming the requested Python version.
    #[must_use]
    pub fn runtime_file(&self) -> PathBuf {
        self.build_dir.join("runtime.txt")
    }

    /// Dependency manifest whose changes force a reinstall.
    #[must_use]
    pub fn dependency_manifest(&self) -> PathBuf {
        self.build_dir.join("requirements.txt")
    }

    #[must_use]
    pub fn requirements_dir(&self) -> PathBuf {
        self.buildpack_dir.join("requirements")
    }

    #[must_use]
    pub fn metadata_file(&self) -> PathBuf {
        self.cache_dir.join("build-data").join("python")
    }
}

/// Run the architecture query, falling back to the architecture this binary was built for.
fn detect_arch(command: &str) -> Result<Arch, ConfigError> {
    match run_arch_command(command) {
        Ok(arch) => Ok(arch),
        Err(detail) => {
            let Some(host) = Arch::host() else {
                return Err(ConfigError::Arch {
                    command: command.to_string(),
                    detail,
                });
            };
            tracing::warn!(
                command,
                %detail,
                fallback = %host,
                "Architecture query failed; using host architecture"
            );
            Ok(host)
        }
    }
}

fn run_arch_command(command: &str) -> Result<Arch, String> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or_else(|| "empty command".to_string())?;
    let output = Command::new(program)
        .args(parts)
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("exited with {}", output.status));
    }
    String::from_utf8_lossy(&output.stdout)
        .parse::<Arch>()
        .map_err(|e| e.to_string())
}
