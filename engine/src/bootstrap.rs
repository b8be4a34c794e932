//! Package manager bootstrap.
//!
//! Every runtime build ships a pip wheel inside `ensurepip`. Running that
//! wheel directly installs the pinned pip, setuptools and wheel without
//! needing a pip already on the system.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use tokio::process::Command;

use pyprov_config::ToolPins;

use crate::error::ProvisionError;
use crate::paths::CommandPaths;

/// Location of the bundled pip wheel, relative to the runtime root.
pub const BUNDLED_PIP_GLOB: &str = "lib/python*/ensurepip/_bundled/pip-*.whl";

const PIP_INSTALL_FLAGS: [&str; 5] = [
    "install",
    "--quiet",
    "--disable-pip-version-check",
    "--no-cache-dir",
    "--no-input",
];

/// Longest stderr excerpt carried into a bootstrap error.
const STDERR_TAIL_BYTES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledPip {
    /// The wheel that will be used.
    pub wheel: PathBuf,
    /// Further matches, in sorted order. Normally empty.
    pub ignored: Vec<PathBuf>,
}

fn bundled_pip_matcher() -> Result<GlobMatcher, ProvisionError> {
    let glob = GlobBuilder::new(BUNDLED_PIP_GLOB)
        .literal_separator(true)
        .build()
        .map_err(|e| ProvisionError::BootstrapFailed {
            detail: format!("invalid bundled pip pattern: {e}"),
        })?;
    Ok(glob.compile_matcher())
}

/// Find the bundled pip wheel under `runtime_dir`.
///
/// Some upstream runtime builds carried two wheels; matches are sorted and
/// the first wins so the choice is stable between builds.
pub fn find_bundled_pip(runtime_dir: &Path) -> Result<BundledPip, ProvisionError> {
    let matcher = bundled_pip_matcher()?;
    let mut builder = WalkBuilder::new(runtime_dir);
    builder.standard_filters(false);
    builder.follow_links(false);
    builder.max_depth(Some(bundled_pip_depth()));

    let mut found: Vec<PathBuf> = builder
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(runtime_dir)
                .is_ok_and(|relative| matcher.is_match(relative))
        })
        .map(ignore::DirEntry::into_path)
        .collect();
    found.sort();

    let mut found = found.into_iter();
    let Some(wheel) = found.next() else {
        return Err(ProvisionError::BootstrapArtifactMissing {
            pattern: BUNDLED_PIP_GLOB.to_string(),
        });
    };
    let bundled = BundledPip {
        wheel,
        ignored: found.collect(),
    };
    tracing::debug!(
        wheel = %bundled.wheel.display(),
        ignored = bundled.ignored.len(),
        "Located bundled pip"
    );
    Ok(bundled)
}

/// Depth of a [`BUNDLED_PIP_GLOB`] match below the runtime root, which the
/// walker counts as depth 0.
fn bundled_pip_depth() -> usize {
    BUNDLED_PIP_GLOB.split('/').count()
}

/// Install the pinned tools with `python <wheel>/pip install ...`.
pub async fn install_tools(
    python: &Path,
    wheel: &Path,
    pins: &ToolPins,
    paths: &CommandPaths,
) -> Result<(), ProvisionError> {
    let mut command = Command::new(python);
    command
        .arg(wheel.join("pip"))
        .args(PIP_INSTALL_FLAGS)
        .args(pins.requirement_specifiers())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path_var) = paths.to_path_var() {
        command.env("PATH", path_var);
    }

    tracing::info!(
        python = %python.display(),
        wheel = %wheel.display(),
        "Bootstrapping pip"
    );
    let output = command
        .output()
        .await
        .map_err(|e| ProvisionError::BootstrapFailed {
            detail: format!("could not run {}: {e}", python.display()),
        })?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .map(|(idx, _)| idx)
        .find(|idx| stderr.len() - idx <= STDERR_TAIL_BYTES)
        .unwrap_or(stderr.len());
    Err(ProvisionError::BootstrapFailed {
        detail: format!("pip exited with {}: {}", output.status, &stderr[tail_start..]),
    })
}
