//! Runtime cache state machine.
//!
//! [`assess`] is pure: it maps what the previous build left on disk
//! ([`CacheRecord`]) and what this build wants ([`CacheRequest`]) to a
//! [`CachePlan`]. [`apply`] performs the filesystem side of that plan.
//!
//! | State                 | Action                  |
//! |-----------------------|-------------------------|
//! | `NoCache`             | `Install`               |
//! | `StackChanged`        | `WipeAllAndInstall`     |
//! | `VersionChanged`      | `WipeRuntimeAndInstall` |
//! | `DependenciesChanged` | `WipeRuntimeAndInstall` |
//! | `Unchanged`           | `SkipInstall`           |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pyprov_types::PythonVersion;
use pyprov_utils::{
    AtomicWriteOptions, FileSyncPolicy, atomic_write, atomic_write_with_options, read_marker,
    read_optional, remove_path,
};

use crate::error::ProvisionError;
use crate::output::BuildOutput;

/// Paths of everything the provisioner keeps under the cache root.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("python")
    }

    #[must_use]
    pub fn runtime_bin_dir(&self) -> PathBuf {
        self.runtime_dir().join("bin")
    }

    #[must_use]
    pub fn version_marker(&self) -> PathBuf {
        self.root.join("python-version")
    }

    #[must_use]
    pub fn stack_marker(&self) -> PathBuf {
        self.root.join("python-stack")
    }

    #[must_use]
    pub fn vendor_dir(&self) -> PathBuf {
        self.root.join("vendor")
    }

    #[must_use]
    pub fn manifest_copy(&self) -> PathBuf {
        self.root.join("requirements.txt")
    }

    /// Remove the runtime, both markers and vendored artifacts.
    pub fn wipe_all(&self) -> io::Result<()> {
        for path in [
            self.runtime_dir(),
            self.version_marker(),
            self.stack_marker(),
            self.vendor_dir(),
        ] {
            remove_path(&path)?;
        }
        Ok(())
    }

    pub fn wipe_runtime(&self) -> io::Result<()> {
        remove_path(&self.runtime_dir()).map(|_| ())
    }

    /// Drop both markers so an interrupted install is never mistaken for a good one.
    pub fn clear_markers(&self) -> io::Result<()> {
        remove_path(&self.version_marker())?;
        remove_path(&self.stack_marker())?;
        Ok(())
    }

    /// Commit a finished install.
    pub fn record_install(&self, version: PythonVersion, stack: &str) -> io::Result<()> {
        atomic_write(self.version_marker(), version.runtime_tag().as_bytes())?;
        atomic_write(self.stack_marker(), stack.as_bytes())
    }

    pub fn save_manifest_copy(&self, manifest: &[u8]) -> io::Result<()> {
        atomic_write_with_options(
            self.manifest_copy(),
            manifest,
            AtomicWriteOptions {
                file_sync: FileSyncPolicy::SkipSync,
                create_parents: true,
            },
        )
    }
}

/// What the previous build left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    pub stack: Option<String>,
    /// Runtime tag from the version marker, e.g. `python-3.11.9`.
    pub version: Option<String>,
    pub runtime_present: bool,
    pub manifest_copy: Option<Vec<u8>>,
}

impl CacheRecord {
    /// Read the record from disk. `stack_override` (from the build driver)
    /// wins over the on-disk stack marker.
    pub fn load(layout: &CacheLayout, stack_override: Option<&str>) -> io::Result<Self> {
        let stack = match stack_override {
            Some(stack) => Some(stack.to_string()),
            None => read_marker(&layout.stack_marker())?,
        };
        Ok(Self {
            stack,
            version: read_marker(&layout.version_marker())?,
            runtime_present: layout.runtime_dir().is_dir(),
            manifest_copy: read_optional(&layout.manifest_copy())?,
        })
    }

    const fn is_empty(&self) -> bool {
        self.stack.is_none() && self.version.is_none() && !self.runtime_present
    }
}

/// What this build needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub stack: String,
    pub version: PythonVersion,
    /// Current dependency manifest, if the app has one.
    pub manifest: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    NoCache,
    StackChanged,
    VersionChanged,
    DependenciesChanged,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Install,
    WipeAllAndInstall,
    WipeRuntimeAndInstall,
    SkipInstall,
}

impl CacheAction {
    #[must_use]
    pub const fn skips_install(self) -> bool {
        matches!(self, Self::SkipInstall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStatus {
    /// The app has no dependency manifest.
    Absent,
    /// Manifest present, nothing cached from an earlier build.
    FirstSeen,
    Changed,
    Unchanged,
}

impl ManifestStatus {
    #[must_use]
    pub const fn needs_saving(self) -> bool {
        matches!(self, Self::FirstSeen | Self::Changed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePlan {
    pub state: CacheState,
    pub action: CacheAction,
    pub manifest: ManifestStatus,
    pub previous_stack: Option<String>,
    pub previous_version: Option<String>,
}

#[must_use]
pub fn assess(record: &CacheRecord, request: &CacheRequest) -> CachePlan {
    let manifest = match (&request.manifest, &record.manifest_copy) {
        (None, _) => ManifestStatus::Absent,
        (Some(_), None) => ManifestStatus::FirstSeen,
        (Some(current), Some(cached)) if current == cached => ManifestStatus::Unchanged,
        (Some(_), Some(_)) => ManifestStatus::Changed,
    };

    let (state, action) = if record.is_empty() {
        (CacheState::NoCache, CacheAction::Install)
    } else if record
        .stack
        .as_deref()
        .is_some_and(|stack| stack != request.stack)
    {
        (CacheState::StackChanged, CacheAction::WipeAllAndInstall)
    } else {
        let wanted = request.version.runtime_tag();
        match record.version.as_deref() {
            None => (CacheState::NoCache, CacheAction::Install),
            Some(cached) if cached != wanted => {
                (CacheState::VersionChanged, CacheAction::WipeRuntimeAndInstall)
            }
            Some(_) if !record.runtime_present => (CacheState::NoCache, CacheAction::Install),
            Some(_) if manifest == ManifestStatus::Changed => (
                CacheState::DependenciesChanged,
                CacheAction::WipeRuntimeAndInstall,
            ),
            Some(_) => (CacheState::Unchanged, CacheAction::SkipInstall),
        }
    };

    tracing::debug!(?state, ?action, ?manifest, "Assessed runtime cache");
    CachePlan {
        state,
        action,
        manifest,
        previous_stack: record.stack.clone(),
        previous_version: record.version.clone(),
    }
}

/// Carry out the wipes and manifest bookkeeping of `plan`, reporting each as a step.
pub fn apply<O>(
    plan: &CachePlan,
    layout: &CacheLayout,
    request: &CacheRequest,
    output: &O,
) -> Result<(), ProvisionError>
where
    O: BuildOutput + ?Sized,
{
    match plan.state {
        CacheState::StackChanged => {
            output.step(&format!(
                "Stack has changed from {} to {}, clearing cache",
                plan.previous_stack.as_deref().unwrap_or("unknown"),
                request.stack
            ));
            layout
                .wipe_all()
                .map_err(|e| ProvisionError::io("clear the runtime cache", e))?;
        }
        CacheState::VersionChanged => {
            output.step(&format!(
                "Python version has changed from {} to {}, clearing cache",
                plan.previous_version.as_deref().unwrap_or("unknown"),
                request.version.runtime_tag()
            ));
            layout
                .wipe_runtime()
                .map_err(|e| ProvisionError::io("remove the cached runtime", e))?;
        }
        CacheState::NoCache | CacheState::DependenciesChanged | CacheState::Unchanged => {}
    }

    match plan.manifest {
        ManifestStatus::Changed => {
            output.step("Requirements file has been changed, clearing cached dependencies");
            layout
                .wipe_runtime()
                .map_err(|e| ProvisionError::io("remove the cached runtime", e))?;
        }
        ManifestStatus::Unchanged if plan.action.skips_install() => {
            output.step("No change in requirements detected, installing from cache");
        }
        ManifestStatus::Absent | ManifestStatus::FirstSeen | ManifestStatus::Unchanged => {}
    }

    if plan.manifest.needs_saving()
        && let Some(manifest) = &request.manifest
    {
        fs::create_dir_all(layout.root())
            .map_err(|e| ProvisionError::io("create the cache directory", e))?;
        layout
            .save_manifest_copy(manifest)
            .map_err(|e| ProvisionError::io("cache the requirements file", e))?;
    }
    Ok(())
}
