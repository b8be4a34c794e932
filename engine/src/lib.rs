//! Python runtime provisioning.
//!
//! [`Provisioner::run`] performs one build's worth of work, in order:
//!
//! 1. resolve the requested version (`runtime.txt`, or the policy default)
//! 2. reject end-of-life release lines before touching the network
//! 3. confirm the artifact exists for this stack and architecture
//! 4. record the version in build metadata
//! 5. warn about available patch upgrades and scheduled removals
//! 6. reconcile the on-disk cache ([`cache::assess`] / [`cache::apply`])
//! 7. download and extract the runtime unless the cache is reusable
//! 8. bootstrap pip, setuptools and wheel from the runtime's bundled wheel

pub mod bootstrap;
pub mod cache;
mod error;
pub mod metadata;
pub mod output;
pub mod paths;

pub use cache::{CacheAction, CacheLayout, CachePlan, CacheRecord, CacheRequest, CacheState};
pub use error::ProvisionError;
pub use metadata::BuildMetadata;
pub use output::{BuildOutput, CapturedOutput, ConsoleOutput, OutputEvent};
pub use paths::CommandPaths;

use std::fs;

use url::Url;

use pyprov_config::{BuildContext, ToolPins};
use pyprov_fetch::{ArtifactClient, Availability, artifact_url};
use pyprov_types::{PythonVersion, VersionSpec};
use pyprov_utils::{read_optional, remove_path};

/// Result of a successful build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub version: PythonVersion,
    pub cache_state: CacheState,
    /// `false` when the cached runtime was reused.
    pub installed: bool,
    pub pins: ToolPins,
}

pub struct Provisioner<O: BuildOutput> {
    ctx: BuildContext,
    client: ArtifactClient,
    output: O,
    metadata: BuildMetadata,
    layout: CacheLayout,
    paths: CommandPaths,
}

impl<O: BuildOutput> Provisioner<O> {
    pub fn new(ctx: BuildContext, client: ArtifactClient, output: O, metadata: BuildMetadata) -> Self {
        let layout = CacheLayout::new(ctx.cache_root());
        Self {
            ctx,
            client,
            output,
            metadata,
            layout,
            paths: CommandPaths::from_env(),
        }
    }

    /// `PATH` entries handed to child processes, runtime `bin/` first once installed.
    #[must_use]
    pub const fn command_paths(&self) -> &CommandPaths {
        &self.paths
    }

    /// Provision the runtime. On failure the error is shown as a warning and
    /// its `failure_reason` recorded before it is returned.
    pub async fn run(&mut self) -> Result<Outcome, ProvisionError> {
        match self.provision().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::debug!(error = ?e, "Provisioning failed");
                self.output.warn(&e.to_string());
                self.metadata
                    .set(metadata::FAILURE_REASON, e.failure_reason());
                Err(e)
            }
        }
    }

    async fn provision(&mut self) -> Result<Outcome, ProvisionError> {
        let spec = self.requested_version()?;
        let line = spec.line();

        if let Some(eol) = self.ctx.policy.end_of_life(line) {
            return Err(ProvisionError::VersionEndOfLife { line, eol });
        }
        let Some(version) = self.ctx.policy.resolve(spec) else {
            tracing::debug!(%spec, "No known patch release for requested line");
            return Err(self.not_found(spec.to_string()));
        };

        let url = self.check_availability(version).await?;

        self.metadata
            .set(metadata::PYTHON_VERSION, version.to_string());
        self.metadata
            .set(metadata::PYTHON_VERSION_MAJOR, version.line().to_string());

        self.warn_about_upgrades(version);

        let request = CacheRequest {
            stack: self.ctx.stack.as_str().to_string(),
            version,
            manifest: read_optional(&self.ctx.dependency_manifest())
                .map_err(|e| ProvisionError::io("read requirements.txt", e))?,
        };
        let record = CacheRecord::load(&self.layout, self.ctx.cached_stack.as_deref())
            .map_err(|e| ProvisionError::io("read the runtime cache", e))?;
        let plan = cache::assess(&record, &request);
        cache::apply(&plan, &self.layout, &request, &self.output)?;

        let installed = if plan.action.skips_install() {
            self.output
                .step(&format!("Using cached install of {}", version.runtime_tag()));
            false
        } else {
            self.install(version, &url).await?;
            true
        };

        let pins = self.bootstrap().await?;

        Ok(Outcome {
            version,
            cache_state: plan.state,
            installed,
            pins,
        })
    }

    fn requested_version(&self) -> Result<VersionSpec, ProvisionError> {
        let file = self.ctx.runtime_file();
        let contents = read_optional(&file)
            .map_err(|e| ProvisionError::io("read runtime.txt", e))?;
        let Some(contents) = contents else {
            let spec = VersionSpec::Line(self.ctx.policy.default_line());
            self.output.step(&format!(
                "No Python version was specified. Using the default: {spec}"
            ));
            return Ok(spec);
        };

        let raw = String::from_utf8_lossy(&contents).trim().to_string();
        raw.parse::<VersionSpec>()
            .map_err(|source| ProvisionError::InvalidVersion { file, raw, source })
    }

    fn not_found(&self, requested: String) -> ProvisionError {
        ProvisionError::VersionNotFound {
            requested,
            stack: self.ctx.stack.as_str().to_string(),
        }
    }

    async fn check_availability(&self, version: PythonVersion) -> Result<Url, ProvisionError> {
        let url = artifact_url(
            &self.ctx.artifact_base_url,
            version,
            &self.ctx.stack,
            self.ctx.arch,
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Could not build artifact URL");
            self.not_found(version.runtime_tag())
        })?;

        match self.client.check(&url).await {
            Availability::Available => Ok(url),
            Availability::Missing { status } => {
                tracing::info!(url = %url, %status, "Runtime artifact not found");
                Err(self.not_found(version.runtime_tag()))
            }
            Availability::Unreachable { attempts, detail } => {
                tracing::warn!(url = %url, attempts, %detail, "Artifact storage unreachable");
                Err(self.not_found(version.runtime_tag()))
            }
        }
    }

    fn warn_about_upgrades(&self, version: PythonVersion) {
        if let Some(latest) = self.ctx.policy.patch_upgrade(version) {
            self.output.warn(&format!(
                "A Python security update is available! Upgrade as soon as possible to: {}",
                latest.runtime_tag()
            ));
        }
        let line = version.line();
        if let Some(eol) = self.ctx.policy.deprecation(line) {
            self.output.warn(&format!(
                "Python {line} will reach its upstream end-of-life on {eol}, after which it\n\
                 will no longer receive security updates. Support for it will be removed\n\
                 on or after that date. Upgrade to a newer Python version."
            ));
        }
    }

    async fn install(&mut self, version: PythonVersion, url: &Url) -> Result<(), ProvisionError> {
        self.output
            .step(&format!("Installing {}", version.runtime_tag()));

        let runtime_dir = self.layout.runtime_dir();
        self.layout
            .clear_markers()
            .map_err(|e| ProvisionError::io("clear the runtime markers", e))?;
        remove_path(&runtime_dir)
            .map_err(|e| ProvisionError::io("remove the previous runtime", e))?;
        fs::create_dir_all(&runtime_dir)
            .map_err(|e| ProvisionError::io("create the runtime directory", e))?;

        let bytes = self
            .client
            .download_and_extract(url, &runtime_dir, self.layout.root())
            .await
            .map_err(|source| ProvisionError::DownloadFailed { version, source })?;
        tracing::info!(%version, bytes, "Installed runtime");

        self.layout
            .record_install(version, self.ctx.stack.as_str())
            .map_err(|e| ProvisionError::io("write the runtime markers", e))?;
        self.paths.refresh(&self.layout.runtime_bin_dir());
        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<ToolPins, ProvisionError> {
        let pins = ToolPins::load(&self.ctx.requirements_dir())?;
        self.metadata.set(metadata::PIP_VERSION, pins.pip.clone());
        self.metadata
            .set(metadata::SETUPTOOLS_VERSION, pins.setuptools.clone());
        self.metadata.set(metadata::WHEEL_VERSION, pins.wheel.clone());

        let bundled = bootstrap::find_bundled_pip(&self.layout.runtime_dir())?;
        if !bundled.ignored.is_empty() {
            let ignored: Vec<String> = bundled
                .ignored
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            self.output.warn(&format!(
                "Found more than one bundled pip installer in the Python runtime.\n\
                 Using: {}\nIgnoring: {}",
                bundled.wheel.display(),
                ignored.join(", ")
            ));
        }

        self.output.step(&format!(
            "Installing pip {}, setuptools {} and wheel {}",
            pins.pip, pins.setuptools, pins.wheel
        ));
        let bin_dir = self.layout.runtime_bin_dir();
        self.paths.refresh(&bin_dir);
        bootstrap::install_tools(&bin_dir.join("python"), &bundled.wheel, &pins, &self.paths)
            .await?;
        Ok(pins)
    }
}
