//! Shared test utilities and fixtures
//!
//! A [`Fixture`] is one app checkout plus its build cache, buildpack
//! directory and a mock artifact server. Builds run in-process against it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pyprov_config::{BuildContext, VersionPolicy};
use pyprov_engine::{
    BuildMetadata, CapturedOutput, CommandPaths, Outcome, ProvisionError, Provisioner,
};
use pyprov_fetch::{ArtifactClient, RetryConfig};
use pyprov_types::{Arch, Stack};

/// Small policy with one line per interesting case.
pub const TEST_POLICY: &str = r#"
default_version = "3.11"

[latest]
"3.9" = "3.9.20"
"3.10" = "3.10.5"
"3.11" = "3.11.9"

[end_of_life]
"3.6" = "2021-12-23"

[deprecated]
"3.9" = "2025-10-31"
"#;

pub const PIP: &str = "24.0";
pub const SETUPTOOLS: &str = "70.3.0";
pub const WHEEL: &str = "0.44.0";

pub struct Fixture {
    root: TempDir,
    pub server: MockServer,
    pub build_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub buildpack_dir: PathBuf,
    pub stack: String,
    pub cached_stack: Option<String>,
}

pub struct BuildRun {
    pub result: Result<Outcome, ProvisionError>,
    pub output: CapturedOutput,
    /// Metadata as persisted to the cache dir.
    pub metadata: BuildMetadata,
    pub paths: CommandPaths,
}

impl BuildRun {
    pub fn outcome(&self) -> &Outcome {
        match &self.result {
            Ok(outcome) => outcome,
            Err(e) => panic!("build failed: {e}\noutput: {:?}", self.output.events()),
        }
    }

    pub fn error(&self) -> &ProvisionError {
        match &self.result {
            Ok(outcome) => panic!("build unexpectedly succeeded: {outcome:?}"),
            Err(e) => e,
        }
    }

    pub fn has_step(&self, needle: &str) -> bool {
        self.output.steps().iter().any(|step| step.contains(needle))
    }

    pub fn has_warning(&self, needle: &str) -> bool {
        self.output
            .warnings()
            .iter()
            .any(|warning| warning.contains(needle))
    }
}

impl Fixture {
    pub async fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let build_dir = root.path().join("build");
        let cache_dir = root.path().join("cache");
        let buildpack_dir = root.path().join("buildpack");
        fs::create_dir_all(&build_dir).unwrap();
        fs::create_dir_all(&cache_dir).unwrap();

        let requirements = buildpack_dir.join("requirements");
        fs::create_dir_all(&requirements).unwrap();
        fs::write(requirements.join("pip.txt"), format!("pip=={PIP}\n")).unwrap();
        fs::write(
            requirements.join("setuptools.txt"),
            format!("# pinned\nsetuptools=={SETUPTOOLS}\n"),
        )
        .unwrap();
        fs::write(requirements.join("wheel.txt"), format!("wheel=={WHEEL}\n")).unwrap();

        Self {
            root,
            server: MockServer::start().await,
            build_dir,
            cache_dir,
            buildpack_dir,
            stack: "heroku-22".to_string(),
            cached_stack: None,
        }
    }

    pub fn context(&self) -> BuildContext {
        BuildContext {
            build_dir: self.build_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            buildpack_dir: self.buildpack_dir.clone(),
            stack: Stack::parse(&self.stack).unwrap(),
            cached_stack: self.cached_stack.clone(),
            arch: Arch::Amd64,
            artifact_base_url: Url::parse(&self.server.uri()).unwrap(),
            policy: VersionPolicy::from_toml(TEST_POLICY).unwrap(),
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.build_dir.join(".heroku")
    }

    /// File the stub interpreter appends its arguments to.
    pub fn pip_log(&self) -> PathBuf {
        self.root.path().join("pip-invocations.log")
    }

    pub fn pip_invocations(&self) -> Vec<String> {
        read_lines(&self.pip_log())
    }

    /// `PATH` as seen by each stub interpreter run.
    pub fn pip_search_paths(&self) -> Vec<String> {
        read_lines(&search_path_log(&self.pip_log()))
    }

    pub fn write_runtime_txt(&self, contents: &str) {
        fs::write(self.build_dir.join("runtime.txt"), contents).unwrap();
    }

    pub fn write_manifest(&self, contents: &str) {
        fs::write(self.build_dir.join("requirements.txt"), contents).unwrap();
    }

    pub fn artifact_path(&self, version: &str) -> String {
        let ubuntu = self.stack.trim_start_matches("heroku-");
        format!("/python-{version}-ubuntu-{ubuntu}.04-amd64.tar.zst")
    }

    /// Serve a working runtime for `version` on the current stack.
    pub async fn mount_runtime(&self, version: &str) {
        let line = version.rsplit_once('.').map_or(version, |(line, _)| line);
        let wheel = format!("lib/python{line}/ensurepip/_bundled/pip-{PIP}-py3-none-any.whl");
        self.mount_archive(version, runtime_archive(line, &self.pip_log(), &[wheel.as_str()]))
            .await;
    }

    /// Answer HEAD with 200 and GET with `archive`.
    pub async fn mount_archive(&self, version: &str, archive: Vec<u8>) {
        let artifact = self.artifact_path(version);
        Mock::given(method("HEAD"))
            .and(path(artifact.clone()))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(artifact))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(&self.server)
            .await;
    }

    pub async fn requests(&self, verb: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == verb)
            .count()
    }

    pub async fn build(&self) -> BuildRun {
        let ctx = self.context();
        let metadata_file = ctx.metadata_file();
        let client = ArtifactClient::new(fast_retry()).unwrap();
        let output = CapturedOutput::new();

        let mut provisioner = Provisioner::new(
            ctx,
            client,
            output.clone(),
            BuildMetadata::open(&metadata_file),
        );
        let result = provisioner.run().await;

        BuildRun {
            result,
            output,
            metadata: BuildMetadata::open(&metadata_file),
            paths: provisioner.command_paths().clone(),
        }
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter_factor: 0.0,
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn search_path_log(pip_log: &Path) -> PathBuf {
    pip_log.with_extension("path")
}

/// A zstd tarball shaped like a runtime build: a stub `bin/python` that
/// logs its arguments to `pip_log` and its `PATH` beside it, a stdlib file,
/// and the given wheels.
pub fn runtime_archive(line: &str, pip_log: &Path, wheels: &[&str]) -> Vec<u8> {
    let interpreter = format!(
        "#!/bin/sh\necho \"$@\" >> '{}'\necho \"$PATH\" >> '{}'\n",
        pip_log.display(),
        search_path_log(pip_log).display()
    );
    let mut builder = tar::Builder::new(Vec::new());
    let mut append = |entry: &str, mode: u32, body: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(body.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, entry, body).unwrap();
    };
    append("bin/python", 0o755, interpreter.as_bytes());
    append(&format!("lib/python{line}/os.py"), 0o644, b"# os\n");
    for wheel in wheels {
        append(wheel, 0o644, b"PK\x03\x04");
    }
    let tarball = builder.into_inner().unwrap();
    zstd::stream::encode_all(&tarball[..], 3).unwrap()
}
