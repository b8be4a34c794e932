//! Fatal paths: each records its failure reason and leaves no half-committed state.

use std::fs;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use pyprov_engine::ProvisionError;
use pyprov_engine::metadata::{FAILURE_REASON, PYTHON_VERSION};

use crate::common::{Fixture, runtime_archive};

#[tokio::test]
async fn end_of_life_version_fails_before_any_request() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.6.1");

    let run = fixture.build().await;

    assert!(matches!(
        run.error(),
        ProvisionError::VersionEndOfLife { line, .. } if line.to_string() == "3.6"
    ));
    assert_eq!(run.metadata.get(FAILURE_REASON), Some("python-version-eol"));
    assert_eq!(run.metadata.get(PYTHON_VERSION), None);
    assert_eq!(fixture.requests("HEAD").await, 0);
    assert_eq!(fixture.requests("GET").await, 0);
    assert!(run.has_warning("2021-12-23"));
}

#[tokio::test]
async fn end_of_life_wins_over_a_warm_cache() {
    let fixture = Fixture::new().await;
    let root = fixture.cache_root();
    fs::create_dir_all(root.join("python/bin")).unwrap();
    fs::write(root.join("python-version"), "python-3.6.15").unwrap();
    fs::write(root.join("python-stack"), "heroku-22").unwrap();
    fixture.write_runtime_txt("python-3.6.15");

    let run = fixture.build().await;

    assert_eq!(run.error().failure_reason(), "python-version-eol");
    assert!(root.join("python/bin").is_dir(), "cache must be untouched");
    assert_eq!(fixture.requests("HEAD").await, 0);
}

#[tokio::test]
async fn unlisted_line_is_not_found_without_a_request() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.14");

    let run = fixture.build().await;

    assert!(matches!(
        run.error(),
        ProvisionError::VersionNotFound { requested, .. } if requested == "python-3.14"
    ));
    assert_eq!(fixture.requests("HEAD").await, 0);
}

#[tokio::test]
async fn missing_artifact_is_version_not_found() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.99");
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&fixture.server)
        .await;

    let run = fixture.build().await;

    assert!(matches!(
        run.error(),
        ProvisionError::VersionNotFound { requested, stack }
            if requested == "python-3.11.99" && stack == "heroku-22"
    ));
    assert_eq!(
        run.metadata.get(FAILURE_REASON),
        Some("python-version-not-found")
    );
    assert_eq!(run.metadata.get(PYTHON_VERSION), None);
    assert_eq!(fixture.requests("HEAD").await, 1);
    assert_eq!(fixture.requests("GET").await, 0);
    assert!(!fixture.cache_root().join("python-version").exists());
}

#[tokio::test]
async fn flaky_storage_is_retried_then_reported_as_not_found() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&fixture.server)
        .await;

    let run = fixture.build().await;

    assert_eq!(run.error().failure_reason(), "python-version-not-found");
}

#[tokio::test]
async fn invalid_runtime_txt_is_rejected() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("pypy3.10-7.3.12");

    let run = fixture.build().await;

    assert!(matches!(run.error(), ProvisionError::InvalidVersion { raw, .. } if raw == "pypy3.10-7.3.12"));
    assert_eq!(run.metadata.get(FAILURE_REASON), Some("python-version-invalid"));
}

#[tokio::test]
async fn failed_download_leaves_no_markers() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    let artifact = fixture.artifact_path("3.11.9");
    Mock::given(method("HEAD"))
        .and(path(artifact.clone()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path(artifact))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"truncated".to_vec()))
        .mount(&fixture.server)
        .await;

    let run = fixture.build().await;

    assert!(matches!(run.error(), ProvisionError::DownloadFailed { .. }));
    assert_eq!(run.metadata.get(FAILURE_REASON), Some("python-download"));
    assert_eq!(run.metadata.get(PYTHON_VERSION), Some("3.11.9"));
    let root = fixture.cache_root();
    assert!(!root.join("python-version").exists());
    assert!(!root.join("python-stack").exists());
}

#[tokio::test]
async fn runtime_without_bundled_pip_fails_bootstrap() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture
        .mount_archive("3.11.9", runtime_archive("3.11", &fixture.pip_log(), &[]))
        .await;

    let run = fixture.build().await;

    assert!(matches!(
        run.error(),
        ProvisionError::BootstrapArtifactMissing { .. }
    ));
    assert_eq!(run.metadata.get(FAILURE_REASON), Some("bundled-pip-not-found"));
    assert!(
        fixture.cache_root().join("python-version").exists(),
        "the runtime itself installed fine"
    );
}

#[tokio::test]
async fn missing_tool_pins_fail_before_bootstrap() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture.mount_runtime("3.11.9").await;
    fs::remove_file(fixture.buildpack_dir.join("requirements/wheel.txt")).unwrap();

    let run = fixture.build().await;

    assert!(matches!(run.error(), ProvisionError::ToolPins(_)));
    assert_eq!(run.metadata.get(FAILURE_REASON), Some("pip-requirements"));
    assert!(fixture.pip_invocations().is_empty());
}
