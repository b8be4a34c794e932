//! Cache reuse and invalidation across consecutive builds.

#![cfg(unix)]

use std::fs;

use pyprov_engine::CacheState;
use pyprov_types::PythonVersion;

use crate::common::Fixture;

#[tokio::test]
async fn unchanged_build_skips_install_but_still_bootstraps() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11");
    fixture.write_manifest("flask==3.0.3\n");
    fixture.mount_runtime("3.11.9").await;

    let first = fixture.build().await;
    assert!(first.outcome().installed);
    assert_eq!(
        fs::read(fixture.cache_root().join("requirements.txt")).unwrap(),
        b"flask==3.0.3\n"
    );

    let second = fixture.build().await;
    let outcome = second.outcome();
    assert_eq!(outcome.cache_state, CacheState::Unchanged);
    assert!(!outcome.installed);
    assert!(second.has_step("No change in requirements detected, installing from cache"));
    assert!(second.has_step("Using cached install of python-3.11.9"));

    assert_eq!(fixture.requests("GET").await, 1);
    assert_eq!(fixture.requests("HEAD").await, 2);
    assert_eq!(fixture.pip_invocations().len(), 2);
}

#[tokio::test]
async fn cached_runtime_is_on_path_when_pip_runs() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture.mount_runtime("3.11.9").await;
    fixture.build().await.outcome();

    let second = fixture.build().await;
    assert!(!second.outcome().installed);

    let bin_dir = fixture.cache_root().join("python/bin");
    assert_eq!(second.paths.entries().first(), Some(&bin_dir));
    let search_paths = fixture.pip_search_paths();
    assert_eq!(search_paths.len(), 2, "{search_paths:?}");
    let cached_run = search_paths[1].split(':').next();
    assert_eq!(cached_run, Some(bin_dir.to_str().unwrap()));
}

#[tokio::test]
async fn one_byte_manifest_change_reinstalls() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture.write_manifest("flask==3.0.3\n");
    fixture.mount_runtime("3.11.9").await;
    fixture.build().await.outcome();

    fixture.write_manifest("flask==3.0.4\n");
    let second = fixture.build().await;

    let outcome = second.outcome();
    assert_eq!(outcome.cache_state, CacheState::DependenciesChanged);
    assert!(outcome.installed);
    assert!(second.has_step("Requirements file has been changed, clearing cached dependencies"));
    assert_eq!(fixture.requests("GET").await, 2);
    assert_eq!(
        fs::read(fixture.cache_root().join("requirements.txt")).unwrap(),
        b"flask==3.0.4\n"
    );
}

#[tokio::test]
async fn version_change_replaces_runtime_and_keeps_vendor() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.10.5");
    fixture.mount_runtime("3.10.5").await;
    fixture.mount_runtime("3.11.9").await;
    fixture.build().await.outcome();
    let vendor = fixture.cache_root().join("vendor");
    fs::create_dir_all(&vendor).unwrap();

    fixture.write_runtime_txt("python-3.11.9");
    let second = fixture.build().await;

    assert_eq!(second.outcome().cache_state, CacheState::VersionChanged);
    assert!(second.has_step("Python version has changed from python-3.10.5 to python-3.11.9"));
    let root = fixture.cache_root();
    assert!(!root.join("python/lib/python3.10").exists());
    assert!(root.join("python/lib/python3.11").is_dir());
    assert!(vendor.is_dir());
    assert_eq!(
        fs::read_to_string(root.join("python-version")).unwrap(),
        "python-3.11.9"
    );
}

#[tokio::test]
async fn stack_change_wipes_whole_cache() {
    let mut fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture.write_manifest("flask\n");
    fixture.mount_runtime("3.11.9").await;
    fixture.build().await.outcome();
    let root = fixture.cache_root();
    fs::create_dir_all(root.join("vendor/libmemcached")).unwrap();

    fixture.stack = "heroku-24".to_string();
    fixture.mount_runtime("3.11.9").await;
    let second = fixture.build().await;

    let outcome = second.outcome();
    assert_eq!(outcome.cache_state, CacheState::StackChanged);
    assert_eq!(outcome.version, PythonVersion::new(3, 11, 9));
    assert!(outcome.installed);
    assert!(second.has_step("Stack has changed from heroku-22 to heroku-24, clearing cache"));
    assert!(!root.join("vendor").exists());
    assert_eq!(
        fs::read_to_string(root.join("python-stack")).unwrap(),
        "heroku-24"
    );
    assert!(
        second
            .output
            .steps()
            .iter()
            .all(|step| !step.starts_with("Requirements file")),
        "manifest unchanged across the stack switch"
    );
}

#[tokio::test]
async fn driver_supplied_stack_overrides_marker() {
    let mut fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    fixture.mount_runtime("3.11.9").await;
    fixture.build().await.outcome();

    fixture.cached_stack = Some("heroku-20".to_string());
    let second = fixture.build().await;

    assert_eq!(second.outcome().cache_state, CacheState::StackChanged);
}

#[tokio::test]
async fn build_after_failed_download_reinstalls() {
    let fixture = Fixture::new().await;
    fixture.write_runtime_txt("python-3.11.9");
    let root = fixture.cache_root();
    fs::create_dir_all(root.join("python/bin")).unwrap();
    fs::write(root.join("python-stack"), "heroku-22").unwrap();
    fixture.mount_runtime("3.11.9").await;

    let run = fixture.build().await;

    assert_eq!(run.outcome().cache_state, CacheState::NoCache);
    assert!(run.outcome().installed);
    assert!(root.join("python-version").is_file());
}
