//! End-to-end CLI tests for the mirror binary.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use support::site::{mount_file, mount_index};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("mirror").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Incrementally mirror"))
        .stdout(predicate::str::contains("--on-corrupt-manifest"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("mirror").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror"));
}

/// Test that missing positionals are a usage error.
#[test]
fn test_binary_missing_arguments_returns_error() {
    let mut cmd = Command::cargo_bin("mirror").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that an unusable base URL is a fatal error with exit code 1.
#[test]
fn test_binary_invalid_url_exits_with_failure_code() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("mirror").unwrap();
    cmd.arg("ftp://example.com/pub/")
        .arg(dir.path())
        .assert()
        .code(1);
}

/// Test that a clean run exits 0 and writes the mirror plus its manifest.
#[tokio::test]
async fn test_binary_mirrors_mock_site() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_index(&server, "", &["hello.txt"]).await;
    mount_file(&server, "hello.txt", b"hello").await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/mirror/", server.uri());
    let target = dir.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("mirror")
            .unwrap()
            .arg(url)
            .arg(&target)
            .arg("-q")
            .assert()
    })
    .await
    .unwrap();

    assert.code(0);
    assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"hello");
    assert!(dir.path().join(".manifest").exists());
}

/// Test that a run with a failed branch exits with the partial code.
#[tokio::test]
async fn test_binary_partial_run_exits_two() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_index(&server, "", &["missing.txt"]).await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/mirror/", server.uri());
    let target = dir.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("mirror")
            .unwrap()
            .arg(url)
            .arg(&target)
            .arg("-q")
            .assert()
    })
    .await
    .unwrap();

    assert.code(2);
}
