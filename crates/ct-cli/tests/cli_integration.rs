//! CLI integration tests
//!
//! Tests the cluster-term CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn cluster_term() -> Command {
    let mut cmd = Command::cargo_bin("cluster-term")
        .expect("Failed to locate cluster-term binary - ensure it's built before running tests");
    cmd.env_remove("CT_PASSWORD").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    cluster_term()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster-term"))
        .stdout(predicate::str::contains("One interactive terminal over many SSH shells"));
}

#[test]
fn test_cli_version() {
    cluster_term()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster-term"));
}

#[test]
fn test_cli_check_help() {
    cluster_term()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--password"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_cli_config_path_uses_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");

    cluster_term()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_cli_config_show_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    cluster_term()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("completion_window"))
        .stderr(predicate::str::contains("No configuration file found"));
}

#[test]
fn test_cli_config_init_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    cluster_term()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("port = 22"));
    assert!(content.contains("term = \"xterm-256color\""));
}

#[test]
fn test_cli_check_without_hosts_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("none.toml");

    cluster_term()
        .args(["check", "--password", "x", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No hosts"));
}

#[test]
fn test_cli_check_unreachable_host_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("none.toml");

    cluster_term()
        .args(["check", "127.0.0.1", "--port", "1", "--password", "x", "--timeout", "2", "--config"])
        .arg(&path)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stdout(predicate::str::contains("127.0.0.1"))
        .stderr(predicate::str::contains("No host accepted the connection"));
}

#[test]
fn test_cli_rejects_invalid_port() {
    cluster_term()
        .args(["check", "host", "--port", "not-a-port"])
        .assert()
        .failure();
}
