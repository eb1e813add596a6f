//! CLI end-to-end tests
//!
//! Tests for the streamrelay command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the streamrelay binary
#[allow(deprecated)]
fn streamrelay_cmd() -> Command {
    Command::cargo_bin("streamrelay").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = streamrelay_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = streamrelay_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("streamrelay"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = streamrelay_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            "streamrelay ",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = streamrelay_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn test_cli_start_invalid_port() {
    let mut cmd = streamrelay_cmd();
    cmd.args(["start", "--port", "99999"]).assert().failure();
}

#[test]
fn test_cli_start_with_help() {
    let mut cmd = streamrelay_cmd();
    cmd.args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--host").and(predicate::str::contains("--port")));
}

#[test]
fn test_cli_validate_defaults() {
    let mut cmd = streamrelay_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("0.0.0.0:8080"));
}

#[test]
fn test_cli_validate_config_file() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("streamrelay.json");
    fs::write(
        &config_file,
        r#"{ "server": { "port": 9090 }, "proxy": { "default_user_agent": "chrome" } }"#,
    )
    .unwrap();

    let mut cmd = streamrelay_cmd();
    cmd.args(["validate", config_file.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("0.0.0.0:9090"))
        .stdout(predicate::str::contains("\"default_user_agent\": \"chrome\""));
}

#[test]
fn test_cli_validate_rejects_malformed_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("broken.json");
    fs::write(&config_file, "{ \"server\": ").unwrap();

    let mut cmd = streamrelay_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
