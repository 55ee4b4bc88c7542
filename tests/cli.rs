//! End-to-end checks of the `gpuctl` binary that need no container engine.

use assert_cmd::Command;
use predicates::prelude::*;

fn gpuctl(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("gpuctl").expect("binary built");
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("GPUCTL_ENGINE");
    cmd
}

#[test]
fn help_lists_every_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let assert = gpuctl(dir.path()).arg("help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for sub in ["build", "run", "start", "exec", "stop", "setup-cdi", "status", "validate"] {
        assert!(out.contains(sub), "help is missing `{sub}`:\n{out}");
    }
}

#[test]
fn missing_engine_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    gpuctl(dir.path())
        .args(["stop", "--engine", "/nonexistent/gpuctl-engine"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no container engine found"));
}

#[test]
fn engine_override_via_environment() {
    let dir = tempfile::tempdir().unwrap();
    gpuctl(dir.path())
        .env("GPUCTL_ENGINE", "/nonexistent/from-env")
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/from-env"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gpuctl.yaml"), "shm_size: plenty\n").unwrap();
    gpuctl(dir.path())
        .arg("stop")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".gpuctl.yaml"));
}

#[test]
fn validate_json_on_empty_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let assert = gpuctl(dir.path())
        .args(["validate", "--json", "--engine", "/nonexistent/engine"])
        .assert()
        .code(1);
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(report["status"], "fail");
    assert_eq!(report["checks"][0]["name"], "engine");
    assert_eq!(report["checks"][0]["status"], "fail");
}

#[test]
fn unknown_subcommand_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    gpuctl(dir.path()).arg("explode").assert().failure();
}
