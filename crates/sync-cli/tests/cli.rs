//! End-to-end coverage of the `sync-cli` binary's non-daemon subcommands:
//! `validate-config`, `status`, and `doctor`. `run` itself is exercised at
//! the unit level in `sync-core` (it never returns under normal operation).

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

fn cmd() -> Command {
    Command::cargo_bin("sync-cli").expect("find sync-cli binary")
}

const VALID_CONFIG: &str = r#"
sync:
  interval: 30s
git:
  repository: https://example.invalid/org/repo.git
  branch: main
applications:
  - name: intervalai
    namespace: default
    path: helm-charts/intervalai
"#;

const INVALID_CONFIG: &str = r#"
sync:
  interval: 30s
git:
  repository: https://example.invalid/org/repo.git
  branch: "not a valid branch name!"
applications: []
"#;

#[test]
#[serial]
fn validate_config_accepts_a_well_formed_file() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("sync-config.yaml");
    std::fs::write(&config_path, VALID_CONFIG).unwrap();

    cmd()
        .env("CONFIG_PATH", &config_path)
        .arg("validate-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 1 application"));
}

#[test]
#[serial]
fn validate_config_rejects_an_invalid_branch_name_with_exit_code_one() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("sync-config.yaml");
    std::fs::write(&config_path, INVALID_CONFIG).unwrap();

    cmd()
        .env("CONFIG_PATH", &config_path)
        .arg("validate-config")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid:"));
}

#[test]
#[serial]
fn validate_config_reports_a_missing_file() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("does-not-exist.yaml");

    cmd()
        .env("CONFIG_PATH", &missing)
        .arg("validate-config")
        .assert()
        .failure()
        .code(1);
}

#[test]
#[serial]
fn status_reports_no_prior_cycle_for_a_fresh_state_dir() {
    let dir = tempdir().expect("tempdir");

    cmd()
        .arg("--state-dir")
        .arg(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no cycle has completed yet"));
}

#[test]
#[serial]
fn doctor_reports_on_all_three_external_binaries() {
    let output = cmd().arg("doctor").output().expect("run doctor");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for binary in ["git", "helm", "kubectl"] {
        assert!(
            stdout.contains(binary),
            "expected doctor output to mention {binary}, got: {stdout}"
        );
    }
}
