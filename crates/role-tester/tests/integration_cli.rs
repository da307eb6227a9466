use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Test Ansible roles inside Docker containers",
        ))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("full"))
        .stdout(predicate::str::contains("shell"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("distributions"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "role-tester {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_full_help_documents_exit_codes() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.args(["full", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--report-output"))
        .stdout(predicate::str::contains("12 idempotence check failed"));
}

#[test]
fn test_distributions_lists_catalog() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.arg("distributions")
        .assert()
        .success()
        .stdout(predicate::str::contains("fubarhouse/docker-ansible:bionic"))
        .stdout(predicate::str::contains("geerlingguy"));
}

#[test]
fn test_run_requires_name() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.arg("run")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--name"));
}

#[test]
fn test_invalid_log_format_rejected() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.args(["--log-format", "xml", "distributions"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_json_logs_go_to_stderr() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("ROLE_TESTER_LOG")
        .args(["--log-format", "json", "--log-level", "debug", "distributions"])
        .assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"DEBUG\""))
        .stdout(predicate::str::contains("\"level\"").not());
}

#[test]
fn test_log_filter_env_overrides_log_level() {
    let mut cmd = Command::cargo_bin("role-tester").unwrap();
    cmd.env("ROLE_TESTER_LOG", "error")
        .args(["--log-level", "debug", "distributions"])
        .assert()
        .success()
        .stderr(predicate::str::contains("CLI initialized").not());
}
