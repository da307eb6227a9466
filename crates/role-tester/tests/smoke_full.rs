//! End-to-end role tests against a real Docker daemon
//!
//! Ignored by default since they pull images and boot systemd containers:
//! `cargo test -p role-tester --test smoke_full -- --ignored`

use assert_cmd::Command;
use predicates::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

mod support;

fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("role-tester-{}-{}", prefix, nanos)
}

fn full(role: &tempfile::TempDir, name: &str) -> assert_cmd::assert::Assert {
    Command::cargo_bin("role-tester")
        .unwrap()
        .current_dir(role.path())
        .args(["full", "--quiet", "-n", name])
        .timeout(std::time::Duration::from_secs(900))
        .assert()
}

#[test]
#[ignore]
fn test_full_idempotent_role_exits_0() {
    if !support::is_docker_available() {
        eprintln!("Skipping Docker-dependent test: Docker not available");
        return;
    }
    let role = support::create_role(support::IDEMPOTENT_TASKS);
    let name = unique_name("ok");

    full(&role, &name).success();
    assert!(!support::container_running(&name));
    support::cleanup_container(&name);
}

#[test]
#[ignore]
fn test_full_syntax_error_exits_10() {
    if !support::is_docker_available() {
        eprintln!("Skipping Docker-dependent test: Docker not available");
        return;
    }
    let role = support::create_role(support::BROKEN_TASKS);
    let name = unique_name("syntax");

    full(&role, &name).failure().code(10);
    assert!(!support::container_running(&name));
    support::cleanup_container(&name);
}

#[test]
#[ignore]
fn test_full_non_idempotent_role_exits_12() {
    if !support::is_docker_available() {
        eprintln!("Skipping Docker-dependent test: Docker not available");
        return;
    }
    let role = support::create_role(support::CHANGING_TASKS);
    let name = unique_name("drift");

    full(&role, &name).failure().code(12);
    support::cleanup_container(&name);
}

#[test]
#[ignore]
fn test_run_then_destroy() {
    if !support::is_docker_available() {
        eprintln!("Skipping Docker-dependent test: Docker not available");
        return;
    }
    let role = support::create_role(support::IDEMPOTENT_TASKS);
    let name = unique_name("lifecycle");

    Command::cargo_bin("role-tester")
        .unwrap()
        .current_dir(role.path())
        .args(["run", "--quiet", "-n", &name])
        .assert()
        .success();
    assert!(support::container_running(&name));

    // A second run reuses the container
    Command::cargo_bin("role-tester")
        .unwrap()
        .current_dir(role.path())
        .args(["run", "-n", &name])
        .assert()
        .success()
        .stderr(predicate::str::contains("already running"));

    Command::cargo_bin("role-tester")
        .unwrap()
        .args(["destroy", "-n", &name])
        .assert()
        .success();
    assert!(!support::container_running(&name));
}
