//! Shared test utilities for role-tester CLI tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use tempfile::TempDir;

/// Whether a usable Docker daemon is reachable
pub fn is_docker_available() -> bool {
    StdCommand::new("docker")
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether a container with this exact name is running
pub fn container_running(name: &str) -> bool {
    let filter = format!("name=^{}$", name);
    StdCommand::new("docker")
        .args(["ps", "--filter", filter.as_str(), "--format", "{{.Names}}"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim() == name)
        .unwrap_or(false)
}

/// Force-remove a container left over by a failed test
pub fn cleanup_container(name: &str) {
    let _ = StdCommand::new("docker")
        .args(["rm", "--force", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Create a role whose tasks come from `tasks` and whose test playbook applies it
pub fn create_role(tasks: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "tasks/main.yml", tasks);
    write(
        dir.path(),
        "meta/main.yml",
        "---\ngalaxy_info:\n  role_name: role_under_test\n  author: tests\n  min_ansible_version: \"2.9\"\ndependencies: []\n",
    );
    write(
        dir.path(),
        "tests/playbook.yml",
        "---\n- hosts: all\n  roles:\n    - role_under_test\n",
    );
    dir
}

/// Tasks that converge on the first run and change nothing afterwards
pub const IDEMPOTENT_TASKS: &str = "---\n- name: Create marker\n  copy:\n    dest: /tmp/role-tester-marker\n    content: ok\n";

/// Tasks that report a change on every run
pub const CHANGING_TASKS: &str = "---\n- name: Always changes\n  command: date\n";

/// Tasks that fail to parse
pub const BROKEN_TASKS: &str = "---\n- name: Broken\n  copy: [dest\n";
