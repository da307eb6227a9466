//! Ansible stage execution
//!
//! Each stage has a local variant, run inside the container through
//! `docker exec --tty`, and a remote variant, run by the host's `ansible-playbook`
//! against the container over the `docker` connection plugin. Stages report a
//! [`StageOutcome`] instead of an error so the pipeline can always reach cleanup;
//! the underlying error text is logged.

use crate::config::RunConfig;
use crate::container::{ContainerHandle, ContainerManager};
use crate::errors::{DockerError, ProcessError};
use crate::idempotence;
use crate::process::{OutputMode, ProcessExecutor, ProcessOutput};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Result of one Ansible stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    pub passed: bool,
    /// The stage had nothing to do
    pub skipped: bool,
    pub duration: Duration,
}

impl StageOutcome {
    fn skipped() -> Self {
        Self {
            passed: false,
            skipped: true,
            duration: Duration::ZERO,
        }
    }
}

/// Runs playbooks for one container
pub struct AnsibleRunner<'a, E> {
    manager: &'a ContainerManager<E>,
    ansible_playbook: Option<PathBuf>,
}

impl<'a, E: ProcessExecutor> AnsibleRunner<'a, E> {
    /// `ansible_playbook` is the host binary used for remote runs
    pub fn new(manager: &'a ContainerManager<E>, ansible_playbook: Option<PathBuf>) -> Self {
        Self {
            manager,
            ansible_playbook,
        }
    }

    fn remote_binary(&self) -> std::result::Result<&Path, ProcessError> {
        self.ansible_playbook
            .as_deref()
            .ok_or_else(|| ProcessError::Spawn {
                program: "ansible-playbook".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    DockerError::NotInstalled {
                        name: "ansible-playbook".to_string(),
                    }
                    .to_string(),
                ),
            })
    }

    /// Program and arguments for an `ansible-playbook` invocation
    pub fn playbook_command(
        &self,
        handle: &ContainerHandle,
        config: &RunConfig,
        extra: &[&str],
    ) -> std::result::Result<(PathBuf, Vec<String>), ProcessError> {
        let mut args: Vec<String> = Vec::new();

        let program = if config.remote {
            args.extend(extra.iter().map(|s| s.to_string()));
            args.push(config.playbook.clone());
            let inventory = config
                .inventory
                .clone()
                .unwrap_or_else(|| format!("{},", handle.cid));
            args.push("-i".to_string());
            args.push(inventory);
            args.push("--connection".to_string());
            args.push("docker".to_string());
            self.remote_binary()?.to_path_buf()
        } else {
            args.extend([
                "exec".to_string(),
                "--tty".to_string(),
                handle.cid.clone(),
                "ansible-playbook".to_string(),
            ]);
            args.extend(extra.iter().map(|s| s.to_string()));
            args.push(config.playbook.clone());
            if let Some(inventory) = &config.inventory {
                args.push(format!("-i={}", inventory));
            }
            self.manager.docker().to_path_buf()
        };

        if config.verbose {
            args.push("-vvvv".to_string());
        }

        Ok((program, args))
    }

    async fn run_playbook(
        &self,
        handle: &ContainerHandle,
        config: &RunConfig,
        extra: &[&str],
        mode: OutputMode,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        let (program, args) = self.playbook_command(handle, config, extra)?;
        self.manager.executor().execute(&program, &args, mode).await
    }

    /// Install Galaxy requirements inside the container
    ///
    /// Skipped, with a warning, when no requirements file is configured.
    #[instrument(skip_all, fields(cid = %handle.cid))]
    pub async fn install_requirements(
        &self,
        handle: &ContainerHandle,
        config: &RunConfig,
    ) -> StageOutcome {
        let Some(requirements) = config.requirements.as_deref() else {
            if !config.quiet {
                warn!("Requirements file is not configured, skipping");
            }
            return StageOutcome::skipped();
        };

        info!("Installing requirements from {}", requirements);
        let mut args = vec![
            "exec".to_string(),
            "--tty".to_string(),
            handle.cid.clone(),
            "ansible-galaxy".to_string(),
            "install".to_string(),
            "-r".to_string(),
            requirements.to_string(),
        ];
        if config.verbose {
            args.push("-vvvv".to_string());
        }

        let started = Instant::now();
        let result = self
            .manager
            .docker_exec(args, OutputMode::visible(!config.quiet))
            .await;
        let duration = started.elapsed();

        match result {
            Ok(_) => StageOutcome {
                passed: true,
                skipped: false,
                duration,
            },
            Err(err) => {
                log_failure("Requirements installation", &err);
                StageOutcome {
                    passed: false,
                    skipped: false,
                    duration,
                }
            }
        }
    }

    /// `ansible-playbook --syntax-check`
    #[instrument(skip_all, fields(cid = %handle.cid, remote = config.remote))]
    pub async fn syntax_check(&self, handle: &ContainerHandle, config: &RunConfig) -> StageOutcome {
        info!("Checking role syntax");
        let started = Instant::now();
        let result = self
            .run_playbook(
                handle,
                config,
                &["--syntax-check"],
                OutputMode::visible(!config.quiet),
            )
            .await;
        let outcome = finish("Syntax check", result.map(|_| ()), started);
        report_verdict("Syntax check", outcome.passed);
        outcome
    }

    /// Run the playbook once
    #[instrument(skip_all, fields(cid = %handle.cid, remote = config.remote))]
    pub async fn run_role(&self, handle: &ContainerHandle, config: &RunConfig) -> StageOutcome {
        info!("Running the role");
        let started = Instant::now();
        let result = self
            .run_playbook(handle, config, &[], OutputMode::visible(!config.quiet))
            .await;
        let outcome = finish("Role run", result.map(|_| ()), started);
        if outcome.passed {
            info!("Role ran in {:.2?}", outcome.duration);
        }
        outcome
    }

    /// Run the playbook a second time and evaluate its recap
    ///
    /// A failing exit status does not short-circuit: the recap of the captured
    /// output decides, and a missing recap fails.
    #[instrument(skip_all, fields(cid = %handle.cid, remote = config.remote))]
    pub async fn idempotence_check(
        &self,
        handle: &ContainerHandle,
        config: &RunConfig,
    ) -> StageOutcome {
        info!("Testing role idempotence");
        let started = Instant::now();
        let output = match self
            .run_playbook(handle, config, &[], OutputMode::visible(!config.quiet))
            .await
        {
            Ok(output) => output.stdout,
            Err(err) => {
                log_failure("Idempotence run", &err);
                err.stdout().to_string()
            }
        };
        let duration = started.elapsed();

        let passed = idempotence::evaluate(&output);
        info!("Idempotence was checked in {:.2?}", duration);
        report_verdict("Idempotence test", passed);

        StageOutcome {
            passed,
            skipped: false,
            duration,
        }
    }

    /// Hosts the playbook targets, from `ansible-playbook --list-hosts`
    ///
    /// Listing failures are logged and yield an empty list.
    #[instrument(skip_all, fields(cid = %handle.cid, remote = config.remote))]
    pub async fn list_hosts(&self, handle: &ContainerHandle, config: &RunConfig) -> Vec<String> {
        match self
            .run_playbook(handle, config, &["--list-hosts"], OutputMode::Capture)
            .await
        {
            Ok(output) => parse_host_list(&output.stdout),
            Err(err) => {
                warn!("Could not list playbook hosts: {}", err);
                Vec::new()
            }
        }
    }
}

fn finish(
    stage: &str,
    result: std::result::Result<(), ProcessError>,
    started: Instant,
) -> StageOutcome {
    let duration = started.elapsed();
    let passed = match result {
        Ok(()) => true,
        Err(err) => {
            log_failure(stage, &err);
            false
        }
    };
    StageOutcome {
        passed,
        skipped: false,
        duration,
    }
}

fn log_failure(stage: &str, err: &ProcessError) {
    error!("{} failed: {}", stage, err);
    let stderr = err.stderr().trim();
    if !stderr.is_empty() {
        error!("{}", stderr);
    }
}

fn report_verdict(stage: &str, passed: bool) {
    if passed {
        info!("{}: PASS", stage);
    } else {
        error!("{}: FAIL", stage);
    }
}

/// Extract host names from `--list-hosts` output
pub fn parse_host_list(output: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    let mut header_indent: Option<usize> = None;

    for line in output.lines() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if trimmed.starts_with("hosts (") && trimmed.ends_with("):") {
            header_indent = Some(indent);
            continue;
        }

        match header_indent {
            Some(header) if !trimmed.is_empty() && indent > header => {
                if !hosts.iter().any(|h| h == trimmed) {
                    hosts.push(trimmed.to_string());
                }
            }
            Some(_) => header_indent = None,
            None => {}
        }
    }

    hosts
}

/// Whether a host name refers to the machine running the tool
pub fn is_localhost(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
