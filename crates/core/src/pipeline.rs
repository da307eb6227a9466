//! Role test pipeline
//!
//! Sequences one role test: ensure the container is running, install requirements,
//! syntax-check, run, re-run for idempotence and tear down. Stage failures are
//! recorded in [`RunResult`] and never abort the sequence, so cleanup always runs.
//! [`ExitCode::decide`] turns the finished result into the process exit code.

use crate::ansible::{is_localhost, AnsibleRunner};
use crate::config::RunConfig;
use crate::container::{ContainerHandle, ContainerManager};
use crate::errors::{PipelineError, Result};
use crate::process::ProcessExecutor;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    /// The container never reached the running state
    DockerRun = 2,
    AnsibleSyntax = 10,
    AnsibleRun = 11,
    AnsibleIdempotence = 12,
    /// The source directory is not an Ansible role
    NotARole = 20,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// First failing stage in the order Docker, syntax, run, idempotence
    pub fn decide(result: &RunResult) -> Self {
        if !result.docker_run {
            Self::DockerRun
        } else if !result.syntax_check {
            Self::AnsibleSyntax
        } else if !result.role_run {
            Self::AnsibleRun
        } else if !result.idempotence {
            Self::AnsibleIdempotence
        } else {
            Self::Ok
        }
    }
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of every pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Container was running after the start stage
    pub docker_run: bool,
    pub requirements_installed: bool,
    pub syntax_check: bool,
    pub role_run: bool,
    #[serde(serialize_with = "as_seconds")]
    pub role_run_duration: Duration,
    pub idempotence: bool,
    #[serde(serialize_with = "as_seconds")]
    pub idempotence_duration: Duration,
    /// Container was gone after teardown
    pub docker_killed: bool,
}

/// Which optional stages a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePlan {
    /// Install Galaxy requirements before testing
    pub install: bool,
    /// Stop and remove the container afterwards
    pub teardown: bool,
}

impl PipelinePlan {
    /// Create, install, test and remove
    pub const FULL: Self = Self {
        install: true,
        teardown: true,
    };

    /// Test and leave the container running for inspection
    pub const TEST: Self = Self {
        install: false,
        teardown: false,
    };
}

/// A finished pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub result: RunResult,
    /// Hosts the playbook targeted
    pub hosts: Vec<String>,
    pub exit_code: ExitCode,
}

/// Orchestrates the stages for one container
pub struct TestPipeline<'a, E> {
    manager: &'a ContainerManager<E>,
    runner: AnsibleRunner<'a, E>,
    plan: PipelinePlan,
}

impl<'a, E: ProcessExecutor> TestPipeline<'a, E> {
    pub fn new(
        manager: &'a ContainerManager<E>,
        ansible_playbook: Option<PathBuf>,
        plan: PipelinePlan,
    ) -> Self {
        Self {
            manager,
            runner: AnsibleRunner::new(manager, ansible_playbook),
            plan,
        }
    }

    pub fn runner(&self) -> &AnsibleRunner<'a, E> {
        &self.runner
    }

    /// Start the container unless it is already running
    pub async fn ensure_running(&self, handle: &mut ContainerHandle, config: &RunConfig) -> bool {
        self.manager
            .start(handle, config)
            .instrument(tracing::info_span!("container.start"))
            .await
    }

    /// Run every stage of the plan
    ///
    /// Errors only for the remote localhost guard, after the plan's cleanup has run.
    pub async fn execute(
        &self,
        handle: &mut ContainerHandle,
        config: &RunConfig,
    ) -> Result<PipelineOutcome> {
        let span = if self.plan.teardown {
            tracing::info_span!("pipeline.full", remote = config.remote)
        } else {
            tracing::info_span!("pipeline.test", remote = config.remote)
        };
        self.execute_stages(handle, config).instrument(span).await
    }

    async fn execute_stages(
        &self,
        handle: &mut ContainerHandle,
        config: &RunConfig,
    ) -> Result<PipelineOutcome> {
        let mut result = RunResult {
            docker_run: self.ensure_running(handle, config).await,
            ..RunResult::default()
        };
        if !result.docker_run {
            error!("Container {} failed to start", handle.cid);
        }

        if self.plan.install {
            let install = self.runner.install_requirements(handle, config).await;
            result.requirements_installed = install.passed;
        }

        // Local runs only list hosts for the report; remote runs also feed the guard
        let hosts = self.runner.list_hosts(handle, config).await;
        if config.remote && hosts.iter().any(|host| is_localhost(host)) {
            error!("remote runs must target the container, not the local machine");
            if self.plan.teardown {
                self.teardown(handle, config, &mut result).await;
            }
            return Err(PipelineError::RemoteLocalhost { hosts }.into());
        }

        result.syntax_check = self.runner.syntax_check(handle, config).await.passed;

        let run = self.runner.run_role(handle, config).await;
        result.role_run = run.passed;
        result.role_run_duration = run.duration;

        let idempotence = self.runner.idempotence_check(handle, config).await;
        result.idempotence = idempotence.passed;
        result.idempotence_duration = idempotence.duration;

        if self.plan.teardown {
            self.teardown(handle, config, &mut result).await;
        } else {
            info!("Leaving container {} running", handle.cid);
        }

        let exit_code = ExitCode::decide(&result);
        if exit_code != ExitCode::Ok {
            warn!("Role test finished with exit code {}", exit_code.code());
        }

        Ok(PipelineOutcome {
            result,
            hosts,
            exit_code,
        })
    }

    async fn teardown(&self, handle: &ContainerHandle, config: &RunConfig, result: &mut RunResult) {
        let still_running = self
            .manager
            .stop(handle, config.quiet)
            .instrument(tracing::info_span!("container.stop"))
            .await;
        result.docker_killed = !still_running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(docker_run: bool, syntax: bool, run: bool, idempotence: bool) -> RunResult {
        RunResult {
            docker_run,
            syntax_check: syntax,
            role_run: run,
            idempotence,
            ..RunResult::default()
        }
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Ok.code(), 0);
        assert_eq!(ExitCode::DockerRun.code(), 2);
        assert_eq!(ExitCode::AnsibleSyntax.code(), 10);
        assert_eq!(ExitCode::AnsibleRun.code(), 11);
        assert_eq!(ExitCode::AnsibleIdempotence.code(), 12);
        assert_eq!(ExitCode::NotARole.code(), 20);
    }

    #[test]
    fn test_exit_code_priority() {
        assert_eq!(
            ExitCode::decide(&result(false, true, true, true)),
            ExitCode::DockerRun
        );
        assert_eq!(
            ExitCode::decide(&result(true, false, true, true)),
            ExitCode::AnsibleSyntax
        );
        assert_eq!(
            ExitCode::decide(&result(true, true, false, false)),
            ExitCode::AnsibleRun
        );
        assert_eq!(
            ExitCode::decide(&result(true, true, true, false)),
            ExitCode::AnsibleIdempotence
        );
        assert_eq!(ExitCode::decide(&result(true, true, true, true)), ExitCode::Ok);
    }

    #[test]
    fn test_exit_code_is_first_failure_for_all_combinations() {
        for mask in 0u8..16 {
            let stages = [mask & 1 != 0, mask & 2 != 0, mask & 4 != 0, mask & 8 != 0];
            let expected = match stages.iter().position(|passed| !passed) {
                Some(0) => ExitCode::DockerRun,
                Some(1) => ExitCode::AnsibleSyntax,
                Some(2) => ExitCode::AnsibleRun,
                Some(_) => ExitCode::AnsibleIdempotence,
                None => ExitCode::Ok,
            };
            let actual = ExitCode::decide(&result(stages[0], stages[1], stages[2], stages[3]));
            assert_eq!(actual, expected, "{:?}", stages);
        }
    }

    #[test]
    fn test_run_result_serializes_seconds() {
        let result = RunResult {
            role_run_duration: Duration::from_millis(1500),
            ..RunResult::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["roleRunDuration"], 1.5);
        assert_eq!(json["dockerRun"], false);
    }
}
