//! Container lifecycle
//!
//! Manages the single container an invocation tests against. The state machine is
//! Absent -> Running -> Absent: starting a running container and stopping an absent
//! one are both no-ops that only log.

use crate::config::{RunConfig, EXTRA_ROLES_MOUNT, LIBRARY_MOUNT};
use crate::distribution::DistributionRecord;
use crate::errors::{DockerError, Result};
use crate::process::{OutputMode, ProcessExecutor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// A distribution paired with the name of the container booted from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container name; empty until assigned
    pub cid: String,
    pub distribution: DistributionRecord,
}

impl ContainerHandle {
    pub fn new(distribution: DistributionRecord, cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            distribution,
        }
    }

    /// Assign a timestamp-derived name when none was given
    pub fn ensure_cid(&mut self) -> &str {
        if self.cid.is_empty() {
            self.cid = default_container_name();
            debug!("Container name defaulted to {}", self.cid);
        }
        &self.cid
    }
}

/// Seconds since the epoch, used when no container name is given
pub fn default_container_name() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Arguments for `docker run`; order matters
pub fn run_args(handle: &ContainerHandle, config: &RunConfig) -> Vec<String> {
    let record = &handle.distribution;
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        format!("--name={}", handle.cid),
        format!("--volume={}", record.volume_mount()),
        format!(
            "--volume={}:{}",
            config.host_path.display(),
            config.remote_path
        ),
    ];

    if let Some(extra_roles) = &config.extra_roles {
        args.push(format!(
            "--volume={}:{}",
            extra_roles.display(),
            EXTRA_ROLES_MOUNT
        ));
    }
    if let Some(library) = &config.library {
        args.push(format!("--volume={}:{}", library.display(), LIBRARY_MOUNT));
    }
    if record.privileged {
        args.push("--privileged".to_string());
    }

    args.push(record.image_reference.clone());
    args.push(record.init_command().to_string());
    args
}

/// Drives `docker` for one container
#[derive(Debug)]
pub struct ContainerManager<E> {
    executor: E,
    docker: PathBuf,
}

impl<E: ProcessExecutor> ContainerManager<E> {
    pub fn new(executor: E, docker: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            docker: docker.into(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn docker(&self) -> &Path {
        &self.docker
    }

    /// Run a docker subcommand
    pub async fn docker_exec(
        &self,
        args: Vec<String>,
        mode: OutputMode,
    ) -> std::result::Result<String, crate::errors::ProcessError> {
        self.executor
            .execute(&self.docker, &args, mode)
            .await
            .map(|output| output.stdout)
    }

    /// Whether the named container is running
    ///
    /// Query failures count as "not running".
    #[instrument(skip(self, handle), fields(cid = %handle.cid))]
    pub async fn exists(&self, handle: &ContainerHandle) -> bool {
        if handle.cid.is_empty() {
            return false;
        }

        let args = vec![
            "ps".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            "status=running".to_string(),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];

        match self.docker_exec(args, OutputMode::Capture).await {
            Ok(stdout) => stdout
                .lines()
                .map(|line| line.trim().trim_matches('\''))
                .any(|name| name == handle.cid),
            Err(err) => {
                debug!("docker ps failed, treating container as absent: {}", err);
                false
            }
        }
    }

    /// Whether an image is already available locally
    pub async fn image_present(&self, image: &str) -> bool {
        let args = vec![
            "images".to_string(),
            "--format".to_string(),
            "{{.Repository}}:{{.Tag}}".to_string(),
            image.to_string(),
        ];

        match self.docker_exec(args, OutputMode::Capture).await {
            Ok(stdout) => stdout.lines().any(|line| line.trim() == image),
            Err(_) => false,
        }
    }

    /// Start the container unless it is already running
    ///
    /// Returns whether the container is running afterwards, checked against
    /// `docker ps` rather than the exit status of `docker run`.
    #[instrument(skip(self, handle, config), fields(image = %handle.distribution.image_reference))]
    pub async fn start(&self, handle: &mut ContainerHandle, config: &RunConfig) -> bool {
        handle.ensure_cid();

        if self.exists(handle).await {
            warn!(
                "container {} is already running, skipping the run stage",
                handle.cid
            );
            return true;
        }

        if !self.image_present(&handle.distribution.image_reference).await {
            info!(
                "Image {} is not available locally and will be pulled",
                handle.distribution.image_reference
            );
        }

        info!("Running {}", handle.cid);
        let mode = OutputMode::visible(!config.quiet);
        if let Err(err) = self.docker_exec(run_args(handle, config), mode).await {
            error!("Failed to start container {}: {}", handle.cid, err);
            let stderr = err.stderr().trim();
            if !stderr.is_empty() {
                error!("{}", stderr);
            }
        }

        let running = self.exists(handle).await;
        if !running {
            error!("container {} is not running after docker run", handle.cid);
        }
        running
    }

    /// Stop and remove the container
    ///
    /// Returns the final `exists` check, so `false` means the container is gone.
    /// Failures of `stop` or `rm` are logged and do not abort.
    #[instrument(skip(self, handle), fields(cid = %handle.cid))]
    pub async fn stop(&self, handle: &ContainerHandle, quiet: bool) -> bool {
        if handle.cid.is_empty() {
            error!("{}", DockerError::NameMissing);
            return self.exists(handle).await;
        }

        if !self.exists(handle).await {
            if !quiet {
                warn!(
                    "{}",
                    DockerError::NotRunning {
                        name: handle.cid.clone()
                    }
                );
            }
            return false;
        }

        if !quiet {
            info!("Stopping {}", handle.cid);
        }
        if let Err(err) = self
            .docker_exec(
                vec!["stop".to_string(), handle.cid.clone()],
                OutputMode::Capture,
            )
            .await
        {
            error!("Failed to stop {}: {}", handle.cid, err);
        }

        if !quiet {
            info!("Removing {}", handle.cid);
        }
        if let Err(err) = self
            .docker_exec(
                vec!["rm".to_string(), handle.cid.clone()],
                OutputMode::Capture,
            )
            .await
        {
            error!("Failed to remove {}: {}", handle.cid, err);
        }

        self.exists(handle).await
    }

    /// Fail unless the container is running
    pub async fn require_running(&self, handle: &ContainerHandle) -> Result<()> {
        if handle.cid.is_empty() {
            return Err(DockerError::NameMissing.into());
        }
        if self.exists(handle).await {
            Ok(())
        } else {
            Err(DockerError::NotRunning {
                name: handle.cid.clone(),
            }
            .into())
        }
    }

    /// Open an interactive shell in the container
    #[instrument(skip(self, handle), fields(cid = %handle.cid))]
    pub async fn shell(&self, handle: &ContainerHandle, shell: &str) -> Result<()> {
        self.require_running(handle).await?;

        let args = vec![
            "exec".to_string(),
            "-it".to_string(),
            handle.cid.clone(),
            shell.to_string(),
        ];
        self.docker_exec(args, OutputMode::Interactive).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::DistributionSelection;
    use crate::errors::RoleTesterError;
    use crate::process::mock::MockExecutor;

    fn handle(cid: &str) -> ContainerHandle {
        let record = DistributionSelection::by_name("fubarhouse", "ubuntu1804")
            .resolve()
            .unwrap();
        ContainerHandle::new(record, cid)
    }

    fn config() -> RunConfig {
        let mut config = RunConfig::new("/src/role");
        config.remote_path = "/etc/ansible/roles/role_under_test".to_string();
        config
    }

    #[test]
    fn test_run_args_order() {
        let mut config = config();
        config.extra_roles = Some(PathBuf::from("/src/roles"));
        config.library = Some(PathBuf::from("/src/library"));

        let args = run_args(&handle("web"), &config);
        assert_eq!(
            args,
            vec![
                "run",
                "--detach",
                "--name=web",
                "--volume=/sys/fs/cgroup:/sys/fs/cgroup:ro",
                "--volume=/src/role:/etc/ansible/roles/role_under_test",
                "--volume=/src/roles:/root/.ansible/roles",
                "--volume=/src/library:/root/.ansible/plugins/modules",
                "--privileged",
                "fubarhouse/docker-ansible:bionic",
                "/sbin/init",
            ]
        );
    }

    #[test]
    fn test_ensure_cid_defaults_to_timestamp() {
        let mut h = handle("");
        let cid = h.ensure_cid().to_string();
        assert!(!cid.is_empty());
        assert!(cid.chars().all(|c| c.is_ascii_digit()));

        let mut named = handle("keep");
        assert_eq!(named.ensure_cid(), "keep");
    }

    #[tokio::test]
    async fn test_exists_requires_exact_name() {
        let mock = MockExecutor::new();
        mock.add_running("web-1");
        let manager = ContainerManager::new(&mock, "docker");

        assert!(manager.exists(&handle("web-1")).await);
        assert!(!manager.exists(&handle("web")).await);
        assert!(!manager.exists(&handle("")).await);
    }

    #[tokio::test]
    async fn test_exists_treats_ps_failure_as_absent() {
        let mock = MockExecutor::new();
        mock.add_running("web");
        mock.fail_docker("ps");
        let manager = ContainerManager::new(&mock, "docker");
        assert!(!manager.exists(&handle("web")).await);
    }

    #[tokio::test]
    async fn test_start_twice_creates_once() {
        let mock = MockExecutor::new();
        let manager = ContainerManager::new(&mock, "docker");
        let mut h = handle("web");

        assert!(manager.start(&mut h, &config()).await);
        assert!(manager.start(&mut h, &config()).await);

        let runs: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|c| c.args.first().map(String::as_str) == Some("run"))
            .collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].mode, OutputMode::Stream);
    }

    #[tokio::test]
    async fn test_start_reports_dead_container() {
        let mock = MockExecutor::new();
        mock.run_exits_immediately();
        let manager = ContainerManager::new(&mock, "docker");
        assert!(!manager.start(&mut handle("web"), &config()).await);
    }

    #[tokio::test]
    async fn test_stop_twice_mutates_once() {
        let mock = MockExecutor::new();
        mock.add_running("web");
        let manager = ContainerManager::new(&mock, "docker");
        let h = handle("web");

        assert!(!manager.stop(&h, false).await);
        let first = mock.calls().iter().filter(|c| c.is_docker_mutation()).count();
        assert_eq!(first, 2);

        mock.clear_calls();
        assert!(!manager.stop(&h, false).await);
        assert_eq!(
            mock.calls().iter().filter(|c| c.is_docker_mutation()).count(),
            0
        );
    }

    #[tokio::test]
    async fn test_stop_without_name_makes_no_docker_calls() {
        let mock = MockExecutor::new();
        let manager = ContainerManager::new(&mock, "docker");
        assert!(!manager.stop(&handle(""), false).await);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_continues_after_rm_failure() {
        let mock = MockExecutor::new();
        mock.add_running("web");
        mock.fail_docker("rm");
        let manager = ContainerManager::new(&mock, "docker");

        assert!(!manager.stop(&handle("web"), true).await);
        assert_eq!(mock.calls_matching("docker rm web").len(), 1);
    }

    #[tokio::test]
    async fn test_shell_requires_running_container() {
        let mock = MockExecutor::new();
        let manager = ContainerManager::new(&mock, "docker");
        let err = manager.shell(&handle("web"), "bash").await.unwrap_err();
        assert!(matches!(
            err,
            RoleTesterError::Docker(DockerError::NotRunning { .. })
        ));

        mock.add_running("web");
        manager.shell(&handle("web"), "bash").await.unwrap();
        let exec = mock.calls_matching("docker exec -it web bash");
        assert_eq!(exec.len(), 1);
        assert_eq!(exec[0].mode, OutputMode::Interactive);
    }
}
