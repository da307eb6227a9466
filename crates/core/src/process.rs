//! External process execution
//!
//! Every Docker, Ansible and git invocation goes through the [`ProcessExecutor`]
//! trait. The CLI-backed [`CommandExecutor`] always captures standard output, can
//! echo it live, and enforces an optional per-command timeout. No retries: a failed
//! command is reported to the caller, who decides whether it matters.

use crate::errors::{DockerError, ProcessError, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Environment variable naming the docker binary when `--docker-path` is not given
pub const DOCKER_ENV: &str = "ROLE_TESTER_DOCKER";

/// Environment variable holding the per-command timeout in seconds
pub const TIMEOUT_ENV: &str = "ROLE_TESTER_COMMAND_TIMEOUT";

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture stdout silently, stdin closed
    Capture,
    /// Capture stdout and echo stdout/stderr live, stdin inherited
    Stream,
    /// Inherit every stream for interactive use; nothing is captured
    Interactive,
}

impl OutputMode {
    /// Stream when output should be visible, capture otherwise
    pub fn visible(visible: bool) -> Self {
        if visible {
            Self::Stream
        } else {
            Self::Capture
        }
    }
}

/// Output of a successful process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Process execution abstraction
#[allow(async_fn_in_trait)]
pub trait ProcessExecutor {
    /// Run `program` with `args` to completion.
    ///
    /// Returns the captured output on a zero exit status. A non-zero exit, a launch
    /// failure or a timeout yields a [`ProcessError`] that still carries whatever
    /// output was captured.
    async fn execute(
        &self,
        program: &Path,
        args: &[String],
        mode: OutputMode,
    ) -> std::result::Result<ProcessOutput, ProcessError>;
}

impl<T: ProcessExecutor> ProcessExecutor for &T {
    async fn execute(
        &self,
        program: &Path,
        args: &[String],
        mode: OutputMode,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        (*self).execute(program, args, mode).await
    }
}

/// Render a command line for logs
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.display().to_string());
    parts.extend(args.iter().cloned());
    shell_words::join(parts)
}

/// Executor backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    timeout: Option<Duration>,
}

impl CommandExecutor {
    /// Create an executor without a timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor that kills commands running longer than `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Resolve the per-command timeout
    ///
    /// Precedence: CLI flag > ROLE_TESTER_COMMAND_TIMEOUT env var > no timeout
    pub fn detect_timeout(cli_seconds: Option<u64>) -> Option<Duration> {
        if let Some(seconds) = cli_seconds {
            return Some(Duration::from_secs(seconds));
        }

        std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    async fn run_interactive(
        &self,
        program: &Path,
        args: &[String],
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        let name = program.display().to_string();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: name.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        match waited {
            Some(status) => {
                let status = status.map_err(|source| ProcessError::Io {
                    program: name.clone(),
                    source,
                })?;
                check_status(&name, status, ProcessOutput::default())
            }
            None => {
                let _ = child.kill().await;
                Err(ProcessError::TimedOut {
                    program: name,
                    timeout: self.timeout.unwrap_or_default(),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }
    }

    async fn run_piped(
        &self,
        program: &Path,
        args: &[String],
        echo: bool,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        let name = program.display().to_string();
        let mut child = Command::new(program)
            .args(args)
            .stdin(if echo { Stdio::inherit() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: name.clone(),
                source,
            })?;

        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let mut stdout = String::new();
        let mut stderr = String::new();

        // Buffers are borrowed by the draining future so partial output survives a timeout.
        let waited = {
            let drain = async {
                let (out, err) = tokio::join!(
                    pump(child_stdout, &mut stdout, echo.then_some(Echo::Stdout)),
                    pump(child_stderr, &mut stderr, echo.then_some(Echo::Stderr)),
                );
                out?;
                err?;
                child.wait().await
            };

            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, drain).await.ok(),
                None => Some(drain.await),
            }
        };

        match waited {
            Some(status) => {
                let status = status.map_err(|source| ProcessError::Io {
                    program: name.clone(),
                    source,
                })?;
                check_status(&name, status, ProcessOutput { stdout, stderr })
            }
            None => {
                let _ = child.kill().await;
                Err(ProcessError::TimedOut {
                    program: name,
                    timeout: self.timeout.unwrap_or_default(),
                    stdout,
                    stderr,
                })
            }
        }
    }
}

impl ProcessExecutor for CommandExecutor {
    #[instrument(skip(self, args), fields(command = %display_command(program, args)))]
    async fn execute(
        &self,
        program: &Path,
        args: &[String],
        mode: OutputMode,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        debug!("Executing {:?}", mode);

        match mode {
            OutputMode::Interactive => self.run_interactive(program, args).await,
            OutputMode::Stream => self.run_piped(program, args, true).await,
            OutputMode::Capture => self.run_piped(program, args, false).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Echo {
    Stdout,
    Stderr,
}

/// Drain a child stream into `buf`, optionally echoing each line to our own stream
async fn pump<R>(reader: Option<R>, buf: &mut String, echo: Option<Echo>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        match echo {
            Some(Echo::Stdout) => {
                let mut out = tokio::io::stdout();
                out.write_all(&line).await?;
                out.flush().await?;
            }
            Some(Echo::Stderr) => {
                let mut err = tokio::io::stderr();
                err.write_all(&line).await?;
                err.flush().await?;
            }
            None => {}
        }

        buf.push_str(&String::from_utf8_lossy(&line));
    }

    Ok(())
}

fn check_status(
    program: &str,
    status: ExitStatus,
    output: ProcessOutput,
) -> std::result::Result<ProcessOutput, ProcessError> {
    if status.success() {
        Ok(output)
    } else {
        Err(ProcessError::NonZeroExit {
            program: program.to_string(),
            code: status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Locate an executable: explicit paths are checked directly, bare names are
/// searched on `$PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|full| full.is_file())
}

/// Paths of the external binaries the pipeline drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// docker CLI
    pub docker: PathBuf,
    /// ansible-playbook on the host, only needed for remote runs
    pub ansible_playbook: Option<PathBuf>,
}

impl Toolchain {
    /// Resolve the binaries needed for this invocation
    ///
    /// The docker binary comes from the CLI flag, then `ROLE_TESTER_DOCKER`, then
    /// `docker` on `$PATH`; it is always required. `ansible-playbook` is looked up on
    /// `$PATH` and is required only when `remote` is set.
    pub fn discover(docker: Option<&str>, remote: bool) -> Result<Self> {
        let env_docker = std::env::var(DOCKER_ENV).ok();
        let docker_name = docker.or(env_docker.as_deref()).unwrap_or("docker");

        let docker = find_executable(docker_name).ok_or_else(|| DockerError::NotInstalled {
            name: docker_name.to_string(),
        })?;

        let ansible_playbook = find_executable("ansible-playbook");
        if remote && ansible_playbook.is_none() {
            return Err(DockerError::NotInstalled {
                name: "ansible-playbook".to_string(),
            }
            .into());
        }

        debug!(
            "Resolved toolchain: docker={} ansible-playbook={:?}",
            docker.display(),
            ansible_playbook
        );

        Ok(Self {
            docker,
            ansible_playbook,
        })
    }
}

pub mod mock {
    //! Scriptable process executor for testing pipelines without Docker
    //!
    //! `MockExecutor` keeps a simulated set of running containers so that
    //! `docker ps`, `docker run`, `docker stop` and `docker rm` behave like the real
    //! CLI. Every other invocation (`docker exec`, `ansible-playbook`, `git`) is
    //! answered from queued responses matched by substring against the rendered
    //! command line. Every call is recorded for verification.

    use super::{OutputMode, ProcessExecutor, ProcessOutput};
    use crate::errors::ProcessError;
    use std::collections::{BTreeSet, HashSet};
    use std::path::Path;
    use std::sync::Mutex;

    /// Canned response for a matched invocation
    #[derive(Debug, Clone)]
    pub struct MockResponse {
        /// Captured standard output
        pub stdout: String,
        /// Whether the command exits zero
        pub success: bool,
    }

    impl MockResponse {
        /// Zero exit with the given output
        pub fn ok(stdout: impl Into<String>) -> Self {
            Self {
                stdout: stdout.into(),
                success: true,
            }
        }

        /// Non-zero exit with the given output
        pub fn fail(stdout: impl Into<String>) -> Self {
            Self {
                stdout: stdout.into(),
                success: false,
            }
        }
    }

    /// A recorded invocation
    #[derive(Debug, Clone)]
    pub struct MockCall {
        /// Program file name (e.g. `docker`)
        pub program: String,
        /// Arguments passed
        pub args: Vec<String>,
        /// Output mode requested
        pub mode: OutputMode,
    }

    impl MockCall {
        /// Program and arguments joined by spaces
        pub fn command_line(&self) -> String {
            let mut line = self.program.clone();
            for arg in &self.args {
                line.push(' ');
                line.push_str(arg);
            }
            line
        }

        /// Whether this call mutates docker container state
        pub fn is_docker_mutation(&self) -> bool {
            self.program == "docker"
                && matches!(
                    self.args.first().map(String::as_str),
                    Some("run" | "stop" | "rm")
                )
        }
    }

    #[derive(Debug, Default)]
    struct MockState {
        running: BTreeSet<String>,
        images: BTreeSet<String>,
        failing_docker: HashSet<String>,
        run_exits_immediately: bool,
        responses: Vec<(String, Vec<MockResponse>)>,
        calls: Vec<MockCall>,
    }

    /// Mock executor simulating docker container state
    #[derive(Debug, Default)]
    pub struct MockExecutor {
        state: Mutex<MockState>,
    }

    impl MockExecutor {
        /// Create an executor with no containers and no scripted responses
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark a container as already running
        pub fn add_running(&self, name: &str) {
            self.state.lock().unwrap().running.insert(name.to_string());
        }

        /// Whether the simulated container is running
        pub fn is_running(&self, name: &str) -> bool {
            self.state.lock().unwrap().running.contains(name)
        }

        /// Make `docker images` list this reference
        pub fn add_image(&self, reference: &str) {
            self.state.lock().unwrap().images.insert(reference.to_string());
        }

        /// Make a docker subcommand (`run`, `stop`, `rm`, `ps`) exit non-zero
        pub fn fail_docker(&self, subcommand: &str) {
            self.state
                .lock()
                .unwrap()
                .failing_docker
                .insert(subcommand.to_string());
        }

        /// `docker run` exits zero but the container dies right away
        pub fn run_exits_immediately(&self) {
            self.state.lock().unwrap().run_exits_immediately = true;
        }

        /// Queue a response for invocations whose command line contains `needle`.
        ///
        /// Responses queued for the same needle are consumed in order; the last one
        /// keeps answering once the others are used up. Needles are tried in the
        /// order they were first registered.
        pub fn push_response(&self, needle: &str, response: MockResponse) {
            let mut state = self.state.lock().unwrap();
            if let Some((_, queue)) = state.responses.iter_mut().find(|(n, _)| n == needle) {
                queue.push(response);
            } else {
                state.responses.push((needle.to_string(), vec![response]));
            }
        }

        /// Every invocation made so far
        pub fn calls(&self) -> Vec<MockCall> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Invocations whose command line contains `needle`
        pub fn calls_matching(&self, needle: &str) -> Vec<MockCall> {
            self.calls()
                .into_iter()
                .filter(|call| call.command_line().contains(needle))
                .collect()
        }

        /// Forget recorded invocations
        pub fn clear_calls(&self) {
            self.state.lock().unwrap().calls.clear();
        }

        fn docker_builtin(state: &mut MockState, args: &[String]) -> Option<MockResponse> {
            let subcommand = args.first()?.as_str();
            if !matches!(subcommand, "ps" | "run" | "stop" | "rm" | "images") {
                return None;
            }

            if state.failing_docker.contains(subcommand) {
                return Some(MockResponse::fail(""));
            }

            let response = match subcommand {
                "ps" => {
                    let names: Vec<&str> = state.running.iter().map(String::as_str).collect();
                    MockResponse::ok(names.join("\n"))
                }
                "run" => {
                    let name = args
                        .iter()
                        .find_map(|arg| arg.strip_prefix("--name="))
                        .unwrap_or_default()
                        .to_string();
                    if !state.run_exits_immediately && !name.is_empty() {
                        state.running.insert(name.clone());
                    }
                    MockResponse::ok(format!("{}\n", name))
                }
                "stop" => {
                    let name = args.last().cloned().unwrap_or_default();
                    if state.running.remove(&name) {
                        MockResponse::ok(format!("{}\n", name))
                    } else {
                        MockResponse::fail("")
                    }
                }
                "rm" => MockResponse::ok(format!("{}\n", args.last().cloned().unwrap_or_default())),
                _ => {
                    let reference = args.last().cloned().unwrap_or_default();
                    if state.images.contains(&reference) {
                        MockResponse::ok(format!("{}\n", reference))
                    } else {
                        MockResponse::ok("")
                    }
                }
            };
            Some(response)
        }

        fn scripted(state: &mut MockState, line: &str) -> MockResponse {
            for (needle, queue) in state.responses.iter_mut() {
                if line.contains(needle.as_str()) {
                    return if queue.len() > 1 {
                        queue.remove(0)
                    } else {
                        queue[0].clone()
                    };
                }
            }
            MockResponse::ok("")
        }
    }

    impl ProcessExecutor for MockExecutor {
        async fn execute(
            &self,
            program: &Path,
            args: &[String],
            mode: OutputMode,
        ) -> std::result::Result<ProcessOutput, ProcessError> {
            let program_name = program
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();

            let call = MockCall {
                program: program_name.clone(),
                args: args.to_vec(),
                mode,
            };
            let line = call.command_line();

            let response = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(call);

                let builtin = if program_name == "docker" {
                    Self::docker_builtin(&mut state, args)
                } else {
                    None
                };
                builtin.unwrap_or_else(|| Self::scripted(&mut state, &line))
            };

            if response.success {
                Ok(ProcessOutput {
                    stdout: response.stdout,
                    stderr: String::new(),
                })
            } else {
                Err(ProcessError::NonZeroExit {
                    program: program_name,
                    code: 1,
                    stdout: response.stdout,
                    stderr: String::new(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockExecutor, MockResponse};
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_display_command_quotes_arguments() {
        let rendered = display_command(Path::new("docker"), &args(&["exec", "a b"]));
        assert_eq!(rendered, "docker exec 'a b'");
    }

    #[test]
    fn test_detect_timeout_prefers_cli() {
        assert_eq!(
            CommandExecutor::detect_timeout(Some(30)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_output_mode_visible() {
        assert_eq!(OutputMode::visible(true), OutputMode::Stream);
        assert_eq!(OutputMode::visible(false), OutputMode::Capture);
    }

    #[test]
    fn test_find_executable_missing_explicit_path() {
        assert!(find_executable("/definitely/not/here/docker").is_none());
    }

    #[test]
    fn test_toolchain_missing_docker_is_fatal() {
        let err = Toolchain::discover(Some("/definitely/not/here/docker"), false).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here/docker"));
    }

    #[test]
    fn test_toolchain_accepts_explicit_docker_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let docker = dir.path().join("docker");
        std::fs::write(&docker, "").unwrap();

        let toolchain = Toolchain::discover(docker.to_str(), false).unwrap();
        assert_eq!(toolchain.docker, docker);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_captures_stdout() {
        let executor = CommandExecutor::new();
        let output = executor
            .execute(
                Path::new("sh"),
                &args(&["-c", "echo recap; echo noise >&2"]),
                OutputMode::Capture,
            )
            .await
            .unwrap();
        assert_eq!(output.stdout, "recap\n");
        assert_eq!(output.stderr, "noise\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_keeps_output_on_failure() {
        let executor = CommandExecutor::new();
        let err = executor
            .execute(
                Path::new("sh"),
                &args(&["-c", "echo partial; exit 3"]),
                OutputMode::Capture,
            )
            .await
            .unwrap_err();
        match err {
            ProcessError::NonZeroExit { code, stdout, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stdout, "partial\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_times_out_with_partial_output() {
        let executor = CommandExecutor::with_timeout(Some(Duration::from_millis(300)));
        let err = executor
            .execute(
                Path::new("sh"),
                &args(&["-c", "echo started; sleep 5"]),
                OutputMode::Capture,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert_eq!(err.stdout(), "started\n");
    }

    #[tokio::test]
    async fn test_command_executor_spawn_failure() {
        let executor = CommandExecutor::new();
        let err = executor
            .execute(
                Path::new("/definitely/not/here/binary"),
                &[],
                OutputMode::Capture,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_mock_tracks_container_state() {
        let mock = MockExecutor::new();
        let docker = Path::new("/usr/bin/docker");

        mock.execute(docker, &args(&["run", "--detach", "--name=web"]), OutputMode::Capture)
            .await
            .unwrap();
        let ps = mock
            .execute(docker, &args(&["ps"]), OutputMode::Capture)
            .await
            .unwrap();
        assert_eq!(ps.stdout, "web");

        mock.execute(docker, &args(&["stop", "web"]), OutputMode::Capture)
            .await
            .unwrap();
        assert!(!mock.is_running("web"));
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_response_queue_is_sticky() {
        let mock = MockExecutor::new();
        mock.push_response("ansible-playbook", MockResponse::ok("first"));
        mock.push_response("ansible-playbook", MockResponse::fail("second"));

        let program = Path::new("ansible-playbook");
        let first = mock.execute(program, &[], OutputMode::Capture).await.unwrap();
        assert_eq!(first.stdout, "first");

        for _ in 0..2 {
            let err = mock
                .execute(program, &[], OutputMode::Capture)
                .await
                .unwrap_err();
            assert_eq!(err.stdout(), "second");
        }
    }
}
