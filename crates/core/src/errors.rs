//! Error types and handling
//!
//! The error taxonomy is structured with one enum per domain (configuration,
//! distribution lookup, Docker, external processes, pipeline, report, git) that are
//! wrapped in the main `RoleTesterError` enum for unified error handling.
//!
//! Stage failures inside the test pipeline are not errors: they are recorded as
//! booleans in the run result. Only pre-flight problems and explicit safety guards
//! surface through these types.

use std::time::Duration;
use thiserror::Error;

/// Configuration and path-mapping errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The mounted directory does not look like an Ansible role
    #[error("Path {path} is not recognized as an Ansible role (expected tasks/main.yml and meta/main.yml)")]
    NotARole { path: String },

    /// A required file could not be found on disk
    #[error("Specified {kind} file {path} does not exist")]
    FileNotFound { kind: &'static str, path: String },

    /// I/O error while inspecting the role source
    #[error("Failed to read role source")]
    Io(#[from] std::io::Error),
}

/// Distribution catalog errors
#[derive(Error, Debug)]
pub enum DistributionError {
    /// Neither the image nor the user/distro pair matched a catalog entry
    #[error("Incompatible distribution: no catalog entry for image {image:?} or user '{user}' with distribution '{distro}'")]
    NotFound {
        image: Option<String>,
        user: String,
        distro: String,
    },

    /// A custom distribution was requested without an image reference
    #[error("A custom distribution requires an image reference (--image)")]
    CustomImageMissing,
}

/// Docker-related errors
#[derive(Error, Debug)]
pub enum DockerError {
    /// A required binary is not installed or not on $PATH
    #[error("executable '{name}' was not found in $PATH")]
    NotInstalled { name: String },

    /// Lifecycle operation attempted without a container name
    #[error("container name was not specified")]
    NameMissing,

    /// Container is expected to be running but is not
    #[error("container {name} is not running")]
    NotRunning { name: String },
}

/// External process errors
///
/// Every variant that follows a successful spawn keeps the captured output so callers
/// can inspect or log partial results.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The child process could not be started
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child process exited with a non-zero status
    #[error("{program} exited with status {code}")]
    NonZeroExit {
        program: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The child process exceeded the configured timeout and was killed
    #[error("{program} timed out after {timeout:?}")]
    TimedOut {
        program: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    /// I/O failure while streaming the child's output
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Standard output captured before the failure, empty when nothing was captured
    pub fn stdout(&self) -> &str {
        match self {
            Self::NonZeroExit { stdout, .. } | Self::TimedOut { stdout, .. } => stdout,
            Self::Spawn { .. } | Self::Io { .. } => "",
        }
    }

    /// Standard error captured before the failure, empty when nothing was captured
    pub fn stderr(&self) -> &str {
        match self {
            Self::NonZeroExit { stderr, .. } | Self::TimedOut { stderr, .. } => stderr,
            Self::Spawn { .. } | Self::Io { .. } => "",
        }
    }
}

/// Pipeline-level errors (safety guards, never stage failures)
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A remote run resolved its inventory to the orchestrating host
    #[error("remote runs must not target localhost (resolved hosts: {})", hosts.join(", "))]
    RemoteLocalhost { hosts: Vec<String> },
}

/// Report generation errors
#[derive(Error, Debug)]
pub enum ReportError {
    /// JSON serialization error
    #[error("Failed to serialize report as JSON")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("Failed to serialize report as YAML")]
    Yaml(#[from] serde_yaml::Error),

    /// Report file I/O error
    #[error("Failed to write report file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Git-related errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Git is not installed or not accessible
    #[error("Git is not installed or not accessible")]
    NotInstalled,

    /// Git CLI command error
    #[error("Git CLI error: {0}")]
    CLIError(String),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum RoleTesterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Distribution lookup errors
    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    /// Docker-related errors
    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    /// External process errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Pipeline guard errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Report errors
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),
}

/// Convenience type alias for Results with RoleTesterError
pub type Result<T> = std::result::Result<T, RoleTesterError>;
