use crate::commands::shared::GlobalOptions;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use role_tester_core::config::DEFAULT_PLAYBOOK;
use role_tester_core::distribution::{DEFAULT_DISTRO, DEFAULT_INIT, DEFAULT_USER, DEFAULT_VOLUME};
use role_tester_core::pipeline::ExitCode;
use role_tester_core::report::DEFAULT_REPORT_FILE;
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Where the role comes from and how Ansible sees it
#[derive(Debug, Clone, Args)]
pub struct RoleOptions {
    /// Location of the role to test (defaults to the current directory)
    #[arg(short = 's', long)]
    pub source: Option<PathBuf>,
    /// Location which the role will be mounted to
    #[arg(short = 'd', long)]
    pub destination: Option<String>,
    /// Path to requirements file
    #[arg(short = 'r', long)]
    pub requirements: Option<String>,
    /// Path to the test playbook
    #[arg(short = 'p', long, default_value = DEFAULT_PLAYBOOK)]
    pub playbook: String,
    /// Inventory file or inline host list
    #[arg(short = 'e', long)]
    pub inventory: Option<String>,
    /// Path to roles folder with dependencies
    #[arg(short = 'x', long)]
    pub extra_roles: Option<PathBuf>,
    /// Path to library folder with modules
    #[arg(long)]
    pub library: Option<PathBuf>,
    /// Run ansible-playbook on this host against the container
    #[arg(short = 'm', long)]
    pub remote: bool,
    /// Enable quiet mode
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Enable verbose mode for Ansible commands
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Which image to boot
#[derive(Debug, Clone, Args)]
pub struct DistributionOptions {
    /// The image reference to use
    #[arg(short = 'i', long)]
    pub image: Option<String>,
    /// Choose a compatible image from this user
    #[arg(short = 'u', long, default_value = DEFAULT_USER)]
    pub user: String,
    /// Choose a compatible image of this distribution
    #[arg(short = 't', long, default_value = DEFAULT_DISTRO)]
    pub distribution: String,
    /// Provide a custom distribution instead of a catalog entry
    #[arg(short = 'c', long)]
    pub custom: bool,
    /// The init command for a custom image
    #[arg(short = 'a', long, default_value = DEFAULT_INIT)]
    pub initialise: String,
    /// The volume argument for a custom image
    #[arg(short = 'l', long, default_value = DEFAULT_VOLUME)]
    pub volume: String,
}

/// Report output
#[derive(Debug, Clone, Args)]
pub struct ReportOptions {
    /// Print a report after completion
    #[arg(short = 'f', long)]
    pub report: bool,
    /// File to write the report to (.yml, .yaml or .json)
    #[arg(short = 'b', long, default_value = DEFAULT_REPORT_FILE)]
    pub report_output: PathBuf,
}

/// Role tester subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a container for the role
    Run {
        /// Name of the container
        #[arg(short = 'n', long)]
        name: String,
        #[command(flatten)]
        role: RoleOptions,
        #[command(flatten)]
        distribution: DistributionOptions,
    },
    /// Install role requirements into a running container
    Install {
        /// Name of the container
        #[arg(short = 'n', long)]
        name: String,
        #[command(flatten)]
        role: RoleOptions,
        #[command(flatten)]
        distribution: DistributionOptions,
    },
    /// Syntax-check, run and idempotence-test the role, leaving the container running
    Test {
        /// Name of the container
        #[arg(short = 'n', long)]
        name: String,
        #[command(flatten)]
        role: RoleOptions,
        #[command(flatten)]
        distribution: DistributionOptions,
        #[command(flatten)]
        report: ReportOptions,
    },
    /// Complete end-to-end test: run, install, syntax, run, idempotence, destroy
    #[command(long_about = "Complete end-to-end test process\n\n\
        Creates a container, installs the requirements file, checks the role syntax, runs \
        the role, runs it again to test idempotence and removes the container.\n\n\
        Exit codes: 0 success, 2 container failed to run, 10 syntax check failed, \
        11 role run failed, 12 idempotence check failed, 20 source is not a role.")]
    Full {
        /// Name of the container (defaults to the current timestamp)
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[command(flatten)]
        role: RoleOptions,
        #[command(flatten)]
        distribution: DistributionOptions,
        #[command(flatten)]
        report: ReportOptions,
    },
    /// Open an interactive shell in a running container
    Shell {
        /// Name of the container
        #[arg(short = 'n', long)]
        name: String,
        /// Shell to start
        #[arg(long, default_value = "bash")]
        shell: String,
    },
    /// Stop and remove a container
    Destroy {
        /// Name of the container
        #[arg(short = 'n', long)]
        name: String,
        /// Enable quiet mode
        #[arg(short = 'q', long)]
        quiet: bool,
    },
    /// List the built-in distributions
    Distributions,
}

impl Commands {
    fn quiet(&self) -> bool {
        match self {
            Commands::Run { role, .. }
            | Commands::Install { role, .. }
            | Commands::Test { role, .. }
            | Commands::Full { role, .. } => role.quiet,
            Commands::Destroy { quiet, .. } => *quiet,
            Commands::Shell { .. } | Commands::Distributions => false,
        }
    }
}

/// Ansible role tester
#[derive(Debug, Parser)]
#[command(name = "role-tester")]
#[command(about = "Test Ansible roles inside Docker containers")]
#[command(version)]
pub struct Cli {
    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Path to the docker executable.
    ///
    /// Precedence: CLI flag > ROLE_TESTER_DOCKER environment variable > `docker` on $PATH.
    #[arg(long, global = true)]
    pub docker_path: Option<String>,

    /// Kill external commands running longer than this many seconds.
    ///
    /// Precedence: CLI flag > ROLE_TESTER_COMMAND_TIMEOUT environment variable > no limit.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub command_timeout: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Initialize logging and run the selected subcommand
    ///
    /// Returns the exit code chosen by the command; fatal pre-flight problems are
    /// returned as errors.
    pub async fn dispatch(self) -> Result<ExitCode> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };

        let log_level = if self.command.quiet() {
            "error"
        } else {
            self.log_level.as_str()
        };

        if std::env::var_os(role_tester_core::logging::LOG_FILTER_ENV).is_none()
            && std::env::var_os("RUST_LOG").is_none()
        {
            std::env::set_var(
                "RUST_LOG",
                format!("role_tester={},role_tester_core={}", log_level, log_level),
            );
        }
        role_tester_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let global = GlobalOptions {
            docker_path: self.docker_path,
            command_timeout: self.command_timeout,
        };

        match self.command {
            Commands::Run {
                name,
                role,
                distribution,
            } => {
                use crate::commands::run::{execute_run, RunArgs};
                execute_run(RunArgs {
                    name,
                    role,
                    distribution,
                    global,
                })
                .await
            }
            Commands::Install {
                name,
                role,
                distribution,
            } => {
                use crate::commands::install::{execute_install, InstallArgs};
                execute_install(InstallArgs {
                    name,
                    role,
                    distribution,
                    global,
                })
                .await
            }
            Commands::Test {
                name,
                role,
                distribution,
                report,
            } => {
                use crate::commands::test::{execute_test, TestArgs};
                execute_test(TestArgs {
                    name,
                    role,
                    distribution,
                    report,
                    global,
                })
                .await
            }
            Commands::Full {
                name,
                role,
                distribution,
                report,
            } => {
                use crate::commands::full::{execute_full, FullArgs};
                execute_full(FullArgs {
                    name,
                    role,
                    distribution,
                    report,
                    global,
                })
                .await
            }
            Commands::Shell { name, shell } => {
                use crate::commands::shell::{execute_shell, ShellArgs};
                execute_shell(ShellArgs {
                    name,
                    shell,
                    global,
                })
                .await
            }
            Commands::Destroy { name, quiet } => {
                use crate::commands::destroy::{execute_destroy, DestroyArgs};
                execute_destroy(DestroyArgs {
                    name,
                    quiet,
                    global,
                })
                .await
            }
            Commands::Distributions => {
                crate::commands::distributions::execute_distributions();
                Ok(ExitCode::Ok)
            }
        }
    }
}
