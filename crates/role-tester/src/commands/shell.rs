//! Shell command implementation
//!
//! Implements the `role-tester shell` subcommand for interactive access to a running
//! test container.

use crate::commands::shared::GlobalOptions;
use anyhow::Result;
use role_tester_core::container::{ContainerHandle, ContainerManager};
use role_tester_core::distribution::{DistributionSelection, DEFAULT_DISTRO, DEFAULT_USER};
use role_tester_core::pipeline::ExitCode;
use role_tester_core::process::{CommandExecutor, Toolchain};
use tracing::{debug, instrument};

/// Shell command arguments
#[derive(Debug, Clone)]
pub struct ShellArgs {
    /// Container name
    pub name: String,
    /// Shell to start inside the container
    pub shell: String,
    pub global: GlobalOptions,
}

/// Execute the shell command
#[instrument(skip(args))]
pub async fn execute_shell(args: ShellArgs) -> Result<ExitCode> {
    debug!("Shell args: {:?}", args);
    let toolchain = Toolchain::discover(args.global.docker_path.as_deref(), false)?;

    // Only the name matters for exec; the record is a placeholder
    let record = DistributionSelection::by_name(DEFAULT_USER, DEFAULT_DISTRO).resolve()?;
    let handle = ContainerHandle::new(record, args.name);

    // No timeout for interactive sessions
    let manager = ContainerManager::new(CommandExecutor::new(), &toolchain.docker);
    manager.shell(&handle, &args.shell).await?;
    Ok(ExitCode::Ok)
}
