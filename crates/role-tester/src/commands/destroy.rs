//! Destroy command implementation
//!
//! Implements the `role-tester destroy` subcommand for stopping and removing a test
//! container. A container that is not running is only reported.

use crate::commands::shared::GlobalOptions;
use anyhow::Result;
use role_tester_core::container::{ContainerHandle, ContainerManager};
use role_tester_core::distribution::{DistributionSelection, DEFAULT_DISTRO, DEFAULT_USER};
use role_tester_core::pipeline::ExitCode;
use role_tester_core::process::Toolchain;
use tracing::{debug, instrument, warn};

/// Destroy command arguments
#[derive(Debug, Clone)]
pub struct DestroyArgs {
    /// Container name
    pub name: String,
    /// Suppress informational output
    pub quiet: bool,
    pub global: GlobalOptions,
}

/// Execute the destroy command
#[instrument(skip(args), fields(cid = %args.name))]
pub async fn execute_destroy(args: DestroyArgs) -> Result<ExitCode> {
    debug!("Destroy args: {:?}", args);

    let toolchain = Toolchain::discover(args.global.docker_path.as_deref(), false)?;
    let record = DistributionSelection::by_name(DEFAULT_USER, DEFAULT_DISTRO).resolve()?;
    let handle = ContainerHandle::new(record, args.name);

    let manager = ContainerManager::new(args.global.executor(), &toolchain.docker);
    if manager.stop(&handle, args.quiet).await {
        warn!("Container {} still exists after removal", handle.cid);
    }
    Ok(ExitCode::Ok)
}
