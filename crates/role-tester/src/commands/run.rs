//! Run command implementation
//!
//! Implements the `role-tester run` subcommand: boot a container for the role and
//! leave it running.

use crate::cli::{DistributionOptions, RoleOptions};
use crate::commands::shared::{prepare, GlobalOptions};
use anyhow::Result;
use role_tester_core::container::ContainerManager;
use role_tester_core::pipeline::{ExitCode, PipelinePlan, TestPipeline};
use tracing::{debug, instrument};

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Container name
    pub name: String,
    pub role: RoleOptions,
    pub distribution: DistributionOptions,
    pub global: GlobalOptions,
}

/// Execute the run command
#[instrument(skip(args))]
pub async fn execute_run(args: RunArgs) -> Result<ExitCode> {
    debug!("Run args: {:?}", args);
    let mut prepared = prepare(
        Some(args.name),
        &args.role,
        &args.distribution,
        &args.global,
    )?;

    let manager = ContainerManager::new(args.global.executor(), &prepared.toolchain.docker);
    let pipeline = TestPipeline::new(
        &manager,
        prepared.toolchain.ansible_playbook.clone(),
        PipelinePlan::TEST,
    );

    if pipeline
        .ensure_running(&mut prepared.handle, &prepared.config)
        .await
    {
        Ok(ExitCode::Ok)
    } else {
        Ok(ExitCode::DockerRun)
    }
}
