//! Full command implementation
//!
//! Implements the `role-tester full` subcommand, the complete end-to-end test: run the
//! container, install requirements, check syntax, run the role, run it again to check
//! idempotence and remove the container.

use crate::cli::{DistributionOptions, ReportOptions, RoleOptions};
use crate::commands::shared::{prepare, publish_report, GlobalOptions};
use anyhow::Result;
use role_tester_core::container::ContainerManager;
use role_tester_core::pipeline::{ExitCode, PipelinePlan, TestPipeline};
use tracing::{debug, info, instrument, warn};

/// Full command arguments
#[derive(Debug, Clone)]
pub struct FullArgs {
    /// Container name; a timestamp when absent
    pub name: Option<String>,
    pub role: RoleOptions,
    pub distribution: DistributionOptions,
    pub report: ReportOptions,
    pub global: GlobalOptions,
}

/// Execute the full command
#[instrument(skip(args))]
pub async fn execute_full(args: FullArgs) -> Result<ExitCode> {
    debug!("Full args: {:?}", args);
    let mut prepared = prepare(args.name, &args.role, &args.distribution, &args.global)?;

    let executor = args.global.executor();
    let manager = ContainerManager::new(&executor, &prepared.toolchain.docker);
    let pipeline = TestPipeline::new(
        &manager,
        prepared.toolchain.ansible_playbook.clone(),
        PipelinePlan::FULL,
    );

    let outcome = pipeline
        .execute(&mut prepared.handle, &prepared.config)
        .await?;
    if !outcome.result.docker_killed {
        warn!(
            "Container {} could not be removed, remove it with `role-tester destroy -n {}`",
            prepared.handle.cid, prepared.handle.cid
        );
    }

    publish_report(&executor, &args.report, &prepared, &outcome).await;

    if outcome.exit_code == ExitCode::Ok {
        info!("Role test passed");
    }
    Ok(outcome.exit_code)
}
