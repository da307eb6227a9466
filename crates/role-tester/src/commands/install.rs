//! Install command implementation
//!
//! Implements the `role-tester install` subcommand: install Galaxy requirements into
//! a container that is already running.

use crate::cli::{DistributionOptions, RoleOptions};
use crate::commands::shared::{prepare, GlobalOptions};
use anyhow::{bail, Result};
use role_tester_core::ansible::AnsibleRunner;
use role_tester_core::container::ContainerManager;
use role_tester_core::pipeline::ExitCode;
use tracing::{debug, instrument};

/// Install command arguments
#[derive(Debug, Clone)]
pub struct InstallArgs {
    /// Container name
    pub name: String,
    pub role: RoleOptions,
    pub distribution: DistributionOptions,
    pub global: GlobalOptions,
}

/// Execute the install command
#[instrument(skip(args))]
pub async fn execute_install(args: InstallArgs) -> Result<ExitCode> {
    debug!("Install args: {:?}", args);
    let prepared = prepare(
        Some(args.name),
        &args.role,
        &args.distribution,
        &args.global,
    )?;

    let manager = ContainerManager::new(args.global.executor(), &prepared.toolchain.docker);
    manager.require_running(&prepared.handle).await?;

    let runner = AnsibleRunner::new(&manager, prepared.toolchain.ansible_playbook.clone());
    let outcome = runner
        .install_requirements(&prepared.handle, &prepared.config)
        .await;

    if !outcome.passed && !outcome.skipped {
        bail!(
            "Failed to install requirements into container {}",
            prepared.handle.cid
        );
    }
    Ok(ExitCode::Ok)
}
