//! Pre-flight checks shared by the role commands
//!
//! Everything that must hold before a container is touched: the distribution
//! resolves, the source is an Ansible role, the binaries exist and every configured
//! path maps onto the container. Each failure here is fatal.

use crate::cli::{DistributionOptions, RoleOptions};
use anyhow::Result;
use role_tester_core::config::{PathMapper, RunConfig};
use role_tester_core::container::ContainerHandle;
use role_tester_core::distribution::{DistributionBuilder, DistributionSelection};
use role_tester_core::errors::ConfigError;
use role_tester_core::process::{CommandExecutor, Toolchain};
use tracing::{debug, instrument};

/// Global flags every command receives
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Path to docker executable
    pub docker_path: Option<String>,
    /// Per-command timeout in seconds
    pub command_timeout: Option<u64>,
}

impl GlobalOptions {
    /// Executor honoring `--command-timeout` and `ROLE_TESTER_COMMAND_TIMEOUT`
    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::with_timeout(CommandExecutor::detect_timeout(self.command_timeout))
    }
}

/// Result of a successful pre-flight
#[derive(Debug, Clone)]
pub struct Prepared {
    pub toolchain: Toolchain,
    pub config: RunConfig,
    pub handle: ContainerHandle,
}

/// Distribution selection from the command line
pub fn selection_from(options: &DistributionOptions) -> DistributionSelection {
    let custom = options.custom.then(|| {
        let mut builder = DistributionBuilder::new()
            .init_command(options.initialise.clone())
            .volume_mount(options.volume.clone());
        if let Some(image) = &options.image {
            builder = builder.image(image.clone());
        }
        builder
    });

    DistributionSelection {
        image: options.image.clone(),
        user: options.user.clone(),
        distro: options.distribution.clone(),
        custom,
    }
}

fn run_config(role: &RoleOptions) -> Result<RunConfig> {
    let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
    let host_path = match &role.source {
        Some(source) => cwd.join(source),
        None => cwd,
    };

    let mut config = RunConfig::new(host_path);
    config.remote_path = role.destination.clone().unwrap_or_default();
    config.inventory = role.inventory.clone();
    config.extra_roles = role.extra_roles.clone();
    config.library = role.library.clone();
    config.requirements = role.requirements.clone();
    config.playbook = role.playbook.clone();
    config.verbose = role.verbose;
    config.remote = role.remote;
    config.quiet = role.quiet;
    Ok(config)
}

/// Run every pre-flight check in order
///
/// Distribution, role check, toolchain and path mapping; the first failure wins.
/// An empty `name` is replaced by a timestamp before paths are mapped.
#[instrument(skip_all)]
pub fn prepare(
    name: Option<String>,
    role: &RoleOptions,
    distribution: &DistributionOptions,
    global: &GlobalOptions,
) -> Result<Prepared> {
    let record = selection_from(distribution).resolve()?;
    debug!("Using distribution {} ({})", record.name, record.image_reference);

    let mut config = run_config(role)?;
    config.ensure_ansible_role()?;

    let toolchain = Toolchain::discover(global.docker_path.as_deref(), config.remote)?;

    let mut handle = ContainerHandle::new(record, name.unwrap_or_default());
    handle.ensure_cid();

    PathMapper::from_current_dir()?.map_all(&handle.cid, &mut config)?;
    debug!("Resolved configuration: {:?}", config);

    Ok(Prepared {
        toolchain,
        config,
        handle,
    })
}
