//! Run configuration and path mapping
//!
//! [`RunConfig`] is built once from CLI flags. [`PathMapper`] then rewrites its
//! playbook, requirements and inventory fields in place so they are valid where
//! Ansible runs: inside the container for local runs, on the host for remote runs.
//!
//! Resolution rules for a user-supplied path:
//! - absolute paths are kept as given
//! - `./`-prefixed paths are relative to the current working directory
//! - any other relative path is relative to the role source directory
//!
//! For local runs, a resolved host path under the role source directory is then
//! translated to the same relative location under the container mount point.

use crate::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mount point of the role inside the container for local runs
pub const DEFAULT_REMOTE_PATH: &str = "/etc/ansible/roles/role_under_test";

/// Playbook used when none is given
pub const DEFAULT_PLAYBOOK: &str = "tests/playbook.yml";

/// Container directory receiving `--extra-roles`
pub const EXTRA_ROLES_MOUNT: &str = "/root/.ansible/roles";

/// Container directory receiving `--library`
pub const LIBRARY_MOUNT: &str = "/root/.ansible/plugins/modules";

const PLAYBOOK_FILE_NAME: &str = "playbook.yml";

/// Per-invocation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Role source directory on the host
    pub host_path: PathBuf,
    /// Where the role is mounted in the container; empty until mapped
    pub remote_path: String,
    /// Inventory file or inline host list
    pub inventory: Option<String>,
    /// Host directory of additional roles
    pub extra_roles: Option<PathBuf>,
    /// Host directory of additional modules
    pub library: Option<PathBuf>,
    /// Galaxy requirements file
    pub requirements: Option<String>,
    /// Test playbook
    pub playbook: String,
    pub verbose: bool,
    /// Run `ansible-playbook` on the host against the container
    pub remote: bool,
    pub quiet: bool,
}

impl RunConfig {
    /// Configuration with defaults for the given role source
    pub fn new(host_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            remote_path: String::new(),
            inventory: None,
            extra_roles: None,
            library: None,
            requirements: None,
            playbook: DEFAULT_PLAYBOOK.to_string(),
            verbose: false,
            remote: false,
            quiet: false,
        }
    }

    /// Whether the role source directory looks like an Ansible role
    pub fn is_ansible_role(&self) -> bool {
        is_ansible_role(&self.host_path)
    }

    /// Fail with [`ConfigError::NotARole`] unless the source is a role
    pub fn ensure_ansible_role(&self) -> Result<()> {
        if self.is_ansible_role() {
            Ok(())
        } else {
            Err(ConfigError::NotARole {
                path: self.host_path.display().to_string(),
            }
            .into())
        }
    }
}

/// A role has both `tasks/main.yml` and `meta/main.yml`
pub fn is_ansible_role(path: &Path) -> bool {
    path.join("tasks").join("main.yml").is_file() && path.join("meta").join("main.yml").is_file()
}

/// Rewrites [`RunConfig`] paths relative to a working directory
#[derive(Debug, Clone)]
pub struct PathMapper {
    cwd: PathBuf,
}

impl PathMapper {
    /// Mapper resolving `./` paths against `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    /// Mapper for the process working directory
    pub fn from_current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir().map_err(ConfigError::Io)?))
    }

    /// Fill in the mount point when it was not given
    pub fn map_remote_path(&self, config: &mut RunConfig) {
        if config.remote_path.is_empty() {
            config.remote_path = if config.remote {
                config.host_path.display().to_string()
            } else {
                DEFAULT_REMOTE_PATH.to_string()
            };
            debug!("Remote path defaulted to {}", config.remote_path);
        }
    }

    /// Resolve a user-supplied path on the host
    pub fn resolve_host(&self, input: &str, host_path: &Path) -> PathBuf {
        let path = Path::new(input);
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(rest) = input.strip_prefix("./") {
            self.cwd.join(rest)
        } else {
            host_path.join(path)
        }
    }

    /// Translate a resolved host path to where Ansible will see it
    pub fn to_target(&self, host: &Path, config: &RunConfig) -> String {
        if config.remote {
            return host.display().to_string();
        }

        match host.strip_prefix(&config.host_path) {
            Ok(relative) => Path::new(&config.remote_path)
                .join(relative)
                .display()
                .to_string(),
            Err(_) => {
                debug!(
                    "{} is outside {}, passing it through unchanged",
                    host.display(),
                    config.host_path.display()
                );
                host.display().to_string()
            }
        }
    }

    /// Resolve the playbook, falling back to any `playbook.yml` in the role
    pub fn map_playbook(&self, config: &mut RunConfig) -> Result<()> {
        self.map_remote_path(config);

        let requested = (!config.playbook.is_empty())
            .then(|| self.resolve_host(&config.playbook, &config.host_path));

        let found = match &requested {
            Some(path) if path.is_file() => path.clone(),
            _ => match find_playbook(&config.host_path) {
                Some(path) => {
                    warn!(
                        "Playbook {} was not found, using {}",
                        config.playbook,
                        path.display()
                    );
                    path
                }
                None => {
                    return Err(ConfigError::FileNotFound {
                        kind: "playbook",
                        path: requested
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| config.playbook.clone()),
                    }
                    .into())
                }
            },
        };

        config.playbook = self.to_target(&found, config);
        debug!("Playbook mapped to {}", config.playbook);
        Ok(())
    }

    /// Resolve the inventory
    ///
    /// An inline host list (any value containing `,`) is kept as is. A missing file
    /// is dropped with a warning. Remote runs without an inventory target the
    /// container itself as `<cid>,`.
    pub fn map_inventory(&self, cid: &str, config: &mut RunConfig) {
        self.map_remote_path(config);

        match config.inventory.take().filter(|inv| !inv.is_empty()) {
            Some(inline) if inline.contains(',') => {
                config.inventory = Some(inline);
            }
            Some(file) => {
                let host = self.resolve_host(&file, &config.host_path);
                if host.is_file() {
                    config.inventory = Some(self.to_target(&host, config));
                } else {
                    warn!(
                        "{}",
                        ConfigError::FileNotFound {
                            kind: "inventory",
                            path: host.display().to_string(),
                        }
                    );
                }
            }
            None => {}
        }

        if config.remote && config.inventory.is_none() && !cid.is_empty() {
            config.inventory = Some(format!("{},", cid));
        }
    }

    /// Resolve the requirements file; a missing file is dropped with a warning
    pub fn map_requirements(&self, config: &mut RunConfig) {
        self.map_remote_path(config);

        let Some(requirements) = config.requirements.take().filter(|r| !r.is_empty()) else {
            return;
        };

        let host = self.resolve_host(&requirements, &config.host_path);
        if host.is_file() {
            config.requirements = Some(self.to_target(&host, config));
        } else {
            warn!(
                "{}",
                ConfigError::FileNotFound {
                    kind: "requirements",
                    path: host.display().to_string(),
                }
            );
        }
    }

    /// Resolve the host directories mounted next to the role
    pub fn map_mounts(&self, config: &mut RunConfig) {
        for (kind, slot) in [
            ("extra roles", &mut config.extra_roles),
            ("library", &mut config.library),
        ] {
            if let Some(dir) = slot.take() {
                let resolved = self.resolve_host(&dir.to_string_lossy(), &config.host_path);
                if resolved.is_dir() {
                    *slot = Some(resolved);
                } else {
                    warn!("Specified {} directory {} does not exist", kind, resolved.display());
                }
            }
        }
    }

    /// Apply every mapping in order
    pub fn map_all(&self, cid: &str, config: &mut RunConfig) -> Result<()> {
        self.map_remote_path(config);
        self.map_playbook(config)?;
        self.map_requirements(config);
        self.map_inventory(cid, config);
        self.map_mounts(config);
        Ok(())
    }
}

/// First `playbook.yml` under `tests/`, else anywhere in the role, in sorted order
pub fn find_playbook(root: &Path) -> Option<PathBuf> {
    find_file(&root.join("tests"), PLAYBOOK_FILE_NAME)
        .or_else(|| find_file(root, PLAYBOOK_FILE_NAME))
}

fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(hit) = entries
        .iter()
        .find(|path| path.is_file() && path.file_name().is_some_and(|f| f == name))
    {
        return Some(hit.clone());
    }

    entries
        .iter()
        .filter(|path| path.is_dir() && !is_hidden(path))
        .find_map(|path| find_file(path, name))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
