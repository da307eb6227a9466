//! Distribution catalog
//!
//! Static records describing how to boot each supported image: the init process,
//! the cgroup volume and whether the container must run privileged. Lookups try an
//! exact image reference first and then the (user, distro) pair. A custom record can
//! be assembled from explicit values with [`DistributionBuilder`].

use crate::errors::{DistributionError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const CGROUP_VOLUME: &str = "/sys/fs/cgroup:/sys/fs/cgroup:ro";

/// Default image namespace when none is given
pub const DEFAULT_USER: &str = "fubarhouse";

/// Default distribution id when none is given
pub const DEFAULT_DISTRO: &str = "ubuntu1804";

/// Default init command for custom distributions
pub const DEFAULT_INIT: &str = "/bin/systemd";

/// Default volume for custom distributions
pub const DEFAULT_VOLUME: &str = CGROUP_VOLUME;

/// Characteristics shared by a family of Linux distributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub name: String,
    /// Command run as PID 1 inside the container
    pub init_command: String,
    /// Volume mount needed by the init system
    pub volume_mount: String,
}

impl Family {
    fn new(name: &str, init_command: &str) -> Self {
        Self {
            name: name.to_string(),
            init_command: init_command.to_string(),
            volume_mount: CGROUP_VOLUME.to_string(),
        }
    }

    pub fn centos() -> Self {
        Self::new("CentOS", "/sbin/init")
    }

    pub fn debian() -> Self {
        Self::new("Debian", "/bin/systemd")
    }

    pub fn fedora() -> Self {
        Self::new("Fedora", "/usr/lib/systemd/systemd")
    }

    pub fn ubuntu() -> Self {
        Self::new("Ubuntu", "/sbin/init")
    }
}

/// One bootable target image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRecord {
    /// Short distro id, e.g. `ubuntu1804`
    pub name: String,
    /// Whether the container runs with `--privileged`
    pub privileged: bool,
    /// Fully qualified image, e.g. `fubarhouse/docker-ansible:bionic`
    pub image_reference: String,
    /// Image namespace used for lookups by user
    pub user: String,
    /// Distro id used for lookups by distro
    pub distro: String,
    pub family: Family,
}

impl DistributionRecord {
    pub fn init_command(&self) -> &str {
        &self.family.init_command
    }

    pub fn volume_mount(&self) -> &str {
        &self.family.volume_mount
    }
}

fn record(name: &str, image: &str, user: &str, distro: &str, family: Family) -> DistributionRecord {
    DistributionRecord {
        name: name.to_string(),
        privileged: true,
        image_reference: image.to_string(),
        user: user.to_string(),
        distro: distro.to_string(),
        family,
    }
}

fn fubarhouse(name: &str, tag: &str, distro: &str, family: Family) -> DistributionRecord {
    record(
        name,
        &format!("fubarhouse/docker-ansible:{}", tag),
        "fubarhouse",
        distro,
        family,
    )
}

fn geerlingguy(distro: &str, family: Family) -> DistributionRecord {
    record(
        distro,
        &format!("geerlingguy/docker-{}-ansible:latest", distro),
        "geerlingguy",
        distro,
        family,
    )
}

static CATALOG: Lazy<Vec<DistributionRecord>> = Lazy::new(|| {
    let mut records = vec![
        fubarhouse("centos6", "centos-6", "centos6", Family::centos()),
        fubarhouse("centos7", "centos-7", "centos7", Family::centos()),
        fubarhouse("wheezy", "wheezy", "debian7", Family::debian()),
        fubarhouse("jessie", "jessie", "debian8", Family::debian()),
        fubarhouse("stretch", "stretch", "debian9", Family::debian()),
        fubarhouse("buster", "buster", "debian10", Family::debian()),
    ];

    for release in 24..=28 {
        let id = format!("fedora{}", release);
        records.push(fubarhouse(
            &id,
            &format!("fedora-{}", release),
            &id,
            Family::fedora(),
        ));
    }

    let ubuntu = [
        ("1204", "precise"),
        ("1210", "quantal"),
        ("1304", "raring"),
        ("1310", "saucy"),
        ("1404", "trusty"),
        ("1410", "utopic"),
        ("1504", "vivid"),
        ("1510", "wily"),
        ("1604", "xenial"),
        ("1610", "yakkety"),
        ("1704", "zesty"),
        ("1710", "artful"),
        ("1804", "bionic"),
        ("1810", "cosmic"),
    ];
    for (version, codename) in ubuntu {
        let id = format!("ubuntu{}", version);
        records.push(fubarhouse(&id, codename, &id, Family::ubuntu()));
    }

    records.extend([
        geerlingguy("centos6", Family::centos()),
        geerlingguy("centos7", Family::centos()),
        geerlingguy("ubuntu1204", Family::ubuntu()),
        geerlingguy("ubuntu1404", Family::ubuntu()),
        geerlingguy("ubuntu1604", Family::ubuntu()),
        geerlingguy("ubuntu1804", Family::ubuntu()),
        geerlingguy("debian8", Family::debian()),
        geerlingguy("debian9", Family::debian()),
        geerlingguy("fedora24", Family::fedora()),
        geerlingguy("fedora27", Family::fedora()),
    ]);

    records
});

/// Every built-in distribution record
pub fn catalog() -> &'static [DistributionRecord] {
    &CATALOG
}

/// How the caller wants the distribution chosen
#[derive(Debug, Clone, Default)]
pub struct DistributionSelection {
    /// Explicit image reference (`--image`)
    pub image: Option<String>,
    /// Image namespace (`--user`)
    pub user: String,
    /// Distro id (`--distribution`)
    pub distro: String,
    /// Custom record values, when `--custom` is set
    pub custom: Option<DistributionBuilder>,
}

impl DistributionSelection {
    /// Selection by user and distro id
    pub fn by_name(user: impl Into<String>, distro: impl Into<String>) -> Self {
        Self {
            image: None,
            user: user.into(),
            distro: distro.into(),
            custom: None,
        }
    }

    /// Resolve the selection to a record
    ///
    /// A custom selection always yields its own record. Otherwise an exact image
    /// match wins over a (user, distro) match; when an explicit image matched nothing
    /// and the pair is used instead, a warning is logged.
    pub fn resolve(&self) -> Result<DistributionRecord> {
        if let Some(builder) = &self.custom {
            return builder.build();
        }

        if let Some(image) = self.image.as_deref().filter(|image| !image.is_empty()) {
            if let Some(found) = catalog().iter().find(|r| r.image_reference == image) {
                debug!("Resolved distribution {} by image", found.name);
                return Ok(found.clone());
            }
        }

        let by_pair = catalog()
            .iter()
            .find(|r| r.user == self.user && r.distro == self.distro);

        match by_pair {
            Some(found) => {
                if let Some(image) = self.image.as_deref().filter(|image| !image.is_empty()) {
                    warn!(
                        "Image {} is not in the catalog, using {} for {}/{}",
                        image, found.image_reference, self.user, self.distro
                    );
                }
                debug!("Resolved distribution {} by user and distro", found.name);
                Ok(found.clone())
            }
            None => Err(DistributionError::NotFound {
                image: self.image.clone(),
                user: self.user.clone(),
                distro: self.distro.clone(),
            }
            .into()),
        }
    }
}

/// Builder for an ad-hoc distribution record
#[derive(Debug, Clone, Default)]
pub struct DistributionBuilder {
    image: Option<String>,
    init_command: Option<String>,
    volume_mount: Option<String>,
    user: Option<String>,
    distro: Option<String>,
    name: Option<String>,
}

impl DistributionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn init_command(mut self, init: impl Into<String>) -> Self {
        self.init_command = Some(init.into());
        self
    }

    pub fn volume_mount(mut self, volume: impl Into<String>) -> Self {
        self.volume_mount = Some(volume.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn distro(mut self, distro: impl Into<String>) -> Self {
        self.distro = Some(distro.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Assemble the record; an image reference is mandatory
    pub fn build(&self) -> Result<DistributionRecord> {
        let image = self
            .image
            .clone()
            .filter(|image| !image.is_empty())
            .ok_or(DistributionError::CustomImageMissing)?;

        let user = self
            .user
            .clone()
            .filter(|user| !user.is_empty())
            .unwrap_or_else(|| image.split('/').next().unwrap_or_default().to_string());
        let distro = self
            .distro
            .clone()
            .filter(|distro| !distro.is_empty())
            .unwrap_or_else(|| image.clone());
        let name = self.name.clone().unwrap_or_else(|| distro.clone());

        Ok(DistributionRecord {
            name,
            privileged: true,
            image_reference: image,
            user,
            distro,
            family: Family {
                name: "Custom".to_string(),
                init_command: self
                    .init_command
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INIT.to_string()),
                volume_mount: self
                    .volume_mount
                    .clone()
                    .unwrap_or_else(|| DEFAULT_VOLUME.to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RoleTesterError;

    #[test]
    fn test_catalog_contents() {
        assert_eq!(catalog().len(), 35);
        assert!(catalog().iter().all(|r| r.privileged));
        assert!(catalog().iter().all(|r| r.volume_mount() == CGROUP_VOLUME));
    }

    #[test]
    fn test_resolve_by_user_and_distro() {
        let record = DistributionSelection::by_name("fubarhouse", "ubuntu1804")
            .resolve()
            .unwrap();
        assert_eq!(record.image_reference, "fubarhouse/docker-ansible:bionic");
        assert_eq!(record.init_command(), "/sbin/init");

        let record = DistributionSelection::by_name("geerlingguy", "debian9")
            .resolve()
            .unwrap();
        assert_eq!(
            record.image_reference,
            "geerlingguy/docker-debian9-ansible:latest"
        );
        assert_eq!(record.init_command(), "/bin/systemd");
    }

    #[test]
    fn test_resolve_prefers_image() {
        let selection = DistributionSelection {
            image: Some("fubarhouse/docker-ansible:fedora-27".to_string()),
            user: "fubarhouse".to_string(),
            distro: "ubuntu1804".to_string(),
            custom: None,
        };
        let record = selection.resolve().unwrap();
        assert_eq!(record.name, "fedora27");
        assert_eq!(record.init_command(), "/usr/lib/systemd/systemd");
    }

    #[test]
    fn test_resolve_unknown_image_falls_back_to_pair() {
        let selection = DistributionSelection {
            image: Some("example/unknown:1".to_string()),
            user: "fubarhouse".to_string(),
            distro: "debian7".to_string(),
            custom: None,
        };
        let record = selection.resolve().unwrap();
        assert_eq!(record.name, "wheezy");
    }

    #[test]
    fn test_resolve_not_found() {
        let err = DistributionSelection::by_name("nobody", "plan9")
            .resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            RoleTesterError::Distribution(DistributionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_custom_builder_defaults() {
        let record = DistributionBuilder::new()
            .image("acme/rocky:9")
            .build()
            .unwrap();
        assert_eq!(record.user, "acme");
        assert_eq!(record.distro, "acme/rocky:9");
        assert_eq!(record.init_command(), DEFAULT_INIT);
        assert_eq!(record.volume_mount(), DEFAULT_VOLUME);
        assert!(record.privileged);
    }

    #[test]
    fn test_custom_builder_explicit_values() {
        let record = DistributionBuilder::new()
            .image("acme/rocky:9")
            .init_command("/usr/sbin/init")
            .volume_mount("/tmp:/tmp")
            .user("acme")
            .distro("rocky9")
            .name("rocky")
            .build()
            .unwrap();
        assert_eq!(record.name, "rocky");
        assert_eq!(record.distro, "rocky9");
        assert_eq!(record.init_command(), "/usr/sbin/init");
        assert_eq!(record.volume_mount(), "/tmp:/tmp");
    }

    #[test]
    fn test_custom_selection_without_image_is_fatal() {
        let selection = DistributionSelection {
            custom: Some(DistributionBuilder::new().distro("rocky9")),
            ..DistributionSelection::by_name(DEFAULT_USER, DEFAULT_DISTRO)
        };
        let err = selection.resolve().unwrap_err();
        assert!(matches!(
            err,
            RoleTesterError::Distribution(DistributionError::CustomImageMissing)
        ));
    }
}
