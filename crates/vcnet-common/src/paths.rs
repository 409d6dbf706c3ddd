//! Standard filesystem paths for vcnet.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Default root directory for persisted sandbox network state.
pub static VCNET_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VCNET_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/vcnet"))
});

/// Default sysfs mount point.
pub static VCNET_SYSFS: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VCNET_SYSFS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/sys"))
});

/// Standard paths used by the endpoint subsystem.
///
/// sysfs and `/dev` are configurable so host lookups can be pointed at a
/// fixture tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcnetPaths {
    /// Root data directory (default: /var/lib/vcnet).
    pub root: PathBuf,
    /// sysfs mount point (default: /sys).
    pub sysfs: PathBuf,
    /// Device node directory (default: /dev).
    pub dev: PathBuf,
    /// Directory scanned for vhost-user sockets (default: /tmp).
    pub vhost_user: PathBuf,
}

impl VcnetPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Look for vhost-user sockets under `dir`.
    #[must_use]
    pub fn with_vhost_user(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vhost_user = dir.into();
        self
    }

    /// Use a different sysfs mount point.
    #[must_use]
    pub fn with_sysfs(mut self, sysfs: impl Into<PathBuf>) -> Self {
        self.sysfs = sysfs.into();
        self
    }

    /// Use a different device node directory.
    #[must_use]
    pub fn with_dev(mut self, dev: impl Into<PathBuf>) -> Self {
        self.dev = dev.into();
        self
    }

    /// Directory for all sandboxes.
    #[must_use]
    pub fn sandboxes(&self) -> PathBuf {
        self.root.join("sandboxes")
    }

    /// Directory for a specific sandbox.
    #[must_use]
    pub fn sandbox(&self, id: &str) -> PathBuf {
        self.sandboxes().join(id)
    }

    /// Persisted endpoint records of a sandbox.
    #[must_use]
    pub fn sandbox_network(&self, id: &str) -> PathBuf {
        self.sandbox(id).join("network.json")
    }

    /// `/sys/class/net/<iface>`.
    #[must_use]
    pub fn class_net(&self, iface: &str) -> PathBuf {
        self.sysfs.join("class/net").join(iface)
    }

    /// `/sys/module/<name>`.
    #[must_use]
    pub fn module(&self, name: &str) -> PathBuf {
        self.sysfs.join("module").join(name)
    }

    /// `/sys/bus/pci/devices/<bdf>`.
    #[must_use]
    pub fn pci_device(&self, bdf: &str) -> PathBuf {
        self.sysfs.join("bus/pci/devices").join(bdf)
    }

    /// `/sys/bus/pci/drivers/<driver>`.
    #[must_use]
    pub fn pci_driver(&self, driver: &str) -> PathBuf {
        self.sysfs.join("bus/pci/drivers").join(driver)
    }

    /// `/sys/bus/pci/drivers_probe`.
    #[must_use]
    pub fn pci_drivers_probe(&self) -> PathBuf {
        self.sysfs.join("bus/pci/drivers_probe")
    }

    /// Character device of a macvtap link, `/dev/tap<ifindex>`.
    #[must_use]
    pub fn macvtap_device(&self, ifindex: u32) -> PathBuf {
        self.dev.join(format!("tap{ifindex}"))
    }

    /// VFIO group device, `/dev/vfio/<group>`.
    #[must_use]
    pub fn vfio_group(&self, group: &str) -> PathBuf {
        self.dev.join("vfio").join(group)
    }
}

impl Default for VcnetPaths {
    fn default() -> Self {
        Self {
            root: VCNET_ROOT.clone(),
            sysfs: VCNET_SYSFS.clone(),
            dev: PathBuf::from("/dev"),
            vhost_user: PathBuf::from("/tmp"),
        }
    }
}
