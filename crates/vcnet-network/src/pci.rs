//! PCI network devices and VFIO passthrough via sysfs.

use std::path::{Path, PathBuf};

use vcnet_common::{VcError, VcResult, VcnetPaths};

/// Driver a device is bound to for passthrough.
pub const VFIO_DRIVER: &str = "vfio-pci";

/// A PCI network function as seen in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDevice {
    /// Bus/device/function, e.g. `0000:03:00.0`.
    pub bdf: String,
    /// Host driver currently (or originally) bound.
    pub driver: String,
    /// `"<vendor> <device>"` ids in hex, e.g. `"8086 1572"`.
    pub vendor_device_id: String,
}

fn link_name(path: &Path) -> VcResult<String> {
    let target = std::fs::read_link(path)?;
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| VcError::Internal {
            message: format!("unexpected sysfs link target {}", target.display()),
        })
}

fn read_id(path: &Path) -> VcResult<String> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.trim().trim_start_matches("0x").to_string())
}

/// Resolve the PCI function behind network interface `iface`.
pub fn netdev_pci_device(paths: &VcnetPaths, iface: &str) -> VcResult<PciDevice> {
    let device_link = paths.class_net(iface).join("device");
    if !device_link.exists() {
        return Err(VcError::InvalidInput {
            message: format!("{iface} is not backed by a PCI device"),
        });
    }

    let bdf = link_name(&device_link)?;
    let device_dir = paths.pci_device(&bdf);
    let driver = link_name(&device_dir.join("driver"))?;
    let vendor = read_id(&device_dir.join("vendor"))?;
    let device = read_id(&device_dir.join("device"))?;

    Ok(PciDevice {
        bdf,
        driver,
        vendor_device_id: format!("{vendor} {device}"),
    })
}

/// Bind `dev` to vfio-pci. Returns the VFIO group device node.
pub fn bind_to_vfio(paths: &VcnetPaths, dev: &PciDevice) -> VcResult<PathBuf> {
    let device_dir = paths.pci_device(&dev.bdf);
    tracing::info!(bdf = %dev.bdf, driver = %dev.driver, "Binding device to vfio-pci");

    std::fs::write(device_dir.join("driver_override"), VFIO_DRIVER)?;
    if device_dir.join("driver").exists() {
        std::fs::write(paths.pci_driver(&dev.driver).join("unbind"), &dev.bdf)?;
    }
    std::fs::write(paths.pci_drivers_probe(), &dev.bdf)?;

    let group = link_name(&device_dir.join("iommu_group"))?;
    Ok(paths.vfio_group(&group))
}

/// Hand `dev` back to its host driver.
pub fn bind_to_host(paths: &VcnetPaths, dev: &PciDevice) -> VcResult<()> {
    let device_dir = paths.pci_device(&dev.bdf);
    tracing::info!(bdf = %dev.bdf, driver = %dev.driver, "Binding device back to host driver");

    if device_dir.join("driver").exists() {
        std::fs::write(paths.pci_driver(VFIO_DRIVER).join("unbind"), &dev.bdf)?;
    }
    std::fs::write(device_dir.join("driver_override"), "\n")?;
    std::fs::write(paths.pci_drivers_probe(), &dev.bdf)?;
    Ok(())
}
