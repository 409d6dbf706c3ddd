//! The hypervisor device port.
//!
//! Endpoints hand themselves to the hypervisor as device descriptors. The
//! hypervisor picks a PCI slot and reports it back through
//! [`Endpoint::set_pci_addr`](crate::Endpoint::set_pci_addr).

use std::os::fd::RawFd;
use std::path::PathBuf;

use async_trait::async_trait;
use vcnet_common::VcResult;

use crate::endpoint::Endpoint;

/// What kind of device an endpoint asks the hypervisor to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCategory {
    /// virtio-net backed by the endpoint's tap device.
    Network,
    /// virtio-net backed by already opened macvtap queue descriptors.
    MacvtapNetwork {
        /// One descriptor per queue.
        fds: Vec<RawFd>,
    },
    /// virtio-net backed by a vhost-user socket.
    VhostUserNetwork {
        /// Backend socket.
        socket_path: PathBuf,
    },
    /// PCI function passed through with VFIO.
    Vfio {
        /// Host bus/device/function.
        bdf: String,
        /// VFIO group device node.
        group: PathBuf,
    },
}

/// Device model of a sandbox VM.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Add a device to the boot-time device list.
    async fn add_device(
        &self,
        endpoint: &mut dyn Endpoint,
        category: DeviceCategory,
    ) -> VcResult<()>;

    /// Plug a device into the running VM.
    async fn hot_add_device(
        &self,
        endpoint: &mut dyn Endpoint,
        category: DeviceCategory,
    ) -> VcResult<()>;

    /// Unplug a device from the running VM.
    async fn hot_remove_device(
        &self,
        endpoint: &mut dyn Endpoint,
        category: DeviceCategory,
    ) -> VcResult<()>;

    /// Queues per network device, usually the vCPU count.
    fn network_queues(&self) -> u32 {
        1
    }
}
