//! Macvtap endpoint.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use async_trait::async_trait;
use vcnet_common::{VcError, VcResult};
use vcnet_network::NetworkInterfacePair;

use super::{Endpoint, EndpointType, Sealed, unsupported};
use crate::host::HostNetwork;
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

/// A macvtap link created by the container's network plugin. The
/// hypervisor reads and writes its character device directly.
#[derive(Debug)]
pub struct MacvtapEndpoint {
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    // One per queue; open between attach and detach.
    queue_files: Vec<File>,
    pci_addr: String,
    host: HostNetwork,
}

impl MacvtapEndpoint {
    /// Create the endpoint for the link described by `properties`.
    #[must_use]
    pub fn create(host: HostNetwork, properties: NetworkInfo) -> Self {
        Self {
            properties,
            endpoint_type: EndpointType::Macvtap,
            queue_files: Vec::new(),
            pci_addr: String::new(),
            host,
        }
    }

    /// An endpoint with no properties yet, to be filled by [`Endpoint::load`].
    #[must_use]
    pub fn blank(host: HostNetwork) -> Self {
        Self::create(host, NetworkInfo::default())
    }

    /// Number of queue descriptors currently held open.
    #[must_use]
    pub fn open_queues(&self) -> usize {
        self.queue_files.len()
    }

    fn open_queue_files(&self, queues: u32) -> VcResult<Vec<File>> {
        let device = self
            .host
            .config
            .paths
            .macvtap_device(self.properties.iface.index);

        (0..queues)
            .map(|_| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&device)
                    .map_err(|e| {
                        VcError::wiring(format!("failed to open {}: {e}", device.display()))
                    })
            })
            .collect()
    }
}

impl Sealed for MacvtapEndpoint {}

#[async_trait]
impl Endpoint for MacvtapEndpoint {
    fn properties(&self) -> &NetworkInfo {
        &self.properties
    }

    fn set_properties(&mut self, properties: NetworkInfo) {
        self.properties = properties;
    }

    fn name(&self) -> &str {
        &self.properties.iface.name
    }

    fn hardware_addr(&self) -> &str {
        &self.properties.iface.hard_addr
    }

    fn endpoint_type(&self) -> EndpointType {
        self.endpoint_type
    }

    fn pci_addr(&self) -> &str {
        &self.pci_addr
    }

    fn set_pci_addr(&mut self, pci_addr: String) {
        self.pci_addr = pci_addr;
    }

    fn network_pair(&self) -> Option<&NetworkInterfacePair> {
        None
    }

    async fn attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()> {
        let queues = self.host.config.queues_for(hypervisor.network_queues());
        self.queue_files = self.open_queue_files(queues)?;
        let fds = self.queue_files.iter().map(AsRawFd::as_raw_fd).collect();

        tracing::debug!(endpoint = %self.name(), queues, "Opened macvtap queues");

        if let Err(e) = hypervisor
            .add_device(&mut *self, DeviceCategory::MacvtapNetwork { fds })
            .await
        {
            self.queue_files.clear();
            self.pci_addr.clear();
            return Err(e);
        }
        Ok(())
    }

    async fn detach(&mut self, netns_created: bool, _netns_path: &Path) -> VcResult<()> {
        // The plugin that created the link also removes it.
        if !netns_created {
            return Ok(());
        }
        self.queue_files.clear();
        self.pci_addr.clear();
        Ok(())
    }

    async fn hot_attach(&mut self, _hypervisor: &dyn Hypervisor) -> VcResult<()> {
        Err(unsupported("hot attach", self.endpoint_type))
    }

    async fn hot_detach(
        &mut self,
        _hypervisor: &dyn Hypervisor,
        _netns_created: bool,
        _netns_path: &Path,
    ) -> VcResult<()> {
        Err(unsupported("hot detach", self.endpoint_type))
    }

    fn save(&self) -> EndpointState {
        EndpointState::Macvtap
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::Macvtap;
        if !matches!(state, EndpointState::Macvtap) {
            tracing::warn!(found = %state.endpoint_type(), "Ignoring state of another endpoint type");
        }
    }
}
