//! veth endpoint, the default for CNI-created container interfaces.

use std::path::Path;

use async_trait::async_trait;
use vcnet_common::VcResult;
use vcnet_network::{InterworkingModel, NetworkInterfacePair};

use super::{
    Endpoint, EndpointType, Sealed, checked_index, connect_vm_network, disconnect_vm_network,
    in_netns, reapply_addresses, release_addresses,
};
use crate::host::HostNetwork;
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

/// A veth interface bridged into the guest through a network pair.
#[derive(Debug)]
pub struct VethEndpoint {
    net_pair: NetworkInterfacePair,
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    pci_addr: String,
    host: HostNetwork,
}

impl VethEndpoint {
    /// Create the endpoint for interface slot `idx`.
    pub fn create(
        host: HostNetwork,
        idx: i64,
        if_name: &str,
        model: InterworkingModel,
    ) -> VcResult<Self> {
        let index = checked_index(idx)?;
        let mut net_pair = host.factory.create_pair(index, if_name, model)?;
        if !if_name.is_empty() {
            net_pair.virt_iface.name = if_name.to_string();
        }

        Ok(Self {
            net_pair,
            properties: NetworkInfo::default(),
            endpoint_type: EndpointType::Veth,
            pci_addr: String::new(),
            host,
        })
    }

    /// An endpoint with no pair yet, to be filled by [`Endpoint::load`].
    #[must_use]
    pub fn blank(host: HostNetwork) -> Self {
        Self {
            net_pair: NetworkInterfacePair::default(),
            properties: NetworkInfo::default(),
            endpoint_type: EndpointType::Veth,
            pci_addr: String::new(),
            host,
        }
    }
}

impl Sealed for VethEndpoint {}

#[async_trait]
impl Endpoint for VethEndpoint {
    fn properties(&self) -> &NetworkInfo {
        &self.properties
    }

    fn set_properties(&mut self, properties: NetworkInfo) {
        self.properties = properties;
    }

    fn name(&self) -> &str {
        &self.net_pair.virt_iface.name
    }

    fn hardware_addr(&self) -> &str {
        &self.net_pair.tap.tap_iface.hard_addr
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
        Some(&self.net_pair)
    }

    async fn attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()> {
        if let Err(e) = connect_vm_network(&self.host, &*self, hypervisor).await {
            tracing::error!(endpoint = %self.name(), error = %e, "Error bridging virtual endpoint");
            return Err(e);
        }

        if let Err(e) = hypervisor.add_device(&mut *self, DeviceCategory::Network).await {
            self.pci_addr.clear();
            return Err(e);
        }

        reapply_addresses(&self.host, self.name(), &self.properties.addrs).await;
        Ok(())
    }

    async fn detach(&mut self, netns_created: bool, netns_path: &Path) -> VcResult<()> {
        if !netns_created {
            return Ok(());
        }

        let pair = self.net_pair.clone();
        let addrs = self.properties.addrs.clone();
        in_netns(&self.host, netns_path, move |wiring| {
            release_addresses(wiring, pair.virt_link(), &addrs);
            disconnect_vm_network(wiring, &pair)
        })
        .await?;

        self.pci_addr.clear();
        Ok(())
    }

    async fn hot_attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()> {
        if let Err(e) = connect_vm_network(&self.host, &*self, hypervisor).await {
            tracing::error!(endpoint = %self.name(), error = %e, "Error bridging virtual endpoint");
            return Err(e);
        }

        if let Err(e) = hypervisor.hot_add_device(&mut *self, DeviceCategory::Network).await {
            tracing::error!(endpoint = %self.name(), error = %e, "Error hot attaching virtual endpoint");
            self.pci_addr.clear();
            return Err(e);
        }

        Ok(())
    }

    async fn hot_detach(
        &mut self,
        hypervisor: &dyn Hypervisor,
        netns_created: bool,
        netns_path: &Path,
    ) -> VcResult<()> {
        if !netns_created {
            return Ok(());
        }

        let pair = self.net_pair.clone();
        if let Err(e) = in_netns(&self.host, netns_path, move |wiring| {
            disconnect_vm_network(wiring, &pair)
        })
        .await
        {
            tracing::warn!(endpoint = %self.name(), error = %e, "Error un-bridging virtual endpoint");
        }

        hypervisor
            .hot_remove_device(&mut *self, DeviceCategory::Network)
            .await?;
        self.pci_addr.clear();
        Ok(())
    }

    fn save(&self) -> EndpointState {
        EndpointState::Veth {
            net_pair: self.net_pair.clone(),
        }
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::Veth;
        match state {
            EndpointState::Veth { net_pair } => self.net_pair = net_pair,
            other => tracing::warn!(found = %other.endpoint_type(), "Ignoring state of another endpoint type"),
        }
    }
}
