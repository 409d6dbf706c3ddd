//! VLAN endpoint.

use std::path::Path;

use async_trait::async_trait;
use vcnet_common::VcResult;
use vcnet_network::{InterworkingModel, NetworkInterfacePair};

use super::{
    Endpoint, EndpointType, Sealed, checked_index, connect_vm_network, disconnect_vm_network,
    in_netns, reapply_addresses, release_addresses, unsupported,
};
use crate::host::HostNetwork;
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

/// A VLAN link bridged into the guest through a network pair.
#[derive(Debug)]
pub struct VlanEndpoint {
    net_pair: NetworkInterfacePair,
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    // TODO: define how the VLAN id relates to the guest device; it is carried only.
    vlan_id: i32,
    pci_addr: String,
    host: HostNetwork,
}

impl VlanEndpoint {
    /// Create the endpoint for interface slot `idx`.
    ///
    /// A non-empty `if_name` replaces the factory's synthesized name.
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
            endpoint_type: EndpointType::Vlan,
            vlan_id: 0,
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
            endpoint_type: EndpointType::Vlan,
            vlan_id: 0,
            pci_addr: String::new(),
            host,
        }
    }

    /// VLAN id.
    #[must_use]
    pub const fn vlan_id(&self) -> i32 {
        self.vlan_id
    }

    /// Set the VLAN id.
    pub const fn set_vlan_id(&mut self, vlan_id: i32) {
        self.vlan_id = vlan_id;
    }
}

impl Sealed for VlanEndpoint {}

#[async_trait]
impl Endpoint for VlanEndpoint {
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
            tracing::error!(endpoint = %self.name(), error = %e, "Error bridging vlan endpoint");
            return Err(e);
        }

        if let Err(e) = hypervisor.add_device(&mut *self, DeviceCategory::Network).await {
            self.pci_addr.clear();
            return Err(e);
        }

        reapply_addresses(&self.host, self.name(), &self.properties.addrs).await;
        tracing::info!(endpoint = %self.name(), pci = %self.pci_addr, "Attached vlan endpoint");
        Ok(())
    }

    async fn detach(&mut self, netns_created: bool, netns_path: &Path) -> VcResult<()> {
        // The runtime only tears down namespaces it created.
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
        tracing::info!(endpoint = %self.name(), "Detached vlan endpoint");
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
        EndpointState::Vlan {
            net_pair: self.net_pair.clone(),
        }
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::Vlan;
        match state {
            EndpointState::Vlan { net_pair } => self.net_pair = net_pair,
            other => tracing::warn!(found = %other.endpoint_type(), "Ignoring state of another endpoint type"),
        }
    }
}
