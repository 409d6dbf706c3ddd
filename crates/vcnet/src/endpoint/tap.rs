//! Standalone tap endpoint.

use std::path::Path;

use async_trait::async_trait;
use vcnet_common::{HardwareAddr, VcResult};
use vcnet_network::{NetworkInterface, NetworkInterfacePair, TapInterface};

use super::{Endpoint, EndpointType, Sealed, checked_index, in_netns, on_host, unsupported};
use crate::host::HostNetwork;
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

/// A tap device created for the guest, without a container-side peer.
///
/// Only hot-plug is supported.
#[derive(Debug)]
pub struct TapEndpoint {
    tap_interface: TapInterface,
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    pci_addr: String,
    host: HostNetwork,
}

impl TapEndpoint {
    /// Create the endpoint for interface slot `idx`.
    pub fn create(host: HostNetwork, idx: i64, if_name: &str) -> VcResult<Self> {
        let index = checked_index(idx)?;
        let name = if if_name.is_empty() {
            NetworkInterfacePair::tap_name(index)
        } else {
            if_name.to_string()
        };

        let tap_interface = TapInterface {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            tap_iface: NetworkInterface {
                name: NetworkInterfacePair::tap_name(index),
                hard_addr: HardwareAddr::generate_private().to_string(),
                ..NetworkInterface::default()
            },
        };

        Ok(Self {
            tap_interface,
            properties: NetworkInfo::default(),
            endpoint_type: EndpointType::Tap,
            pci_addr: String::new(),
            host,
        })
    }

    /// An endpoint with no tap yet, to be filled by [`Endpoint::load`].
    #[must_use]
    pub fn blank(host: HostNetwork) -> Self {
        Self {
            tap_interface: TapInterface::default(),
            properties: NetworkInfo::default(),
            endpoint_type: EndpointType::Tap,
            pci_addr: String::new(),
            host,
        }
    }

    /// The tap this endpoint owns.
    #[must_use]
    pub const fn tap_interface(&self) -> &TapInterface {
        &self.tap_interface
    }

    async fn delete_tap_in(&self, netns_path: &Path) -> VcResult<()> {
        let tap = self.tap_interface.clone();
        in_netns(&self.host, netns_path, move |wiring| wiring.delete_tap(&tap)).await
    }
}

impl Sealed for TapEndpoint {}

#[async_trait]
impl Endpoint for TapEndpoint {
    fn properties(&self) -> &NetworkInfo {
        &self.properties
    }

    fn set_properties(&mut self, properties: NetworkInfo) {
        self.properties = properties;
    }

    fn name(&self) -> &str {
        &self.tap_interface.name
    }

    fn hardware_addr(&self) -> &str {
        &self.tap_interface.tap_iface.hard_addr
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

    async fn attach(&mut self, _hypervisor: &dyn Hypervisor) -> VcResult<()> {
        Err(unsupported("attach", self.endpoint_type))
    }

    async fn detach(&mut self, netns_created: bool, netns_path: &Path) -> VcResult<()> {
        let no_path = netns_path.as_os_str().is_empty();
        if !netns_created && !no_path {
            return Ok(());
        }

        if no_path {
            let tap = self.tap_interface.clone();
            on_host(&self.host, move |wiring| wiring.delete_tap(&tap)).await?;
        } else {
            self.delete_tap_in(netns_path).await?;
        }

        self.pci_addr.clear();
        Ok(())
    }

    async fn hot_attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()> {
        let queues = self.host.config.queues_for(hypervisor.network_queues());
        let tap = self.tap_interface.clone();
        if let Err(e) = on_host(&self.host, move |wiring| wiring.create_tap(&tap, queues)).await {
            tracing::error!(tap = %self.tap_interface.tap_iface.name, error = %e, "Error creating tap device");
            return Err(e);
        }

        if let Err(e) = hypervisor.hot_add_device(&mut *self, DeviceCategory::Network).await {
            tracing::error!(tap = %self.tap_interface.tap_iface.name, error = %e, "Error hot attaching tap endpoint");
            self.pci_addr.clear();
            return Err(e);
        }

        Ok(())
    }

    async fn hot_detach(
        &mut self,
        hypervisor: &dyn Hypervisor,
        _netns_created: bool,
        netns_path: &Path,
    ) -> VcResult<()> {
        if let Err(e) = self.delete_tap_in(netns_path).await {
            tracing::warn!(tap = %self.tap_interface.tap_iface.name, error = %e, "Error removing tap device");
        }

        hypervisor
            .hot_remove_device(&mut *self, DeviceCategory::Network)
            .await?;
        self.pci_addr.clear();
        Ok(())
    }

    fn save(&self) -> EndpointState {
        EndpointState::Tap {
            tap_interface: self.tap_interface.clone(),
        }
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::Tap;
        match state {
            EndpointState::Tap { tap_interface } => self.tap_interface = tap_interface,
            other => tracing::warn!(found = %other.endpoint_type(), "Ignoring state of another endpoint type"),
        }
    }
}
