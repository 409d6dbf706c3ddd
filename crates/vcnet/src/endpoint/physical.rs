//! Physical NIC passed through to the guest with VFIO.

use std::path::Path;

use async_trait::async_trait;
use vcnet_common::VcResult;
use vcnet_network::{NetworkInterfacePair, PciDevice, bind_to_host, bind_to_vfio, netdev_pci_device};

use super::{Endpoint, EndpointType, Sealed, unsupported};
use crate::host::HostNetwork;
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

/// A host PCI network function handed to the guest.
#[derive(Debug)]
pub struct PhysicalEndpoint {
    iface_name: String,
    hard_addr: String,
    device: PciDevice,
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    pci_addr: String,
    host: HostNetwork,
}

impl PhysicalEndpoint {
    /// Resolve the PCI function behind the interface in `properties`.
    pub fn from_netdev(host: HostNetwork, properties: NetworkInfo) -> VcResult<Self> {
        let device = netdev_pci_device(&host.config.paths, &properties.iface.name)?;
        tracing::debug!(iface = %properties.iface.name, bdf = %device.bdf, driver = %device.driver, "Found PCI network device");

        Ok(Self {
            iface_name: properties.iface.name.clone(),
            hard_addr: properties.iface.hard_addr.clone(),
            device,
            properties,
            endpoint_type: EndpointType::Physical,
            pci_addr: String::new(),
            host,
        })
    }

    /// An endpoint with no device yet, to be filled by [`Endpoint::load`].
    #[must_use]
    pub fn blank(host: HostNetwork) -> Self {
        Self {
            iface_name: String::new(),
            hard_addr: String::new(),
            device: PciDevice {
                bdf: String::new(),
                driver: String::new(),
                vendor_device_id: String::new(),
            },
            properties: NetworkInfo::default(),
            endpoint_type: EndpointType::Physical,
            pci_addr: String::new(),
            host,
        }
    }

    /// Host PCI function.
    #[must_use]
    pub const fn device(&self) -> &PciDevice {
        &self.device
    }
}

impl Sealed for PhysicalEndpoint {}

#[async_trait]
impl Endpoint for PhysicalEndpoint {
    fn properties(&self) -> &NetworkInfo {
        &self.properties
    }

    fn set_properties(&mut self, properties: NetworkInfo) {
        self.properties = properties;
    }

    fn name(&self) -> &str {
        &self.iface_name
    }

    fn hardware_addr(&self) -> &str {
        &self.hard_addr
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
        let group = bind_to_vfio(&self.host.config.paths, &self.device)?;
        let category = DeviceCategory::Vfio {
            bdf: self.device.bdf.clone(),
            group,
        };

        if let Err(e) = hypervisor.add_device(&mut *self, category).await {
            self.pci_addr.clear();
            if let Err(release) = bind_to_host(&self.host.config.paths, &self.device) {
                tracing::warn!(bdf = %self.device.bdf, error = %release, "Failed to return device to host driver");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn detach(&mut self, netns_created: bool, _netns_path: &Path) -> VcResult<()> {
        if !netns_created {
            return Ok(());
        }
        bind_to_host(&self.host.config.paths, &self.device)?;
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
        EndpointState::Physical {
            iface_name: self.iface_name.clone(),
            hard_addr: self.hard_addr.clone(),
            bdf: self.device.bdf.clone(),
            driver: self.device.driver.clone(),
            vendor_device_id: self.device.vendor_device_id.clone(),
        }
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::Physical;
        match state {
            EndpointState::Physical {
                iface_name,
                hard_addr,
                bdf,
                driver,
                vendor_device_id,
            } => {
                self.iface_name = iface_name;
                self.hard_addr = hard_addr;
                self.device = PciDevice {
                    bdf,
                    driver,
                    vendor_device_id,
                };
            }
            other => tracing::warn!(found = %other.endpoint_type(), "Ignoring state of another endpoint type"),
        }
    }
}
