//! Network interface pairs and the factory that builds them.
//!
//! A pair couples the container-side virtual interface (the one the
//! container runtime found in the network namespace) with the tap device
//! that is handed to the hypervisor.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use vcnet_common::{HardwareAddr, VcError, VcResult};

use crate::config::NetworkConfig;
use crate::model::InterworkingModel;

/// A single link descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Link name.
    pub name: String,
    /// MAC address, colon separated.
    pub hard_addr: String,
    /// Addresses configured on the link.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addrs: Vec<IpNet>,
    /// Link MTU, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// The tap side of a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapInterface {
    /// Unique identifier of this tap.
    pub id: String,
    /// Auxiliary link name (the bridge for bridged wiring).
    pub name: String,
    /// The tap link itself.
    pub tap_iface: NetworkInterface,
}

/// A virtual interface and the tap device bridging it into the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfacePair {
    /// Slot of this interface within the sandbox.
    pub index: u32,
    /// Tap side.
    pub tap: TapInterface,
    /// Container side.
    pub virt_iface: NetworkInterface,
    /// How the two sides are joined.
    pub model: InterworkingModel,
}

impl NetworkInterfacePair {
    /// Synthesized container-side name for a slot.
    #[must_use]
    pub fn virt_name(index: u32) -> String {
        format!("eth{index}")
    }

    /// Synthesized tap name for a slot.
    #[must_use]
    pub fn tap_name(index: u32) -> String {
        format!("tap{index}_vc")
    }

    /// Synthesized bridge name for a slot.
    #[must_use]
    pub fn bridge_name(index: u32) -> String {
        format!("br{index}_vc")
    }

    /// Name of the tap link.
    #[must_use]
    pub fn tap_link(&self) -> &str {
        &self.tap.tap_iface.name
    }

    /// Name of the container-side link.
    #[must_use]
    pub fn virt_link(&self) -> &str {
        &self.virt_iface.name
    }
}

/// Builds network pairs for endpoints.
pub trait PairFactory: Send + Sync {
    /// Build the pair for slot `index`.
    ///
    /// A non-empty `if_name` names the container-side interface; otherwise a
    /// name derived from `index` is used.
    fn create_pair(
        &self,
        index: u32,
        if_name: &str,
        model: InterworkingModel,
    ) -> VcResult<NetworkInterfacePair>;
}

/// Pair factory backed by the host's sysfs view.
#[derive(Debug, Clone)]
pub struct HostPairFactory {
    config: NetworkConfig,
}

impl HostPairFactory {
    /// Create a factory.
    #[must_use]
    pub const fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    fn link_exists(&self, name: &str) -> bool {
        self.config.paths.class_net(name).exists()
    }

    fn check_capabilities(&self, model: InterworkingModel) -> VcResult<()> {
        if !self.config.verify_host_capabilities {
            return Ok(());
        }
        match model.required_module() {
            Some(module) if !self.config.paths.module(module).exists() => {
                Err(VcError::unsupported(format!(
                    "{model} interworking (kernel module '{module}' not loaded)"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl PairFactory for HostPairFactory {
    fn create_pair(
        &self,
        index: u32,
        if_name: &str,
        model: InterworkingModel,
    ) -> VcResult<NetworkInterfacePair> {
        let model = model.resolve(self.config.interworking_model);
        self.check_capabilities(model)?;

        let tap_name = NetworkInterfacePair::tap_name(index);
        let bridge_name = NetworkInterfacePair::bridge_name(index);
        for name in [&tap_name, &bridge_name] {
            if self.link_exists(name) {
                return Err(VcError::InterfaceExists { name: name.clone() });
            }
        }

        let hard_addr = HardwareAddr::generate_private().to_string();
        let virt_name = if if_name.is_empty() {
            NetworkInterfacePair::virt_name(index)
        } else {
            if_name.to_string()
        };

        tracing::debug!(index, virt = %virt_name, tap = %tap_name, %model, "Created network pair");

        Ok(NetworkInterfacePair {
            index,
            tap: TapInterface {
                id: uuid::Uuid::new_v4().to_string(),
                name: bridge_name,
                tap_iface: NetworkInterface {
                    name: tap_name,
                    hard_addr: hard_addr.clone(),
                    ..NetworkInterface::default()
                },
            },
            virt_iface: NetworkInterface {
                name: virt_name,
                hard_addr,
                ..NetworkInterface::default()
            },
            model,
        })
    }
}
