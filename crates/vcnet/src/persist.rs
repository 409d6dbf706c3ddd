//! Endpoint state persistence.
//!
//! Only host-independent state is stored: kernel objects (links, open
//! descriptors, PCI bindings) are re-derived or re-created after restore.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vcnet_common::{VcError, VcResult, VcnetPaths};
use vcnet_network::{NetworkInterfacePair, TapInterface};

use crate::endpoint::{
    Endpoint, EndpointType, IpvlanEndpoint, MacvtapEndpoint, PhysicalEndpoint, TapEndpoint,
    VethEndpoint, VhostUserEndpoint, VlanEndpoint,
};
use crate::host::HostNetwork;

/// Persisted snapshot of one endpoint, tagged by its [`EndpointType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EndpointState {
    /// Physical NIC.
    Physical {
        /// Host interface name.
        iface_name: String,
        /// Interface MAC.
        hard_addr: String,
        /// PCI bus/device/function.
        bdf: String,
        /// Original host driver.
        driver: String,
        /// `"<vendor> <device>"` ids.
        vendor_device_id: String,
    },
    /// veth endpoint.
    Veth {
        /// Network pair.
        net_pair: NetworkInterfacePair,
    },
    /// vhost-user endpoint.
    VhostUser {
        /// Interface name.
        iface_name: String,
        /// Interface MAC.
        hard_addr: String,
        /// Backend socket.
        socket_path: PathBuf,
    },
    /// Macvtap endpoint. Its descriptors are reopened on attach.
    Macvtap,
    /// Tap endpoint.
    Tap {
        /// The tap device.
        tap_interface: TapInterface,
    },
    /// IPVlan endpoint.
    Ipvlan {
        /// Network pair.
        net_pair: NetworkInterfacePair,
    },
    /// VLAN endpoint.
    Vlan {
        /// Network pair.
        net_pair: NetworkInterfacePair,
    },
}

impl EndpointState {
    /// Tag of the endpoint this state belongs to.
    #[must_use]
    pub const fn endpoint_type(&self) -> EndpointType {
        match self {
            Self::Physical { .. } => EndpointType::Physical,
            Self::Veth { .. } => EndpointType::Veth,
            Self::VhostUser { .. } => EndpointType::VhostUser,
            Self::Macvtap => EndpointType::Macvtap,
            Self::Tap { .. } => EndpointType::Tap,
            Self::Ipvlan { .. } => EndpointType::Ipvlan,
            Self::Vlan { .. } => EndpointType::Vlan,
        }
    }
}

/// Rebuild an endpoint from its snapshot.
#[must_use]
pub fn restore_endpoint(state: EndpointState, host: &HostNetwork) -> Box<dyn Endpoint> {
    let host = host.clone();
    let mut endpoint: Box<dyn Endpoint> = match state.endpoint_type() {
        EndpointType::Physical => Box::new(PhysicalEndpoint::blank(host)),
        EndpointType::Veth => Box::new(VethEndpoint::blank(host)),
        EndpointType::VhostUser => Box::new(VhostUserEndpoint::blank()),
        EndpointType::Macvtap => Box::new(MacvtapEndpoint::blank(host)),
        EndpointType::Tap => Box::new(TapEndpoint::blank(host)),
        EndpointType::Ipvlan => Box::new(IpvlanEndpoint::blank(host)),
        EndpointType::Vlan => Box::new(VlanEndpoint::blank(host)),
    };
    endpoint.load(state);
    endpoint
}

/// Stores the endpoint snapshots of each sandbox as JSON.
#[derive(Debug, Clone)]
pub struct EndpointStore {
    paths: VcnetPaths,
}

impl EndpointStore {
    /// Create a store rooted at `paths.root`.
    #[must_use]
    pub const fn new(paths: VcnetPaths) -> Self {
        Self { paths }
    }

    /// Path of a sandbox's network state file.
    #[must_use]
    pub fn state_path(&self, sandbox_id: &str) -> PathBuf {
        self.paths.sandbox_network(sandbox_id)
    }

    /// Snapshot and save `endpoints`.
    pub fn save(&self, sandbox_id: &str, endpoints: &[Box<dyn Endpoint>]) -> VcResult<()> {
        let states: Vec<EndpointState> = endpoints.iter().map(|e| e.save()).collect();
        self.save_states(sandbox_id, &states)
    }

    /// Save snapshots, replacing any earlier file atomically.
    pub fn save_states(&self, sandbox_id: &str, states: &[EndpointState]) -> VcResult<()> {
        let path = self.state_path(sandbox_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(states)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(
            sandbox_id = %sandbox_id,
            endpoints = states.len(),
            path = %path.display(),
            "Saved network state"
        );

        Ok(())
    }

    /// Load snapshots.
    pub fn load_states(&self, sandbox_id: &str) -> VcResult<Vec<EndpointState>> {
        let path = self.state_path(sandbox_id);

        if !path.exists() {
            return Err(VcError::StateNotFound {
                sandbox_id: sandbox_id.to_string(),
            });
        }

        let json = std::fs::read_to_string(&path)?;
        let states: Vec<EndpointState> = serde_json::from_str(&json)?;

        tracing::debug!(
            sandbox_id = %sandbox_id,
            endpoints = states.len(),
            "Loaded network state"
        );

        Ok(states)
    }

    /// Load snapshots and rebuild the endpoints.
    pub fn restore(&self, sandbox_id: &str, host: &HostNetwork) -> VcResult<Vec<Box<dyn Endpoint>>> {
        Ok(self
            .load_states(sandbox_id)?
            .into_iter()
            .map(|state| restore_endpoint(state, host))
            .collect())
    }

    /// Delete a sandbox's network state.
    pub fn delete(&self, sandbox_id: &str) -> VcResult<()> {
        let path = self.state_path(sandbox_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
            tracing::debug!(sandbox_id = %sandbox_id, path = %path.display(), "Deleted network state");
        }
        Ok(())
    }

    /// Check if a sandbox has saved network state.
    #[must_use]
    pub fn exists(&self, sandbox_id: &str) -> bool {
        self.state_path(sandbox_id).exists()
    }
}
