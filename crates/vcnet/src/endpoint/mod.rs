//! Sandbox network endpoints.
//!
//! An endpoint is one guest network interface together with the host-side
//! wiring that feeds it. The set of variants is closed: [`Endpoint`] is
//! sealed and every implementation carries an [`EndpointType`] tag that
//! also keys its persisted [`EndpointState`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use vcnet_common::{VcError, VcResult};
use vcnet_network::{InterworkingModel, NetworkInterfacePair, VmNetworkWiring};

use crate::host::HostNetwork;
use crate::hypervisor::Hypervisor;
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

mod ipvlan;
mod macvtap;
mod physical;
mod tap;
mod veth;
mod vhost_user;
mod vlan;

pub use ipvlan::IpvlanEndpoint;
pub use macvtap::MacvtapEndpoint;
pub use physical::PhysicalEndpoint;
pub use tap::TapEndpoint;
pub use veth::VethEndpoint;
pub use vhost_user::{VhostUserEndpoint, find_vhost_user_socket};
pub use vlan::VlanEndpoint;

/// Endpoint variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointType {
    /// Physical NIC passed through with VFIO.
    Physical,
    /// veth pair bridged into a tap.
    Veth,
    /// vhost-user socket backend.
    VhostUser,
    /// Macvtap device opened directly by the hypervisor.
    Macvtap,
    /// Standalone tap device.
    Tap,
    /// IPVlan link mirrored into a tap.
    Ipvlan,
    /// VLAN link bridged into a tap.
    Vlan,
}

impl EndpointType {
    /// Tag string used in persisted records and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Veth => "veth",
            Self::VhostUser => "vhost-user",
            Self::Macvtap => "macvtap",
            Self::Tap => "tap",
            Self::Ipvlan => "ipvlan",
            Self::Vlan => "vlan",
        }
    }

    /// Variant serving an rtnetlink link kind.
    ///
    /// vhost-user endpoints are not recognisable from the link kind; they are
    /// found by their socket instead.
    #[must_use]
    pub fn from_link_type(link_type: &str) -> Option<Self> {
        match link_type {
            "device" => Some(Self::Physical),
            "veth" => Some(Self::Veth),
            "macvtap" => Some(Self::Macvtap),
            "tuntap" | "tap" => Some(Self::Tap),
            "ipvlan" => Some(Self::Ipvlan),
            "vlan" => Some(Self::Vlan),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = VcError;

    fn from_str(s: &str) -> VcResult<Self> {
        match s {
            "physical" => Ok(Self::Physical),
            "veth" => Ok(Self::Veth),
            "vhost-user" => Ok(Self::VhostUser),
            "macvtap" => Ok(Self::Macvtap),
            "tap" => Ok(Self::Tap),
            "ipvlan" => Ok(Self::Ipvlan),
            "vlan" => Ok(Self::Vlan),
            other => Err(VcError::InvalidInput {
                message: format!("unknown endpoint type: {other}"),
            }),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;

/// One guest network interface and its host wiring.
///
/// Endpoints are owned by a single sandbox and are not internally
/// synchronized; callers serialize lifecycle calls per endpoint.
#[async_trait]
pub trait Endpoint: fmt::Debug + Send + Sync + Sealed {
    /// Last properties handed to the endpoint.
    fn properties(&self) -> &NetworkInfo;

    /// Replace the properties.
    fn set_properties(&mut self, properties: NetworkInfo);

    /// Guest-visible interface name.
    fn name(&self) -> &str;

    /// MAC address presented to the guest.
    fn hardware_addr(&self) -> &str;

    /// Variant tag.
    fn endpoint_type(&self) -> EndpointType;

    /// Guest PCI address, empty until attached.
    fn pci_addr(&self) -> &str;

    /// Record the guest PCI address. Called by the hypervisor.
    fn set_pci_addr(&mut self, pci_addr: String);

    /// Network pair, for variants built on one.
    fn network_pair(&self) -> Option<&NetworkInterfacePair>;

    /// Wire the endpoint and add it to the boot-time device list.
    ///
    /// Must not be called twice for the same boot.
    async fn attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()>;

    /// Tear down the host wiring created by [`Endpoint::attach`].
    ///
    /// A namespace the runtime did not create is left alone; a namespace that
    /// has already disappeared is not an error.
    async fn detach(&mut self, netns_created: bool, netns_path: &Path) -> VcResult<()>;

    /// Wire the endpoint and plug it into the running VM.
    async fn hot_attach(&mut self, hypervisor: &dyn Hypervisor) -> VcResult<()>;

    /// Unplug the endpoint from the running VM and tear down its wiring.
    async fn hot_detach(
        &mut self,
        hypervisor: &dyn Hypervisor,
        netns_created: bool,
        netns_path: &Path,
    ) -> VcResult<()>;

    /// Snapshot of the host-independent state.
    fn save(&self) -> EndpointState;

    /// Restore from a snapshot. The type tag is reset to this variant's tag.
    fn load(&mut self, state: EndpointState);
}

/// Build the endpoint serving `info`.
///
/// A vhost-user socket for one of the interface's addresses takes priority;
/// otherwise the variant follows the link kind.
pub fn create_endpoint(
    host: &HostNetwork,
    info: &NetworkInfo,
    idx: i64,
    model: InterworkingModel,
) -> VcResult<Box<dyn Endpoint>> {
    if let Some(socket) = find_vhost_user_socket(&host.config.paths.vhost_user, &info.addrs) {
        tracing::info!(iface = %info.iface.name, socket = %socket.display(), "Found vhost-user socket");
        return Ok(Box::new(VhostUserEndpoint::create(info.clone(), socket)));
    }

    let endpoint_type = EndpointType::from_link_type(&info.iface.link_type).ok_or_else(|| {
        VcError::unsupported(format!(
            "link type '{}' of {}",
            info.iface.link_type, info.iface.name
        ))
    })?;

    tracing::debug!(iface = %info.iface.name, %endpoint_type, idx, "Creating endpoint");

    let mut endpoint: Box<dyn Endpoint> = match endpoint_type {
        EndpointType::Physical => Box::new(PhysicalEndpoint::from_netdev(host.clone(), info.clone())?),
        EndpointType::Veth => Box::new(VethEndpoint::create(host.clone(), idx, &info.iface.name, model)?),
        EndpointType::Vlan => Box::new(VlanEndpoint::create(host.clone(), idx, &info.iface.name, model)?),
        EndpointType::Ipvlan => Box::new(IpvlanEndpoint::create(host.clone(), idx, &info.iface.name)?),
        EndpointType::Macvtap => Box::new(MacvtapEndpoint::create(host.clone(), info.clone())),
        EndpointType::Tap => Box::new(TapEndpoint::create(host.clone(), idx, &info.iface.name)?),
        EndpointType::VhostUser => {
            return Err(VcError::InvalidInput {
                message: format!("no vhost-user socket for {}", info.iface.name),
            });
        }
    };

    endpoint.set_properties(info.clone());
    Ok(endpoint)
}

/// Bridge the endpoint's pair into a tap the hypervisor can consume.
///
/// The `ip`/`tc` work runs on the blocking pool.
pub async fn connect_vm_network(
    host: &HostNetwork,
    endpoint: &dyn Endpoint,
    hypervisor: &dyn Hypervisor,
) -> VcResult<()> {
    let pair = endpoint.network_pair().cloned().ok_or_else(|| VcError::InvalidInput {
        message: format!("{} endpoint has no network pair", endpoint.endpoint_type()),
    })?;
    let queues = hypervisor.network_queues();
    on_host(host, move |wiring| wiring.connect(&pair, queues)).await
}

/// Undo [`connect_vm_network`].
pub fn disconnect_vm_network(
    wiring: &dyn VmNetworkWiring,
    pair: &NetworkInterfacePair,
) -> VcResult<()> {
    wiring.disconnect(pair)
}

/// Validate a caller-supplied interface index.
pub(crate) fn checked_index(idx: i64) -> VcResult<u32> {
    u32::try_from(idx).map_err(|_| VcError::InvalidInput {
        message: format!("invalid network endpoint index: {idx}"),
    })
}

/// Error for lifecycle operations a variant does not implement.
pub(crate) fn unsupported(operation: &str, endpoint_type: EndpointType) -> VcError {
    VcError::unsupported(format!("{operation} for {endpoint_type} endpoint"))
}

/// Put the properties' addresses back on `link`. Failures are only logged.
pub(crate) async fn reapply_addresses(host: &HostNetwork, link: &str, addrs: &[IpNet]) {
    if addrs.is_empty() {
        return;
    }
    let link_name = link.to_string();
    let addrs = addrs.to_vec();
    if let Err(e) = on_host(host, move |wiring| wiring.add_addresses(&link_name, &addrs)).await {
        tracing::warn!(link, error = %e, "Failed to reapply addresses");
    }
}

/// Take the properties' addresses off `link`. Failures are only logged.
pub(crate) fn release_addresses(wiring: &dyn VmNetworkWiring, link: &str, addrs: &[IpNet]) {
    if addrs.is_empty() {
        return;
    }
    if let Err(e) = wiring.remove_addresses(link, addrs) {
        tracing::warn!(link, error = %e, "Failed to remove addresses");
    }
}

/// Run host wiring `op` on the blocking pool.
pub(crate) async fn on_host<F>(host: &HostNetwork, op: F) -> VcResult<()>
where
    F: FnOnce(&dyn VmNetworkWiring) -> VcResult<()> + Send + 'static,
{
    let wiring = Arc::clone(&host.wiring);
    tokio::task::spawn_blocking(move || op(wiring.as_ref()))
        .await
        .map_err(|e| VcError::Internal {
            message: format!("host wiring task failed: {e}"),
        })?
}

/// Run `op` inside the namespace at `netns_path` on the blocking pool.
///
/// A namespace that no longer exists counts as already torn down.
pub(crate) async fn in_netns<F>(host: &HostNetwork, netns_path: &Path, op: F) -> VcResult<()>
where
    F: FnOnce(&dyn VmNetworkWiring) -> VcResult<()> + Send + 'static,
{
    let netns = Arc::clone(&host.netns);
    let path = netns_path.to_path_buf();

    let result = on_host(host, move |wiring| netns.execute(&path, Box::new(move || op(wiring))))
        .await;

    match result {
        Err(e) if e.is_netns_not_found() => {
            tracing::info!(netns = %netns_path.display(), "Network namespace already gone");
            Ok(())
        }
        other => other,
    }
}
