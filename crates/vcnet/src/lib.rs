//! # vcnet
//!
//! Network endpoints for VM-based container sandboxes.
//!
//! An [`Endpoint`] is one guest network interface together with the host
//! wiring that feeds it: a VLAN or veth link bridged into a tap, a macvtap
//! device, a physical NIC passed through with VFIO, a vhost-user socket and
//! so on. Endpoints hand themselves to a [`Hypervisor`] as devices and can
//! be snapshotted into [`EndpointState`] records for restore after a
//! runtime restart.
//!
//! ## Usage
//!
//! ```no_run
//! use vcnet::{HostNetwork, NetworkInfo, create_endpoint};
//! use vcnet_network::{InterworkingModel, NetworkConfig};
//!
//! # async fn example(hypervisor: &dyn vcnet::Hypervisor) -> vcnet_common::VcResult<()> {
//! let host = HostNetwork::new(NetworkConfig::default());
//! let info = NetworkInfo::for_link("eth0", "vlan");
//!
//! let mut endpoint = create_endpoint(&host, &info, 0, InterworkingModel::Default)?;
//! endpoint.attach(hypervisor).await?;
//!
//! // ... VM runs ...
//!
//! endpoint
//!     .detach(true, std::path::Path::new("/var/run/netns/sandbox"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod endpoint;
pub mod host;
pub mod hypervisor;
pub mod persist;
pub mod properties;

pub use endpoint::{
    Endpoint, EndpointType, IpvlanEndpoint, MacvtapEndpoint, PhysicalEndpoint, TapEndpoint,
    VethEndpoint, VhostUserEndpoint, VlanEndpoint, connect_vm_network, create_endpoint,
    disconnect_vm_network, find_vhost_user_socket,
};
pub use host::HostNetwork;
pub use hypervisor::{DeviceCategory, Hypervisor};
pub use persist::{EndpointState, EndpointStore, restore_endpoint};
pub use properties::{Neighbor, NetlinkIface, NetworkInfo, Route};
