//! Host-observed network information attached to an endpoint.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Link attributes as read from the container's namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetlinkIface {
    /// Kernel interface index.
    pub index: u32,
    /// Interface name.
    pub name: String,
    /// MAC address.
    pub hard_addr: String,
    /// MTU.
    pub mtu: u32,
    /// rtnetlink link kind (`veth`, `vlan`, `macvtap`, `device`, ...).
    pub link_type: String,
}

/// A route through the interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination network; `None` is the default route.
    #[serde(default)]
    pub dest: Option<IpNet>,
    /// Next hop.
    #[serde(default)]
    pub gateway: Option<IpAddr>,
    /// Output device.
    #[serde(default)]
    pub device: String,
}

/// A static neighbour entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Neighbour address.
    pub ip: IpAddr,
    /// Neighbour MAC.
    pub hard_addr: String,
    /// Device the entry lives on.
    pub device: String,
}

/// Everything the runtime learned about one container interface.
///
/// Opaque to the endpoint wiring: it is stored and handed back as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    /// The link.
    pub iface: NetlinkIface,
    /// Addresses on the link.
    pub addrs: Vec<IpNet>,
    /// Routes through the link.
    pub routes: Vec<Route>,
    /// Static neighbours.
    pub neighbors: Vec<Neighbor>,
}

impl NetworkInfo {
    /// Info for a link with the given name and kind.
    #[must_use]
    pub fn for_link(name: impl Into<String>, link_type: impl Into<String>) -> Self {
        Self {
            iface: NetlinkIface {
                name: name.into(),
                link_type: link_type.into(),
                ..NetlinkIface::default()
            },
            ..Self::default()
        }
    }

    /// Add an address.
    #[must_use]
    pub fn with_addr(mut self, addr: IpNet) -> Self {
        self.addrs.push(addr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let info = NetworkInfo::for_link("eth0", "veth").with_addr("10.88.0.2/16".parse().unwrap());
        assert_eq!(info.iface.name, "eth0");
        assert_eq!(info.iface.link_type, "veth");
        assert_eq!(info.addrs.len(), 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let info: NetworkInfo =
            serde_json::from_str(r#"{"iface":{"name":"eth1"},"addrs":["fd00::2/64"]}"#).unwrap();
        assert_eq!(info.iface.name, "eth1");
        assert_eq!(info.iface.mtu, 0);
        assert!(info.routes.is_empty());
        assert_eq!(info.addrs[0].to_string(), "fd00::2/64");
    }
}
