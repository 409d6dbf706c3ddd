//! vhost-user endpoint.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ipnet::IpNet;
use vcnet_common::VcResult;
use vcnet_network::NetworkInterfacePair;

use super::{Endpoint, EndpointType, Sealed, unsupported};
use crate::hypervisor::{DeviceCategory, Hypervisor};
use crate::persist::EndpointState;
use crate::properties::NetworkInfo;

const SOCKET_DIR_PREFIX: &str = "vhostuser_";
const SOCKET_NAME: &str = "vhu.sock";

/// Find the vhost-user socket a backend published for one of `addrs`.
///
/// Backends create `<dir>/vhostuser_<ip>/vhu.sock`; the first address with
/// a socket wins.
#[must_use]
pub fn find_vhost_user_socket(dir: &Path, addrs: &[IpNet]) -> Option<PathBuf> {
    addrs.iter().find_map(|addr| {
        let candidate = dir
            .join(format!("{SOCKET_DIR_PREFIX}{}", addr.addr()))
            .join(SOCKET_NAME);
        let is_socket = std::fs::metadata(&candidate)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false);
        is_socket.then_some(candidate)
    })
}

/// A guest interface served by a userspace vhost-user backend.
#[derive(Debug)]
pub struct VhostUserEndpoint {
    iface_name: String,
    hard_addr: String,
    socket_path: PathBuf,
    properties: NetworkInfo,
    endpoint_type: EndpointType,
    pci_addr: String,
}

impl VhostUserEndpoint {
    /// Create the endpoint for `properties`, served through `socket_path`.
    #[must_use]
    pub fn create(properties: NetworkInfo, socket_path: PathBuf) -> Self {
        Self {
            iface_name: properties.iface.name.clone(),
            hard_addr: properties.iface.hard_addr.clone(),
            socket_path,
            properties,
            endpoint_type: EndpointType::VhostUser,
            pci_addr: String::new(),
        }
    }

    /// An endpoint with no socket yet, to be filled by [`Endpoint::load`].
    #[must_use]
    pub fn blank() -> Self {
        Self::create(NetworkInfo::default(), PathBuf::new())
    }

    /// Backend socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Sealed for VhostUserEndpoint {}

#[async_trait]
impl Endpoint for VhostUserEndpoint {
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
        let category = DeviceCategory::VhostUserNetwork {
            socket_path: self.socket_path.clone(),
        };
        if let Err(e) = hypervisor.add_device(&mut *self, category).await {
            self.pci_addr.clear();
            return Err(e);
        }
        Ok(())
    }

    async fn detach(&mut self, netns_created: bool, _netns_path: &Path) -> VcResult<()> {
        // The backend owns the socket and its host side.
        if netns_created {
            self.pci_addr.clear();
        }
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
        EndpointState::VhostUser {
            iface_name: self.iface_name.clone(),
            hard_addr: self.hard_addr.clone(),
            socket_path: self.socket_path.clone(),
        }
    }

    fn load(&mut self, state: EndpointState) {
        self.endpoint_type = EndpointType::VhostUser;
        match state {
            EndpointState::VhostUser {
                iface_name,
                hard_addr,
                socket_path,
            } => {
                self.iface_name = iface_name;
                self.hard_addr = hard_addr;
                self.socket_path = socket_path;
            }
            other => tracing::warn!(found = %other.endpoint_type(), "Ignoring state of another endpoint type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn finds_socket_for_address() {
        let dir = tempfile::tempdir().unwrap();
        let sock_dir = dir.path().join("vhostuser_10.0.0.5");
        std::fs::create_dir_all(&sock_dir).unwrap();
        let _listener = UnixListener::bind(sock_dir.join("vhu.sock")).unwrap();

        let addrs: Vec<IpNet> = vec!["10.0.0.4/24".parse().unwrap(), "10.0.0.5/24".parse().unwrap()];
        assert_eq!(
            find_vhost_user_socket(dir.path(), &addrs),
            Some(sock_dir.join("vhu.sock"))
        );
    }

    #[test]
    fn regular_file_is_not_a_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_dir = dir.path().join("vhostuser_10.0.0.5");
        std::fs::create_dir_all(&sock_dir).unwrap();
        std::fs::write(sock_dir.join("vhu.sock"), b"").unwrap();

        let addrs: Vec<IpNet> = vec!["10.0.0.5/24".parse().unwrap()];
        assert_eq!(find_vhost_user_socket(dir.path(), &addrs), None);
        assert_eq!(find_vhost_user_socket(dir.path(), &[]), None);
    }
}
