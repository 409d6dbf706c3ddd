//! Recording stand-ins for the host collaborators and the hypervisor.
#![allow(dead_code)]

use std::collections::HashSet;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use async_trait::async_trait;
use ipnet::IpNet;
use parking_lot::Mutex;
use vcnet::{DeviceCategory, Endpoint, EndpointType, HostNetwork, Hypervisor};
use vcnet_common::{VcError, VcResult, VcnetPaths};
use vcnet_network::{
    InterworkingModel, NamespaceExecutor, NetworkConfig, NetworkInterface, NetworkInterfacePair,
    NsOp, PairFactory, TapInterface, VmNetworkWiring,
};

/// PCI address the mock hypervisor hands out.
pub const PCI_ADDR: &str = "0000:00:03.0";

/// PCI function behind `ens3` in [`fake_host`].
pub const BDF: &str = "0000:03:00.0";

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatePair {
        index: u32,
        if_name: String,
        model: InterworkingModel,
    },
    Connect {
        virt: String,
        tap: String,
        queues: u32,
    },
    Disconnect {
        virt: String,
        tap: String,
    },
    CreateTap(String),
    DeleteTap(String),
    AddAddresses(String),
    RemoveAddresses(String),
    EnterNetns(PathBuf),
    LeaveNetns(PathBuf),
    AddDevice(EndpointType),
    HotAddDevice(EndpointType),
    HotRemoveDevice(EndpointType),
}

/// Shared, ordered call log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn factory_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::CreatePair { .. }))
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect { .. }))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, Call::Disconnect { .. }))
    }
}

/// Factory that names the container side `iface{index}` unless told otherwise.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    journal: Journal,
    /// Synthesize `iface{index}` even when a name is supplied.
    pub ignore_names: AtomicBool,
}

impl PairFactory for RecordingFactory {
    fn create_pair(
        &self,
        index: u32,
        if_name: &str,
        model: InterworkingModel,
    ) -> VcResult<NetworkInterfacePair> {
        self.journal.push(Call::CreatePair {
            index,
            if_name: if_name.to_string(),
            model,
        });

        let model = model.resolve(InterworkingModel::TcFilter);
        let hard_addr = format!("02:00:00:00:00:{index:02x}");
        let virt_name = if if_name.is_empty() || self.ignore_names.load(Ordering::SeqCst) {
            format!("iface{index}")
        } else {
            if_name.to_string()
        };

        Ok(NetworkInterfacePair {
            index,
            tap: TapInterface {
                id: format!("tap-id-{index}"),
                name: NetworkInterfacePair::bridge_name(index),
                tap_iface: NetworkInterface {
                    name: NetworkInterfacePair::tap_name(index),
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

/// Wiring that records instead of touching the host.
#[derive(Debug, Default)]
pub struct RecordingWiring {
    journal: Journal,
    pub fail_connect: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_addresses: AtomicBool,
    /// Thread the last `connect` ran on.
    pub connect_thread: Mutex<Option<ThreadId>>,
}

impl VmNetworkWiring for RecordingWiring {
    fn connect(&self, pair: &NetworkInterfacePair, queues: u32) -> VcResult<()> {
        *self.connect_thread.lock() = Some(std::thread::current().id());
        self.journal.push(Call::Connect {
            virt: pair.virt_link().to_string(),
            tap: pair.tap_link().to_string(),
            queues,
        });
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VcError::wiring("bridge add failed"));
        }
        Ok(())
    }

    fn disconnect(&self, pair: &NetworkInterfacePair) -> VcResult<()> {
        self.journal.push(Call::Disconnect {
            virt: pair.virt_link().to_string(),
            tap: pair.tap_link().to_string(),
        });
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(VcError::wiring("link delete failed"));
        }
        Ok(())
    }

    fn create_tap(&self, tap: &TapInterface, _queues: u32) -> VcResult<()> {
        self.journal.push(Call::CreateTap(tap.tap_iface.name.clone()));
        Ok(())
    }

    fn delete_tap(&self, tap: &TapInterface) -> VcResult<()> {
        self.journal.push(Call::DeleteTap(tap.tap_iface.name.clone()));
        Ok(())
    }

    fn add_addresses(&self, link: &str, _addrs: &[IpNet]) -> VcResult<()> {
        self.journal.push(Call::AddAddresses(link.to_string()));
        if self.fail_addresses.load(Ordering::SeqCst) {
            return Err(VcError::wiring("address add failed"));
        }
        Ok(())
    }

    fn remove_addresses(&self, link: &str, _addrs: &[IpNet]) -> VcResult<()> {
        self.journal.push(Call::RemoveAddresses(link.to_string()));
        if self.fail_addresses.load(Ordering::SeqCst) {
            return Err(VcError::wiring("address del failed"));
        }
        Ok(())
    }
}

/// Namespace executor that brackets the op with enter/leave entries.
#[derive(Debug, Default)]
pub struct RecordingNetns {
    journal: Journal,
    missing: Mutex<HashSet<PathBuf>>,
}

impl RecordingNetns {
    /// Make `path` look like a namespace that is already gone.
    pub fn remove(&self, path: impl Into<PathBuf>) {
        self.missing.lock().insert(path.into());
    }
}

impl NamespaceExecutor for RecordingNetns {
    fn execute(&self, path: &Path, op: NsOp<'_>) -> VcResult<()> {
        if self.missing.lock().contains(path) {
            return Err(VcError::NetnsNotFound {
                path: path.display().to_string(),
            });
        }
        self.journal.push(Call::EnterNetns(path.to_path_buf()));
        let result = op();
        self.journal.push(Call::LeaveNetns(path.to_path_buf()));
        result
    }
}

/// Hypervisor that assigns [`PCI_ADDR`] to every device.
#[derive(Debug, Default)]
pub struct MockHypervisor {
    journal: Journal,
    /// Assign the slot, then refuse the device.
    pub reject: AtomicBool,
    pub queues: u32,
    categories: Mutex<Vec<DeviceCategory>>,
}

impl MockHypervisor {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            queues: 1,
            ..Self::default()
        }
    }

    pub fn rejecting(journal: &Journal) -> Self {
        let hv = Self::new(journal);
        hv.reject.store(true, Ordering::SeqCst);
        hv
    }

    pub fn with_queues(mut self, queues: u32) -> Self {
        self.queues = queues;
        self
    }

    pub fn categories(&self) -> Vec<DeviceCategory> {
        self.categories.lock().clone()
    }

    fn plug(&self, endpoint: &mut dyn Endpoint, category: DeviceCategory) -> VcResult<()> {
        self.categories.lock().push(category);
        endpoint.set_pci_addr(PCI_ADDR.to_string());
        if self.reject.load(Ordering::SeqCst) {
            return Err(VcError::Hypervisor {
                message: "no free PCI slot".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn add_device(
        &self,
        endpoint: &mut dyn Endpoint,
        category: DeviceCategory,
    ) -> VcResult<()> {
        self.journal.push(Call::AddDevice(endpoint.endpoint_type()));
        self.plug(endpoint, category)
    }

    async fn hot_add_device(
        &self,
        endpoint: &mut dyn Endpoint,
        category: DeviceCategory,
    ) -> VcResult<()> {
        self.journal.push(Call::HotAddDevice(endpoint.endpoint_type()));
        self.plug(endpoint, category)
    }

    async fn hot_remove_device(
        &self,
        endpoint: &mut dyn Endpoint,
        _category: DeviceCategory,
    ) -> VcResult<()> {
        self.journal.push(Call::HotRemoveDevice(endpoint.endpoint_type()));
        Ok(())
    }

    fn network_queues(&self) -> u32 {
        self.queues
    }
}

/// Host collaborators wired to one journal.
pub struct Harness {
    pub journal: Journal,
    pub factory: Arc<RecordingFactory>,
    pub wiring: Arc<RecordingWiring>,
    pub netns: Arc<RecordingNetns>,
    pub host: HostNetwork,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let journal = Journal::default();
        let factory = Arc::new(RecordingFactory {
            journal: journal.clone(),
            ..RecordingFactory::default()
        });
        let wiring = Arc::new(RecordingWiring {
            journal: journal.clone(),
            ..RecordingWiring::default()
        });
        let netns = Arc::new(RecordingNetns {
            journal: journal.clone(),
            ..RecordingNetns::default()
        });
        let host = HostNetwork::new(config)
            .with_factory(factory.clone())
            .with_wiring(wiring.clone())
            .with_netns(netns.clone());

        Self {
            journal,
            factory,
            wiring,
            netns,
            host,
        }
    }

    pub fn hypervisor(&self) -> MockHypervisor {
        MockHypervisor::new(&self.journal)
    }

    pub fn rejecting_hypervisor(&self) -> MockHypervisor {
        MockHypervisor::rejecting(&self.journal)
    }
}

/// A sysfs tree with one i40e function behind `ens3`, and a `/dev` with a
/// macvtap node for ifindex 7.
pub fn fake_host() -> (tempfile::TempDir, NetworkConfig) {
    let dir = tempfile::tempdir().unwrap();
    let sys = dir.path().join("sys");
    let dev_dir = sys.join("devices/pci0000:00").join(BDF);
    std::fs::create_dir_all(&dev_dir).unwrap();
    std::fs::create_dir_all(sys.join("bus/pci/devices")).unwrap();
    std::fs::create_dir_all(sys.join("bus/pci/drivers/i40e")).unwrap();
    std::fs::create_dir_all(sys.join("bus/pci/drivers/vfio-pci")).unwrap();
    std::fs::create_dir_all(sys.join("kernel/iommu_groups/12")).unwrap();
    std::fs::create_dir_all(sys.join("class/net/ens3")).unwrap();
    symlink(&dev_dir, sys.join("bus/pci/devices").join(BDF)).unwrap();
    symlink(&dev_dir, sys.join("class/net/ens3/device")).unwrap();
    symlink(sys.join("bus/pci/drivers/i40e"), dev_dir.join("driver")).unwrap();
    symlink(sys.join("kernel/iommu_groups/12"), dev_dir.join("iommu_group")).unwrap();
    std::fs::write(dev_dir.join("vendor"), "0x8086\n").unwrap();
    std::fs::write(dev_dir.join("device"), "0x1572\n").unwrap();

    let dev = dir.path().join("dev");
    std::fs::create_dir_all(&dev).unwrap();
    std::fs::write(dev.join("tap7"), b"").unwrap();

    let vhost = dir.path().join("vhost");
    std::fs::create_dir_all(&vhost).unwrap();

    let paths = VcnetPaths::with_root(dir.path().join("state"))
        .with_sysfs(&sys)
        .with_dev(&dev)
        .with_vhost_user(&vhost);
    (dir, NetworkConfig::default().with_paths(paths))
}

/// Flip one of the wiring failure switches.
pub fn set(flag: &AtomicBool) {
    flag.store(true, Ordering::SeqCst);
}
