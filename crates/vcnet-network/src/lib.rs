//! # vcnet-network
//!
//! Host network plumbing for vcnet endpoints.
//!
//! This crate owns everything that touches the host kernel: building
//! network pairs, wiring them into taps for the hypervisor, running work
//! inside a container's network namespace and rebinding PCI functions for
//! passthrough.

#![warn(missing_docs)]

pub mod config;
pub mod link;
pub mod model;
pub mod netns;
pub mod pair;
pub mod pci;
pub mod wiring;

pub use config::NetworkConfig;
pub use model::InterworkingModel;
pub use netns::{HostNamespaceExecutor, NamespaceExecutor, NsOp, run_in_netns};
pub use pair::{HostPairFactory, NetworkInterface, NetworkInterfacePair, PairFactory, TapInterface};
pub use pci::{PciDevice, VFIO_DRIVER, bind_to_host, bind_to_vfio, netdev_pci_device};
pub use wiring::{HostWiring, VmNetworkWiring};
