//! Host-side wiring between a network pair and the hypervisor's tap.

use ipnet::IpNet;
use vcnet_common::VcResult;

use crate::config::NetworkConfig;
use crate::link::{self, Step};
use crate::model::InterworkingModel;
use crate::pair::{NetworkInterfacePair, TapInterface};

/// Host bridging helpers shared by the tap-based endpoints.
pub trait VmNetworkWiring: Send + Sync {
    /// Join `pair` so the hypervisor can consume its tap.
    ///
    /// On failure, whatever was created is removed again before returning.
    fn connect(&self, pair: &NetworkInterfacePair, queues: u32) -> VcResult<()>;

    /// Undo [`VmNetworkWiring::connect`]. Links that are already gone are
    /// not an error.
    fn disconnect(&self, pair: &NetworkInterfacePair) -> VcResult<()>;

    /// Create a standalone tap device.
    fn create_tap(&self, tap: &TapInterface, queues: u32) -> VcResult<()>;

    /// Remove a standalone tap device.
    fn delete_tap(&self, tap: &TapInterface) -> VcResult<()>;

    /// Put `addrs` on `link`.
    fn add_addresses(&self, link: &str, addrs: &[IpNet]) -> VcResult<()>;

    /// Take `addrs` off `link`.
    fn remove_addresses(&self, link: &str, addrs: &[IpNet]) -> VcResult<()>;
}

/// Wiring through iproute2.
#[derive(Debug, Clone, Default)]
pub struct HostWiring {
    config: NetworkConfig,
}

impl HostWiring {
    /// Create host wiring.
    #[must_use]
    pub const fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    /// Steps that join `pair` for its interworking model.
    #[must_use]
    pub fn connect_plan(&self, pair: &NetworkInterfacePair, queues: u32) -> Vec<Step> {
        let queues = self.config.queues_for(queues);
        let tap = pair.tap_link();
        let virt = pair.virt_link();
        let mut steps = Vec::new();

        match pair.model.resolve(self.config.interworking_model) {
            InterworkingModel::Bridged => {
                let bridge = pair.tap.name.as_str();
                steps.push(Step::reversible(link::tuntap_add(tap, queues), link::link_delete(tap)));
                steps.push(Step::reversible(link::bridge_add(bridge), link::link_delete(bridge)));
                steps.push(Step::plain(link::set_master(tap, bridge)));
                steps.push(Step::reversible(link::set_master(virt, bridge), link::set_nomaster(virt)));
                push_mtu(&mut steps, tap, pair.virt_iface.mtu);
                steps.push(Step::plain(link::set_up(tap)));
                steps.push(Step::plain(link::set_up(bridge)));
            }
            InterworkingModel::MacVtap => {
                steps.push(Step::reversible(link::macvtap_add(virt, tap), link::link_delete(tap)));
                steps.push(Step::plain(link::set_address(tap, &pair.tap.tap_iface.hard_addr)));
                push_mtu(&mut steps, tap, pair.virt_iface.mtu);
                steps.push(Step::plain(link::set_up(tap)));
            }
            InterworkingModel::TcFilter => {
                steps.push(Step::reversible(link::tuntap_add(tap, queues), link::link_delete(tap)));
                push_mtu(&mut steps, tap, pair.virt_iface.mtu);
                steps.push(Step::plain(link::set_up(tap)));
                steps.push(Step::reversible(link::ingress_add(virt), link::ingress_del(virt)));
                steps.push(Step::plain(link::ingress_add(tap)));
                steps.push(Step::plain(link::mirred_redirect(virt, tap)));
                steps.push(Step::plain(link::mirred_redirect(tap, virt)));
            }
            InterworkingModel::None | InterworkingModel::Default => {}
        }

        steps
    }

    /// Steps that create a standalone tap.
    #[must_use]
    pub fn tap_plan(&self, tap: &TapInterface, queues: u32) -> Vec<Step> {
        let name = tap.tap_iface.name.as_str();
        let mut steps = vec![Step::reversible(
            link::tuntap_add(name, self.config.queues_for(queues)),
            link::link_delete(name),
        )];
        if !tap.tap_iface.hard_addr.is_empty() {
            steps.push(Step::plain(link::set_address(name, &tap.tap_iface.hard_addr)));
        }
        push_mtu(&mut steps, name, tap.tap_iface.mtu);
        steps.push(Step::plain(link::set_up(name)));
        steps
    }
}

fn push_mtu(steps: &mut Vec<Step>, link_name: &str, mtu: Option<u32>) {
    if let Some(mtu) = mtu {
        steps.push(Step::plain(link::set_mtu(link_name, mtu)));
    }
}

/// Run every removal, reporting the first failure.
fn remove_all(commands: Vec<link::LinkCommand>) -> VcResult<()> {
    let mut first_err = None;
    for cmd in commands {
        if let Err(e) = cmd.run_removal() {
            tracing::warn!(command = %cmd, error = %e, "Teardown step failed");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

impl VmNetworkWiring for HostWiring {
    fn connect(&self, pair: &NetworkInterfacePair, queues: u32) -> VcResult<()> {
        tracing::info!(
            virt = %pair.virt_link(),
            tap = %pair.tap_link(),
            model = %pair.model,
            queues,
            "Connecting VM network"
        );
        link::apply(&self.connect_plan(pair, queues))
    }

    fn disconnect(&self, pair: &NetworkInterfacePair) -> VcResult<()> {
        tracing::info!(virt = %pair.virt_link(), tap = %pair.tap_link(), "Disconnecting VM network");
        remove_all(link::teardown(&self.connect_plan(pair, 1)))
    }

    fn create_tap(&self, tap: &TapInterface, queues: u32) -> VcResult<()> {
        tracing::info!(tap = %tap.tap_iface.name, "Creating tap device");
        link::apply(&self.tap_plan(tap, queues))
    }

    fn delete_tap(&self, tap: &TapInterface) -> VcResult<()> {
        tracing::info!(tap = %tap.tap_iface.name, "Deleting tap device");
        link::link_delete(&tap.tap_iface.name).run_removal()
    }

    fn add_addresses(&self, link_name: &str, addrs: &[IpNet]) -> VcResult<()> {
        for addr in addrs {
            link::addr_replace(addr, link_name).run()?;
        }
        Ok(())
    }

    fn remove_addresses(&self, link_name: &str, addrs: &[IpNet]) -> VcResult<()> {
        remove_all(addrs.iter().map(|a| link::addr_del(a, link_name)).collect())
    }
}
