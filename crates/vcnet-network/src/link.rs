//! Link, qdisc and address commands.
//!
//! Host wiring is expressed as a list of [`Step`]s, each an `ip` or `tc`
//! invocation plus the command that undoes it. [`apply`] runs the steps in
//! order and unwinds the applied ones when a step fails.

use std::fmt;
use std::process::Command;

use ipnet::IpNet;
use vcnet_common::{VcError, VcResult};

/// Messages `ip`/`tc` print when the object to remove is already gone.
const MISSING_MARKERS: &[&str] = &[
    "Cannot find device",
    "does not exist",
    "No such device",
    "Cannot find specified qdisc",
    "Cannot assign requested address",
];

/// Program a [`LinkCommand`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// iproute2 `ip`.
    Ip,
    /// iproute2 `tc`.
    Tc,
}

impl Program {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Tc => "tc",
        }
    }
}

/// A single `ip` or `tc` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCommand {
    program: Program,
    args: Vec<String>,
}

impl LinkCommand {
    /// An `ip` command.
    pub fn ip<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: Program::Ip,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A `tc` command.
    pub fn tc<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: Program::Tc,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Program to run.
    #[must_use]
    pub const fn program(&self) -> Program {
        self.program
    }

    /// Arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the command.
    pub fn run(&self) -> VcResult<()> {
        tracing::debug!(command = %self, "Running link command");

        let output = Command::new(self.program.as_str())
            .args(&self.args)
            .output()
            .map_err(|e| VcError::wiring(format!("Failed to execute {self}: {e}")))?;

        if !output.status.success() {
            return Err(VcError::wiring(format!(
                "{self} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    /// Run a removal, treating an already-missing object as success.
    pub fn run_removal(&self) -> VcResult<()> {
        match self.run() {
            Err(VcError::Wiring { message })
                if MISSING_MARKERS.iter().any(|m| message.contains(m)) =>
            {
                tracing::debug!(command = %self, "Object already gone");
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Display for LinkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program.as_str(), self.args.join(" "))
    }
}

/// A forward command and the command undoing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Command applying the change.
    pub apply: LinkCommand,
    /// Command reverting it, if the change needs reverting.
    pub undo: Option<LinkCommand>,
}

impl Step {
    /// A step whose effect disappears with an earlier step's undo.
    #[must_use]
    pub const fn plain(apply: LinkCommand) -> Self {
        Self { apply, undo: None }
    }

    /// A step with an explicit undo.
    #[must_use]
    pub const fn reversible(apply: LinkCommand, undo: LinkCommand) -> Self {
        Self {
            apply,
            undo: Some(undo),
        }
    }
}

/// Run `steps` in order, unwinding applied steps on failure.
///
/// Unwinding is best-effort; the error of the failed step is returned.
pub fn apply(steps: &[Step]) -> VcResult<()> {
    apply_with(steps, LinkCommand::run, LinkCommand::run_removal)
}

/// Undo commands of `steps`, last step first.
#[must_use]
pub fn teardown(steps: &[Step]) -> Vec<LinkCommand> {
    steps.iter().rev().filter_map(|s| s.undo.clone()).collect()
}

pub(crate) fn apply_with(
    steps: &[Step],
    mut run: impl FnMut(&LinkCommand) -> VcResult<()>,
    mut undo: impl FnMut(&LinkCommand) -> VcResult<()>,
) -> VcResult<()> {
    for (applied, step) in steps.iter().enumerate() {
        if let Err(err) = run(&step.apply) {
            for cmd in teardown(&steps[..applied]) {
                if let Err(e) = undo(&cmd) {
                    tracing::warn!(command = %cmd, error = %e, "Rollback step failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// `ip tuntap add dev <name> mode tap vnet_hdr [multi_queue]`.
#[must_use]
pub fn tuntap_add(name: &str, queues: u32) -> LinkCommand {
    let mut args = vec!["tuntap", "add", "dev", name, "mode", "tap", "vnet_hdr"];
    if queues > 1 {
        args.push("multi_queue");
    }
    LinkCommand::ip(args)
}

/// `ip link add name <name> type bridge`.
#[must_use]
pub fn bridge_add(name: &str) -> LinkCommand {
    LinkCommand::ip(["link", "add", "name", name, "type", "bridge"])
}

/// `ip link add link <parent> name <name> type macvtap mode bridge`.
#[must_use]
pub fn macvtap_add(parent: &str, name: &str) -> LinkCommand {
    LinkCommand::ip([
        "link", "add", "link", parent, "name", name, "type", "macvtap", "mode", "bridge",
    ])
}

/// `ip link delete <name>`.
#[must_use]
pub fn link_delete(name: &str) -> LinkCommand {
    LinkCommand::ip(["link", "delete", name])
}

/// `ip link set <link> master <master>`.
#[must_use]
pub fn set_master(link: &str, master: &str) -> LinkCommand {
    LinkCommand::ip(["link", "set", link, "master", master])
}

/// `ip link set <link> nomaster`.
#[must_use]
pub fn set_nomaster(link: &str) -> LinkCommand {
    LinkCommand::ip(["link", "set", link, "nomaster"])
}

/// `ip link set <link> address <mac>`.
#[must_use]
pub fn set_address(link: &str, mac: &str) -> LinkCommand {
    LinkCommand::ip(["link", "set", link, "address", mac])
}

/// `ip link set <link> mtu <mtu>`.
#[must_use]
pub fn set_mtu(link: &str, mtu: u32) -> LinkCommand {
    LinkCommand::ip(vec![
        "link".to_string(),
        "set".to_string(),
        link.to_string(),
        "mtu".to_string(),
        mtu.to_string(),
    ])
}

/// `ip link set <link> up`.
#[must_use]
pub fn set_up(link: &str) -> LinkCommand {
    LinkCommand::ip(["link", "set", link, "up"])
}

/// `ip addr replace <addr> dev <link>`.
#[must_use]
pub fn addr_replace(addr: &IpNet, link: &str) -> LinkCommand {
    LinkCommand::ip(vec![
        "addr".to_string(),
        "replace".to_string(),
        addr.to_string(),
        "dev".to_string(),
        link.to_string(),
    ])
}

/// `ip addr del <addr> dev <link>`.
#[must_use]
pub fn addr_del(addr: &IpNet, link: &str) -> LinkCommand {
    LinkCommand::ip(vec![
        "addr".to_string(),
        "del".to_string(),
        addr.to_string(),
        "dev".to_string(),
        link.to_string(),
    ])
}

/// `tc qdisc add dev <link> ingress`.
#[must_use]
pub fn ingress_add(link: &str) -> LinkCommand {
    LinkCommand::tc(["qdisc", "add", "dev", link, "ingress"])
}

/// `tc qdisc del dev <link> ingress`.
#[must_use]
pub fn ingress_del(link: &str) -> LinkCommand {
    LinkCommand::tc(["qdisc", "del", "dev", link, "ingress"])
}

/// Redirect everything arriving on `from` out of `to`.
#[must_use]
pub fn mirred_redirect(from: &str, to: &str) -> LinkCommand {
    LinkCommand::tc([
        "filter", "add", "dev", from, "parent", "ffff:", "protocol", "all", "u32", "match",
        "u8", "0", "0", "action", "mirred", "egress", "redirect", "dev", to,
    ])
}
