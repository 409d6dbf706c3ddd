//! Interworking models.
//!
//! An interworking model is the technique used to move packets between the
//! container-side virtual interface and the tap device handed to the
//! hypervisor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vcnet_common::{VcError, VcResult};

/// How the host pair is bridged into the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterworkingModel {
    /// Use whatever the configuration names as default.
    #[default]
    Default,
    /// Linux bridge joining the virtual interface and the tap.
    Bridged,
    /// Macvtap link stacked on the virtual interface.
    MacVtap,
    /// Traffic control ingress filters mirroring packets both ways.
    TcFilter,
    /// No host-side wiring; the caller plumbs the tap itself.
    None,
}

impl InterworkingModel {
    /// Name used in configuration files and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Bridged => "bridged",
            Self::MacVtap => "macvtap",
            Self::TcFilter => "tcfilter",
            Self::None => "none",
        }
    }

    /// Replace [`InterworkingModel::Default`] with `fallback`.
    #[must_use]
    pub const fn resolve(self, fallback: Self) -> Self {
        match self {
            Self::Default => fallback,
            other => other,
        }
    }

    /// Kernel module under `/sys/module` the model depends on, if any.
    #[must_use]
    pub const fn required_module(&self) -> Option<&'static str> {
        match self {
            Self::Bridged => Some("bridge"),
            Self::MacVtap => Some("macvtap"),
            _ => None,
        }
    }
}

impl fmt::Display for InterworkingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterworkingModel {
    type Err = VcError;

    fn from_str(s: &str) -> VcResult<Self> {
        match s {
            "" | "default" => Ok(Self::Default),
            "bridged" => Ok(Self::Bridged),
            "macvtap" => Ok(Self::MacVtap),
            "tcfilter" => Ok(Self::TcFilter),
            "none" => Ok(Self::None),
            other => Err(VcError::InvalidInput {
                message: format!("unknown interworking model: {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names() {
        assert_eq!(InterworkingModel::Bridged.as_str(), "bridged");
        assert_eq!(InterworkingModel::TcFilter.to_string(), "tcfilter");
        assert_eq!(
            "macvtap".parse::<InterworkingModel>().unwrap(),
            InterworkingModel::MacVtap
        );
        assert!("enlightened".parse::<InterworkingModel>().is_err());
    }

    #[test]
    fn default_resolves_to_fallback() {
        let fallback = InterworkingModel::TcFilter;
        assert_eq!(InterworkingModel::Default.resolve(fallback), fallback);
        assert_eq!(
            InterworkingModel::Bridged.resolve(fallback),
            InterworkingModel::Bridged
        );
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&InterworkingModel::MacVtap).unwrap();
        assert_eq!(json, "\"macvtap\"");
    }
}
