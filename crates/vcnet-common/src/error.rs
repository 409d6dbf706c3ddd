//! Common error types for the vcnet subsystem.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`VcError`].
pub type VcResult<T> = Result<T, VcError>;

/// Common errors across the vcnet subsystem.
#[derive(Error, Diagnostic, Debug)]
pub enum VcError {
    /// Caller supplied input that can never succeed.
    #[error("Invalid input: {message}")]
    #[diagnostic(code(vcnet::invalid_input))]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// Host-side link, bridge, qdisc or address manipulation failed.
    #[error("Network wiring failed: {message}")]
    #[diagnostic(
        code(vcnet::network::wiring),
        help("Inspect the host links with `ip link` and `tc qdisc`")
    )]
    Wiring {
        /// The error message.
        message: String,
    },

    /// A synthesized interface name is already taken on the host.
    #[error("Network interface already exists: {name}")]
    #[diagnostic(
        code(vcnet::network::interface_exists),
        help("Pick another interface index or remove the stale link")
    )]
    InterfaceExists {
        /// The colliding interface name.
        name: String,
    },

    /// The hypervisor refused a device operation.
    #[error("Hypervisor rejected device: {message}")]
    #[diagnostic(code(vcnet::hypervisor))]
    Hypervisor {
        /// The error message.
        message: String,
    },

    /// The network namespace path does not exist (anymore).
    #[error("Network namespace not found: {path}")]
    #[diagnostic(code(vcnet::netns::not_found))]
    NetnsNotFound {
        /// The namespace path.
        path: String,
    },

    /// No endpoint state was saved for the sandbox.
    #[error("Network state not found for sandbox: {sandbox_id}")]
    #[diagnostic(code(vcnet::state::not_found))]
    StateNotFound {
        /// The sandbox ID.
        sandbox_id: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(vcnet::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(vcnet::serialization))]
    Serialization(String),

    /// Permission denied.
    #[error("Permission denied: {operation}")]
    #[diagnostic(
        code(vcnet::permission_denied),
        help("Network plumbing needs CAP_NET_ADMIN; try running with elevated privileges")
    )]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// Operation not supported by this endpoint or host.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(code(vcnet::unsupported))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vcnet::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(vcnet::internal), help("This is a bug, please report it"))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl VcError {
    /// Shorthand for an [`VcError::Unsupported`] error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Shorthand for a [`VcError::Wiring`] error.
    pub fn wiring(message: impl Into<String>) -> Self {
        Self::Wiring {
            message: message.into(),
        }
    }

    /// Whether this error reports a capability gap rather than a failure.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether this error reports a namespace that is already gone.
    #[must_use]
    pub const fn is_netns_not_found(&self) -> bool {
        matches!(self, Self::NetnsNotFound { .. })
    }
}

impl From<serde_json::Error> for VcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VcError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VcError::unsupported("hot attach for vlan endpoint");
        assert_eq!(
            err.to_string(),
            "Feature not supported: hot attach for vlan endpoint"
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VcError = io_err.into();
        assert!(matches!(err, VcError::Io(_)));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn netns_not_found_is_detectable() {
        let err = VcError::NetnsNotFound {
            path: "/var/run/netns/gone".to_string(),
        };
        assert!(err.is_netns_not_found());
        assert_eq!(
            err.to_string(),
            "Network namespace not found: /var/run/netns/gone"
        );
    }
}
