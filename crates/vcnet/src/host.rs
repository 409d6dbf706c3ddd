//! Host collaborators an endpoint works through.

use std::fmt;
use std::sync::Arc;

use vcnet_network::{
    HostNamespaceExecutor, HostPairFactory, HostWiring, NamespaceExecutor, NetworkConfig,
    PairFactory, VmNetworkWiring,
};

/// The pair factory, bridging helpers and namespace executor used by
/// endpoints, plus the configuration they were built from.
///
/// Cloning is cheap; every endpoint of a sandbox holds a clone.
#[derive(Clone)]
pub struct HostNetwork {
    /// Subsystem configuration.
    pub config: Arc<NetworkConfig>,
    /// Builds network pairs.
    pub factory: Arc<dyn PairFactory>,
    /// Bridges pairs into taps.
    pub wiring: Arc<dyn VmNetworkWiring>,
    /// Runs teardown inside container namespaces.
    pub netns: Arc<dyn NamespaceExecutor>,
}

impl HostNetwork {
    /// Collaborators that act on the real host.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            factory: Arc::new(HostPairFactory::new(config.clone())),
            wiring: Arc::new(HostWiring::new(config.clone())),
            netns: Arc::new(HostNamespaceExecutor),
            config: Arc::new(config),
        }
    }

    /// Replace the pair factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn PairFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replace the bridging helpers.
    #[must_use]
    pub fn with_wiring(mut self, wiring: Arc<dyn VmNetworkWiring>) -> Self {
        self.wiring = wiring;
        self
    }

    /// Replace the namespace executor.
    #[must_use]
    pub fn with_netns(mut self, netns: Arc<dyn NamespaceExecutor>) -> Self {
        self.netns = netns;
        self
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl fmt::Debug for HostNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostNetwork")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
