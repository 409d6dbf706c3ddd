//! Network subsystem configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vcnet_common::{VcResult, VcnetPaths};

use crate::model::InterworkingModel;

/// Configuration shared by the pair factory, the wiring and the endpoints.
///
/// Loaded from TOML, every field is optional:
///
/// ```toml
/// interworking_model = "bridged"
/// max_queues = 4
///
/// [paths]
/// sysfs = "/sys"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Filesystem locations.
    pub paths: VcnetPaths,
    /// Model used when an endpoint asks for [`InterworkingModel::Default`].
    pub interworking_model: InterworkingModel,
    /// Refuse models whose kernel support is missing from sysfs.
    pub verify_host_capabilities: bool,
    /// Upper bound on tap queues regardless of what the hypervisor asks for.
    pub max_queues: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            paths: VcnetPaths::default(),
            interworking_model: InterworkingModel::TcFilter,
            verify_host_capabilities: true,
            max_queues: 8,
        }
    }
}

impl NetworkConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> VcResult<Self> {
        let mut config: Self = toml::from_str(input)?;
        // `default` is a request, not a model.
        config.interworking_model = config
            .interworking_model
            .resolve(InterworkingModel::TcFilter);
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> VcResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&input)?;
        tracing::debug!(path = %path.display(), model = %config.interworking_model, "Loaded network config");
        Ok(config)
    }

    /// Set the paths.
    #[must_use]
    pub fn with_paths(mut self, paths: VcnetPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the default interworking model.
    #[must_use]
    pub fn with_interworking_model(mut self, model: InterworkingModel) -> Self {
        self.interworking_model = model.resolve(InterworkingModel::TcFilter);
        self
    }

    /// Skip the sysfs capability checks.
    #[must_use]
    pub const fn without_capability_checks(mut self) -> Self {
        self.verify_host_capabilities = false;
        self
    }

    /// Set the queue cap.
    #[must_use]
    pub const fn with_max_queues(mut self, max_queues: u32) -> Self {
        self.max_queues = max_queues;
        self
    }

    /// Number of tap queues to open for a hypervisor asking for `requested`.
    #[must_use]
    pub fn queues_for(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_queues.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.interworking_model, InterworkingModel::TcFilter);
        assert!(config.verify_host_capabilities);
        assert_eq!(config.max_queues, 8);
    }

    #[test]
    fn builder_pattern() {
        let config = NetworkConfig::default()
            .with_interworking_model(InterworkingModel::Bridged)
            .without_capability_checks()
            .with_max_queues(2);

        assert_eq!(config.interworking_model, InterworkingModel::Bridged);
        assert!(!config.verify_host_capabilities);
        assert_eq!(config.queues_for(16), 2);
        assert_eq!(config.queues_for(0), 1);
    }

    #[test]
    fn parse_toml() {
        let config = NetworkConfig::from_toml_str(
            r#"
            interworking_model = "macvtap"
            max_queues = 4

            [paths]
            sysfs = "/fake/sys"
            "#,
        )
        .unwrap();

        assert_eq!(config.interworking_model, InterworkingModel::MacVtap);
        assert_eq!(config.max_queues, 4);
        assert_eq!(config.paths.sysfs, std::path::PathBuf::from("/fake/sys"));
        assert!(config.verify_host_capabilities);
    }

    #[test]
    fn toml_default_model_resolves() {
        let config = NetworkConfig::from_toml_str("interworking_model = \"default\"").unwrap();
        assert_eq!(config.interworking_model, InterworkingModel::TcFilter);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = NetworkConfig::from_toml_str("max_queues = \"many\"").unwrap_err();
        assert!(matches!(err, vcnet_common::VcError::Config { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.toml");
        std::fs::write(&path, "verify_host_capabilities = false\n").unwrap();

        let config = NetworkConfig::load(&path).unwrap();
        assert!(!config.verify_host_capabilities);
    }
}
