//! Configuration management for quotaguard.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};
use crate::ratelimit::{ChatConfig, GateConfig, RouteRules, TierPolicies};
use crate::store::SharedStoreConfig;

/// Prefix of environment variables overriding file settings, e.g.
/// `QUOTAGUARD__SHARED_STORE__URL`.
pub const ENV_PREFIX: &str = "QUOTAGUARD";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaGuardConfig {
    /// Shared counter store used for IP throttling
    #[serde(default)]
    pub shared_store: SharedStoreConfig,

    /// IP throttles applied to requests
    #[serde(default)]
    pub gate: GateConfig,

    /// Per-user chat quotas by tier
    #[serde(default)]
    pub chat: ChatConfig,
}

impl QuotaGuardConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `QUOTAGUARD__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(QuotaError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: QuotaGuardConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QuotaGuardConfig =
            serde_yaml::from_str(yaml).map_err(|e| QuotaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured policy can be evaluated.
    pub fn validate(&self) -> Result<()> {
        self.route_rules()?;
        self.tier_policies()?;
        Ok(())
    }

    pub fn route_rules(&self) -> Result<RouteRules> {
        RouteRules::compile(&self.gate)
    }

    pub fn tier_policies(&self) -> Result<TierPolicies> {
        TierPolicies::from_config(&self.chat)
            .map_err(|e| QuotaError::Config(format!("chat policy: {}", e)))
    }
}
