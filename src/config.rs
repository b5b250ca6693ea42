//! Configuration management for Gatekeeper.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::OperationRules;

/// Prefix for environment overrides, e.g. `GATEKEEPER__SWEEP__ENABLED=false`.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Record sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Limits per protected operation
    #[serde(default)]
    pub operations: OperationRules,
}

/// Record sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the background sweeper
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Seconds a record may sit idle before it is swept
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval(),
            retention_secs: default_retention(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_retention() -> u64 {
    600
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: GatekeeperConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the sweep settings and every operation rule.
    pub fn validate(&self) -> Result<()> {
        if self.sweep.interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "sweep.interval_secs must be greater than zero".to_string(),
            ));
        }
        self.operations.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LOGIN, VERIFY_OTP};
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::default();
        assert!(config.sweep.enabled);
        assert_eq!(config.sweep.interval(), Duration::from_secs(600));
        assert_eq!(config.sweep.retention(), Duration::from_secs(600));
        assert!(config.operations.get(LOGIN).is_some());
        assert!(config.operations.get(VERIFY_OTP).is_some());
    }

    #[test]
    fn test_from_yaml_overrides_operations() {
        let yaml = r#"
sweep:
  enabled: false
operations:
  login:
    max_requests: 7
    window_ms: 60000
    block_duration_ms: 60000
"#;
        let config = assert_ok!(GatekeeperConfig::from_yaml(yaml));
        assert!(!config.sweep.enabled);
        assert_eq!(config.sweep.interval_secs, 600);

        let login = config.operations.get(LOGIN).unwrap();
        assert_eq!(login.limit.max_requests, 7);
        assert!(login.limit.use_progressive_blocking);
        assert!(config.operations.get(VERIFY_OTP).is_none());
    }

    #[test]
    fn test_from_yaml_rejects_invalid_rule() {
        let yaml = r#"
operations:
  login:
    max_requests: 0
    window_ms: 60000
    block_duration_ms: 60000
"#;
        assert_err!(GatekeeperConfig::from_yaml(yaml));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let err = assert_err!(GatekeeperConfig::from_yaml("sweep:\n  interval_secs: 0\n"));
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn test_disabled_sweep_still_needs_interval() {
        let config = GatekeeperConfig {
            sweep: SweepConfig {
                enabled: false,
                interval_secs: 0,
                retention_secs: 600,
            },
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = assert_ok!(GatekeeperConfig::load(None));
        assert!(config.operations.get(LOGIN).is_some());
    }
}
