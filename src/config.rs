//! Service configuration file handling.
//!
//! The service reads one JSON document at startup. Every key has a default,
//! so an empty object (`{}`) is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::backend::{FakeConfig, KNOWN_DRIVERS};

/// Upper bounds for background actions, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub verify_secs: u64,
    pub clean_secs: u64,
    pub inspect_secs: u64,
    pub deploy_secs: u64,
    pub power_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            verify_secs: 60,
            clean_secs: 1800,
            inspect_secs: 1800,
            deploy_secs: 1800,
            power_secs: 60,
        }
    }
}

impl Timeouts {
    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }

    pub fn clean(&self) -> Duration {
        Duration::from_secs(self.clean_secs)
    }

    pub fn inspect(&self) -> Duration {
        Duration::from_secs(self.inspect_secs)
    }

    pub fn deploy(&self) -> Duration {
        Duration::from_secs(self.deploy_secs)
    }

    pub fn power(&self) -> Duration {
        Duration::from_secs(self.power_secs)
    }

    fn all(&self) -> [(&'static str, u64); 5] {
        [
            ("verify_secs", self.verify_secs),
            ("clean_secs", self.clean_secs),
            ("inspect_secs", self.inspect_secs),
            ("deploy_secs", self.deploy_secs),
            ("power_secs", self.power_secs),
        ]
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address
    pub listen_addr: String,
    /// Conductor name recorded as the reservation holder
    pub host: String,
    pub enabled_drivers: Vec<String>,
    /// Run clean steps on provide and tear down
    pub automated_clean: bool,
    /// Default log filter; `RUST_LOG` wins when set
    pub log_level: String,
    pub timeouts: Timeouts,
    pub fake_backend: FakeConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6385".to_string(),
            host: "localhost".to_string(),
            enabled_drivers: vec!["fake".to_string()],
            automated_clean: true,
            log_level: "info".to_string(),
            timeouts: Timeouts::default(),
            fake_backend: FakeConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Parsed bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.listen_addr))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.host.trim().is_empty() {
            anyhow::bail!("Conductor host name must be specified");
        }

        if self.enabled_drivers.is_empty() {
            anyhow::bail!("At least one driver must be enabled");
        }
        for driver in &self.enabled_drivers {
            if !KNOWN_DRIVERS.contains(&driver.as_str()) {
                anyhow::bail!(
                    "Unknown driver '{}' (known drivers: {})",
                    driver,
                    KNOWN_DRIVERS.join(", ")
                );
            }
        }

        for (key, secs) in self.timeouts.all() {
            if secs == 0 {
                anyhow::bail!("Timeout {} must be greater than zero", key);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:6385");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.enabled_drivers, vec!["fake".to_string()]);
        assert!(config.automated_clean);
        assert_eq!(config.timeouts.verify_secs, 60);
        assert_eq!(config.timeouts.clean_secs, 1800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_partial_timeouts_keep_other_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"timeouts": {"deploy_secs": 5}}"#).unwrap();
        assert_eq!(config.timeouts.deploy_secs, 5);
        assert_eq!(config.timeouts.power_secs, 60);
    }

    #[test]
    fn test_save_and_load_json_config() {
        let config = ServiceConfig {
            host: "conductor-7".to_string(),
            automated_clean: false,
            ..Default::default()
        };

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();

        let loaded = ServiceConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ not json").unwrap();
        temp_file.flush().unwrap();

        let result = ServiceConfig::load_from_file(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = ServiceConfig::load_from_file("/nonexistent/provisiond.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let config = ServiceConfig {
            listen_addr: "localhost".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = ServiceConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_driver() {
        let config = ServiceConfig {
            enabled_drivers: vec!["pxe_ipmitool".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pxe_ipmitool"));

        let config = ServiceConfig {
            enabled_drivers: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ServiceConfig::default();
        config.timeouts.inspect_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inspect_secs"));
    }
}
