//! Broker connection configuration
//!
//! Recognizes exactly four keys (`brokerhost`, `brokerport`, `brokerprotocol`,
//! `millis_reconnect`), all optional. Every field has a default so an empty
//! config connects to a local broker over plain TCP with automatic
//! reconnection disabled.

use crate::transport::mqtt::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Broker connection settings, supplied once at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Target host, default "localhost"
    #[serde(default = "default_host")]
    pub brokerhost: String,
    /// Target port, default 1883
    #[serde(default = "default_port")]
    pub brokerport: u16,
    /// Transport scheme, default "tcp" ("ssl" enables TLS)
    #[serde(default = "default_protocol")]
    pub brokerprotocol: String,
    /// Reconnect interval in milliseconds; 0 disables automatic reconnection
    #[serde(default)]
    pub millis_reconnect: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            brokerhost: default_host(),
            brokerport: default_port(),
            brokerprotocol: default_protocol(),
            millis_reconnect: 0,
        }
    }
}

/// Where to connect. Immutable once a supervisor is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BrokerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokerhost.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "brokerhost must not be empty".to_string(),
            ));
        }
        if self.brokerport == 0 {
            return Err(ConfigError::InvalidConfig(
                "brokerport must be greater than 0".to_string(),
            ));
        }
        match self.brokerprotocol.as_str() {
            "tcp" | "mqtt" | "ssl" | "tls" | "mqtts" => Ok(()),
            other => Err(ConfigError::InvalidConfig(format!(
                "unsupported brokerprotocol '{other}' (expected tcp, mqtt, ssl, tls or mqtts)"
            ))),
        }
    }

    /// The endpoint this configuration points at.
    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint {
            protocol: self.brokerprotocol.clone(),
            host: self.brokerhost.clone(),
            port: self.brokerport,
        }
    }

    /// The reconnect policy derived from `millis_reconnect`.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_millis(self.millis_reconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.brokerhost, "localhost");
        assert_eq!(config.brokerport, 1883);
        assert_eq!(config.brokerprotocol, "tcp");
        assert_eq!(config.millis_reconnect, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_recognized_keys() {
        let toml_content = r#"
brokerhost = "broker.example.org"
brokerport = 8883
brokerprotocol = "ssl"
millis_reconnect = 5000
"#;
        let config: BrokerConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.brokerhost, "broker.example.org");
        assert_eq!(config.brokerport, 8883);
        assert_eq!(config.brokerprotocol, "ssl");
        assert_eq!(config.millis_reconnect, 5000);
        assert!(config.validate().is_ok());
        assert!(config.reconnect_policy().is_enabled());
    }

    #[test]
    fn test_invalid_protocol_rejected() {
        let config = BrokerConfig {
            brokerprotocol: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = BrokerConfig {
            brokerport: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_display() {
        let config = BrokerConfig::default();
        assert_eq!(config.endpoint().to_string(), "tcp://localhost:1883");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.toml");
        std::fs::write(&path, "brokerhost = \"10.0.0.7\"\nmillis_reconnect = 250\n").unwrap();

        let config = BrokerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.brokerhost, "10.0.0.7");
        assert_eq!(config.brokerport, 1883);
        assert_eq!(config.millis_reconnect, 250);
    }

    #[test]
    fn test_load_from_file_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.toml");
        std::fs::write(&path, "brokerprotocol = \"smtp\"\n").unwrap();

        assert!(matches!(
            BrokerConfig::load_from_file(&path),
            Err(ConfigError::InvalidConfig(_))
        ));
    }
}
