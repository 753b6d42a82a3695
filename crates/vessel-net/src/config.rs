//! Runtime configuration: network endpoints, the shared authentication
//! secret, and per-tick interval overrides. Loaded once at startup, before
//! any component starts (§7a).

use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_STREAM_ADDR: &str = "10.0.0.84:9997";
const DEFAULT_DATAGRAM_ADDR: &str = "0.0.0.0:9998";
const DEFAULT_MAX_SESSIONS: usize = 9;
/// Placeholder shared secret written into a freshly generated config file.
/// Operators are expected to replace this before exposing the server.
const DEFAULT_SHARED_SECRET: &str = "change-me-before-deploying";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Io { path: String, source: io::Error },

    #[error("failed to parse TOML from '{path}': {source}")]
    TomlDeserialization { path: String, source: toml::de::Error },

    #[error("failed to serialize configuration for '{path}': {source}")]
    TomlSerialization { path: String, source: toml::ser::Error },

    #[error("configuration validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    #[serde(rename = "ticks")]
    pub tick_overrides: TickOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the stream (TCP) listener binds to.
    pub stream_addr: String,
    /// Address the datagram (UDP) listener binds to.
    pub datagram_addr: String,
    /// Cap on concurrent bound sessions. Raw, pre-handshake connections do
    /// not count against this (see Open Question in SPEC_FULL §9).
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC key shared with clients, used by the authenticator (§4.5).
    pub shared_secret: String,
}

/// Per-tick-kind interval overrides, keyed by the lowercase tick kind name
/// (e.g. `movement`). Kinds absent here use the game module's registered
/// default interval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, transparent)]
pub struct TickOverrides(pub std::collections::BTreeMap<String, u64>);

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            stream_addr: DEFAULT_STREAM_ADDR.to_string(),
            datagram_addr: DEFAULT_DATAGRAM_ADDR.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            shared_secret: DEFAULT_SHARED_SECRET.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            security: SecurityConfig::default(),
            tick_overrides: TickOverrides::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        SocketAddr::from_str(&self.network.stream_addr).map_err(|e| ConfigError::Validation {
            field: "network.stream_addr".to_string(),
            reason: e.to_string(),
        })?;

        SocketAddr::from_str(&self.network.datagram_addr).map_err(|e| ConfigError::Validation {
            field: "network.datagram_addr".to_string(),
            reason: e.to_string(),
        })?;

        if self.network.max_sessions == 0 {
            return Err(ConfigError::Validation {
                field: "network.max_sessions".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.security.shared_secret.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "security.shared_secret".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        for (kind, interval_ms) in &self.tick_overrides.0 {
            if *interval_ms == 0 {
                return Err(ConfigError::Validation {
                    field: format!("ticks.{kind}"),
                    reason: "interval must be positive".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::from_str(&self.network.stream_addr).expect("validated on load")
    }

    pub fn datagram_addr(&self) -> SocketAddr {
        SocketAddr::from_str(&self.network.datagram_addr).expect("validated on load")
    }
}

/// Loads configuration from `path`, writing and returning a default
/// configuration if the file does not exist (§7a, scenario S7).
pub fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::TomlDeserialization {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, path)?;
        Ok(config)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn save(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|source| ConfigError::TomlSerialization {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_empty_shared_secret() {
        let mut config = Config::default();
        config.security.shared_secret = "   ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "security.shared_secret"
        ));
    }

    #[test]
    fn rejects_invalid_socket_address() {
        let mut config = Config::default();
        config.network.stream_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_sessions() {
        let mut config = Config::default();
        config.network.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_writes_and_loads_default() {
        let dir = std::env::temp_dir().join(format!("vessel-net-config-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let _ = std::fs::remove_file(&path);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.network.stream_addr, DEFAULT_STREAM_ADDR);
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        std::fs::remove_dir(&dir).unwrap();
    }
}
