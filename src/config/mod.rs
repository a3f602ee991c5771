//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.

mod defaults;

pub use defaults::ENV_PREFIX;

use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::common::{parse_socket_addr, Result, SidecarError};

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// Sidecar configuration
///
/// Every field has a centralized default, so configuration files may
/// specify any subset of fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SidecarConfig {
    /// Path to the intercepting proxy executable
    pub proxy_path: PathBuf,

    /// Port the proxy binds
    pub proxy_port: u16,

    /// Replay session cache handed to the proxy
    pub cache_path: PathBuf,

    /// Address the relay server listens on
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub relay_listen: SocketAddr,

    /// Seconds to wait for the proxy to accept connections
    pub readiness_timeout_secs: u64,

    /// Ceiling on concurrently admitted relay connections
    pub max_relay_connections: usize,

    /// Log level
    pub log_level: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            proxy_path: defaults::proxy_path(),
            proxy_port: defaults::proxy_port(),
            cache_path: defaults::cache_path(),
            relay_listen: defaults::relay_listen(),
            readiness_timeout_secs: defaults::readiness_timeout_secs(),
            max_relay_connections: defaults::max_relay_connections(),
            log_level: defaults::log_level(),
        }
    }
}

impl SidecarConfig {
    /// Load configuration from a JSON file
    ///
    /// Fields absent from the file keep their defaults.
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            SidecarError::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            SidecarError::Config(format!(
                "Failed to parse configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Build a configuration overlay from command line argument values
    ///
    /// # Returns
    ///
    /// Returns a configuration carrying the argument values, suitable for
    /// [`merge`](Self::merge)-ing over lower-priority sources.
    pub fn from_args(
        proxy: &str,
        proxy_port: u16,
        cache: &str,
        relay_listen: &str,
        readiness_timeout_secs: u64,
        max_relay_connections: usize,
        log_level: &str,
    ) -> Result<Self> {
        Ok(Self {
            proxy_path: PathBuf::from(proxy),
            proxy_port,
            cache_path: PathBuf::from(cache),
            relay_listen: parse_socket_addr(relay_listen)?,
            readiness_timeout_secs,
            max_relay_connections,
            log_level: log_level.to_string(),
        })
    }

    /// Build a configuration overlay from `REPLAY_SIDECAR_`-prefixed
    /// environment variables
    ///
    /// Unset variables leave the corresponding field at its default, so
    /// [`merge`](Self::merge)-ing the result only overrides what the
    /// environment actually sets.
    pub fn from_env() -> Result<Self> {
        let get_env = |name: &str| -> Option<String> {
            env::var(format!("{}{}", ENV_PREFIX, name)).ok()
        };

        let mut config = Self::default();

        if let Some(proxy_path) = get_env("PROXY_PATH") {
            config.proxy_path = proxy_path.into();
        }

        if let Some(proxy_port) = get_env("PROXY_PORT") {
            config.proxy_port = proxy_port.parse().map_err(|_| {
                SidecarError::Config(format!("Invalid {}PROXY_PORT: {}", ENV_PREFIX, proxy_port))
            })?;
        }

        if let Some(cache_path) = get_env("CACHE_PATH") {
            config.cache_path = cache_path.into();
        }

        if let Some(relay_listen) = get_env("RELAY_LISTEN") {
            config.relay_listen = parse_socket_addr(&relay_listen)?;
        }

        if let Some(timeout) = get_env("READINESS_TIMEOUT") {
            config.readiness_timeout_secs = timeout.parse().map_err(|_| {
                SidecarError::Config(format!(
                    "Invalid {}READINESS_TIMEOUT: {}",
                    ENV_PREFIX, timeout
                ))
            })?;
        }

        if let Some(ceiling) = get_env("MAX_RELAY_CONNECTIONS") {
            config.max_relay_connections = ceiling.parse().map_err(|_| {
                SidecarError::Config(format!(
                    "Invalid {}MAX_RELAY_CONNECTIONS: {}",
                    ENV_PREFIX, ceiling
                ))
            })?;
        }

        if let Some(log_level) = get_env("LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` when they differ from
    /// the defaults, so a higher-priority source only overrides what it
    /// actually sets. This implements the configuration priority order:
    /// command line arguments > environment variables > configuration file
    /// > default values.
    ///
    /// # Parameters
    ///
    /// * `other` - The higher-priority configuration to merge into this one
    ///
    /// # Returns
    ///
    /// Returns a new configuration with merged values.
    pub fn merge(&self, other: Self) -> Self {
        let default = Self::default();

        // Helper function to merge a field: the other value wins only when
        // it is not the default.
        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        Self {
            proxy_path: merge_field(&self.proxy_path, &other.proxy_path, &default.proxy_path),
            proxy_port: merge_field(&self.proxy_port, &other.proxy_port, &default.proxy_port),
            cache_path: merge_field(&self.cache_path, &other.cache_path, &default.cache_path),
            relay_listen: merge_field(
                &self.relay_listen,
                &other.relay_listen,
                &default.relay_listen,
            ),
            readiness_timeout_secs: merge_field(
                &self.readiness_timeout_secs,
                &other.readiness_timeout_secs,
                &default.readiness_timeout_secs,
            ),
            max_relay_connections: merge_field(
                &self.max_relay_connections,
                &other.max_relay_connections,
                &default.max_relay_connections,
            ),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
        }
    }

    /// Validate the configuration
    ///
    /// # Returns
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.proxy_path.as_os_str().is_empty() {
            return Err(SidecarError::Config(
                "Proxy executable path must not be empty".to_string(),
            ));
        }

        if self.proxy_port == 0 {
            return Err(SidecarError::Config(
                "Proxy port must be a positive integer".to_string(),
            ));
        }

        if self.readiness_timeout_secs == 0 {
            return Err(SidecarError::Config(
                "Readiness timeout must be a positive number of seconds".to_string(),
            ));
        }

        if self.max_relay_connections == 0 {
            return Err(SidecarError::Config(
                "Relay connection ceiling must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SidecarConfig::default();
        assert!(config.validate().is_ok(), "Defaults should validate");
        assert_eq!(config.relay_listen.port(), 8765);
        assert_eq!(config.readiness_timeout_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SidecarConfig =
            serde_json::from_str(r#"{"proxy_port": 9090, "relay_listen": "127.0.0.1:9765"}"#)
                .expect("Partial configuration should parse");

        assert_eq!(config.proxy_port, 9090);
        assert_eq!(config.relay_listen.port(), 9765);
        // Untouched fields keep their defaults
        assert_eq!(config.proxy_path, defaults::proxy_path());
        assert_eq!(config.readiness_timeout_secs, 60);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = SidecarConfig {
            proxy_port: 0,
            ..SidecarConfig::default()
        };
        assert!(config.validate().is_err(), "Zero proxy port should be rejected");
    }

    #[test]
    fn test_validate_rejects_empty_proxy_path() {
        let config = SidecarConfig {
            proxy_path: PathBuf::new(),
            ..SidecarConfig::default()
        };
        assert!(config.validate().is_err(), "Empty proxy path should be rejected");
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_overrides() {
        std::env::set_var("REPLAY_SIDECAR_PROXY_PORT", "9191");
        std::env::set_var("REPLAY_SIDECAR_LOG_LEVEL", "debug");

        let config = SidecarConfig::from_env().expect("Valid environment overrides should apply");

        assert_eq!(config.proxy_port, 9191);
        assert_eq!(config.log_level, "debug");
        // Unset variables leave fields at their defaults
        assert_eq!(config.cache_path, defaults::cache_path());

        std::env::remove_var("REPLAY_SIDECAR_PROXY_PORT");
        std::env::remove_var("REPLAY_SIDECAR_LOG_LEVEL");
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("REPLAY_SIDECAR_PROXY_PORT", "not-a-port");

        let result = SidecarConfig::from_env();
        assert!(result.is_err(), "A non-numeric port must be rejected");

        std::env::remove_var("REPLAY_SIDECAR_PROXY_PORT");
    }

    #[test]
    fn test_merge_keeps_lower_priority_values_for_default_fields() {
        // A file sets the proxy port; the argument overlay leaves it at
        // its default, so the file's value must survive the merge.
        let file_config = SidecarConfig {
            proxy_port: 9090,
            cache_path: PathBuf::from("/var/cache/session.mitm"),
            ..SidecarConfig::default()
        };

        let args_config = SidecarConfig::from_args(
            defaults::PROXY_PATH_STR,
            defaults::PROXY_PORT,
            defaults::CACHE_PATH_STR,
            defaults::RELAY_LISTEN_STR,
            defaults::READINESS_TIMEOUT_SECS,
            defaults::MAX_RELAY_CONNECTIONS,
            defaults::LOG_LEVEL_STR,
        )
        .expect("Default argument values should build an overlay");

        let merged = SidecarConfig::default()
            .merge(file_config)
            .merge(args_config);

        assert_eq!(merged.proxy_port, 9090, "The file's port must survive default arguments");
        assert_eq!(merged.cache_path, PathBuf::from("/var/cache/session.mitm"));
    }

    #[test]
    fn test_merge_lets_non_default_values_win() {
        let file_config = SidecarConfig {
            proxy_port: 9090,
            log_level: "warn".to_string(),
            ..SidecarConfig::default()
        };

        let args_config = SidecarConfig {
            proxy_port: 7070,
            ..SidecarConfig::default()
        };

        let merged = SidecarConfig::default()
            .merge(file_config)
            .merge(args_config);

        assert_eq!(merged.proxy_port, 7070, "A non-default argument value must win");
        assert_eq!(merged.log_level, "warn", "Fields the arguments leave alone keep the file's value");
    }

    #[test]
    fn test_load_file_missing() {
        let result = SidecarConfig::load_file(Path::new("no-such-config.json"));
        assert!(result.is_err(), "Missing configuration file should be an error");
    }
}
