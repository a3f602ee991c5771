//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is designed to be a single source of truth for defaults,
//! making it easier to maintain consistent defaults across the application.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "REPLAY_SIDECAR_";

// String constants for default values

/// Default proxy executable as string
pub const PROXY_PATH_STR: &str = "mitmdump";

/// Default replay cache path as string
pub const CACHE_PATH_STR: &str = "replay-cache.mitm";

/// Default relay listener address as string
pub const RELAY_LISTEN_STR: &str = "127.0.0.1:8765";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default port the proxy binds
pub const PROXY_PORT: u16 = 8080;

/// Default readiness timeout in seconds
pub const READINESS_TIMEOUT_SECS: u64 = 60;

/// Default ceiling on concurrently admitted relay connections
pub const MAX_RELAY_CONNECTIONS: usize = 256;

// Functions for default values

/// Default proxy executable path
pub fn proxy_path() -> PathBuf {
    PathBuf::from(PROXY_PATH_STR)
}

/// Default replay cache path
pub fn cache_path() -> PathBuf {
    PathBuf::from(CACHE_PATH_STR)
}

/// Default relay listener address
pub fn relay_listen() -> SocketAddr {
    SocketAddr::from_str(RELAY_LISTEN_STR)
        .expect("Default relay listener address should be valid")
}

/// Default proxy port
pub fn proxy_port() -> u16 {
    PROXY_PORT
}

/// Default readiness timeout in seconds
pub fn readiness_timeout_secs() -> u64 {
    READINESS_TIMEOUT_SECS
}

/// Default relay connection ceiling
pub fn max_relay_connections() -> usize {
    MAX_RELAY_CONNECTIONS
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}
