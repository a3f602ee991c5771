//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Replay sidecar error type
///
/// Start-path failures are kept distinguishable so operators can tell
/// whether the proxy binary, the port, or filesystem permissions are at
/// fault.
#[derive(Error, Debug)]
pub enum SidecarError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The proxy executable lacked execute permission and the repair failed
    #[error("failed to make {path:?} executable: {source}")]
    PermissionRepair {
        /// Path to the executable that could not be repaired
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The proxy process could not be launched
    #[error("failed to spawn proxy {path:?}: {source}")]
    Spawn {
        /// Path to the executable that failed to spawn
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The proxy never became reachable on its port
    #[error("timed out after {waited:?} waiting for port {port} to accept connections")]
    ReadinessTimeout {
        /// Port that never accepted a connection
        port: u16,
        /// How long the waiter polled before giving up
        waited: Duration,
    },

    /// The relay listener could not bind its address
    #[error("failed to bind relay listener on {addr}: {source}")]
    ListenerBind {
        /// Address the listener tried to bind
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `SidecarError`.
pub type Result<T> = std::result::Result<T, SidecarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        // Test IO error conversion
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let err: SidecarError = io_err.into();

        match err {
            SidecarError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = SidecarError::ReadinessTimeout {
            port: 8080,
            waited: Duration::from_secs(60),
        };
        let err_str = format!("{}", err);
        assert!(err_str.contains("8080"), "Timeout error should name the port");

        let err = SidecarError::Config("missing proxy path".to_string());
        let err_str = format!("{}", err);
        assert!(err_str.contains("missing proxy path"));
    }
}
