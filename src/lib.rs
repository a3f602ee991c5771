//! Replay Sidecar: supervisor for an intercepting replay proxy with a
//! WebSocket event relay.
//!
//! This library launches an external intercepting-proxy binary with a
//! fixed replay-oriented flag set, waits until the proxy accepts
//! connections on its port, and concurrently runs an event-relay server
//! that accepts inbound WebSocket connections and drains their messages
//! without interpreting them.
//!
//! # Main Features
//!
//! - Subprocess lifecycle for the proxy: permission repair, launch,
//!   readiness wait, termination
//! - A bounded-admission WebSocket sink that isolates every connection
//! - A manager facade composing both into one start/stop lifecycle
//!
//! # Example
//!
//! ```no_run
//! use replay_sidecar::config::SidecarConfig;
//! use replay_sidecar::manager::Manager;
//! use replay_sidecar::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut config = SidecarConfig::default();
//!     config.proxy_path = "/usr/local/bin/mitmdump".into();
//!     config.proxy_port = 8080;
//!     config.cache_path = "session-cache.mitm".into();
//!     config.validate()?;
//!
//!     let mut manager = Manager::new(&config);
//!
//!     // Blocks until the proxy accepts connections, then runs the relay
//!     // server in the background.
//!     manager.start().await?;
//!
//!     // ... drive traffic through the proxy ...
//!
//!     manager.stop().await?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod manager;
pub mod proxy;
pub mod relay;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, Result, SidecarError};
pub use manager::Manager;
pub use proxy::ProxyProcess;
pub use relay::{RelayEvent, RelayServer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
