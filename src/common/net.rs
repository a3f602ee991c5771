//! Network utility functions
//!
//! This module provides address parsing and the port readiness waiter used
//! to detect when the supervised proxy starts accepting connections.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;

use super::error::{Result, SidecarError};

/// Interval between readiness probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(SidecarError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(SidecarError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Wait until `host:port` accepts TCP connections
///
/// Repeatedly attempts a short-lived connect at [`POLL_INTERVAL`]
/// granularity. A connect that succeeds is immediately dropped; the target
/// is considered ready. Every failed attempt counts against the budget of
/// `timeout / POLL_INTERVAL` probes.
///
/// # Returns
///
/// `Ok(())` the first time a connect succeeds, otherwise
/// [`SidecarError::ReadinessTimeout`] carrying the port.
pub async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let attempts = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1);

    for attempt in 0..attempts {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                drop(stream);
                debug!(
                    "port {} accepted a connection after {} probe(s)",
                    port,
                    attempt + 1
                );
                return Ok(());
            }
            Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }

    Err(SidecarError::ReadinessTimeout {
        port,
        waited: timeout,
    })
}
