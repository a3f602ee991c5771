//! Manager facade
//!
//! This module composes the proxy process controller and the relay server
//! into a single start/stop lifecycle. Proxy readiness is confirmed
//! strictly before the relay server is started; shutdown tears both down
//! in a fixed order.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::common::{Result, SidecarError};
use crate::config::SidecarConfig;
use crate::proxy::ProxyProcess;
use crate::relay::RelayServer;

/// Grace period for the relay listener to bind after start, and for the
/// relay task to settle after close.
const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Sidecar manager
///
/// Single entry and exit point for the supervised proxy and the relay
/// server. Stopping never terminates the hosting process; that decision
/// belongs to the binary entry point.
pub struct Manager {
    /// Controller for the external proxy subprocess
    proxy: ProxyProcess,
    /// Relay server, shared with its background task
    relay: Arc<RelayServer>,
    /// Background task running the relay server, retained so its errors
    /// can be observed and its completion awaited during shutdown
    relay_task: Option<JoinHandle<Result<()>>>,
}

impl Manager {
    /// Create a new manager from a validated configuration
    ///
    /// Nothing is launched until [`start`](Self::start) is called.
    pub fn new(config: &SidecarConfig) -> Self {
        Self {
            proxy: ProxyProcess::new(
                config.proxy_path.clone(),
                config.proxy_port,
                config.cache_path.clone(),
                Duration::from_secs(config.readiness_timeout_secs),
            ),
            relay: Arc::new(RelayServer::new(
                config.relay_listen,
                config.max_relay_connections,
            )),
            relay_task: None,
        }
    }

    /// Relay server handle
    ///
    /// Exposed so callers can close the listener independently of
    /// [`stop`](Self::stop), or subscribe to observed events.
    pub fn relay(&self) -> &Arc<RelayServer> {
        &self.relay
    }

    /// Whether the proxy subprocess is running
    pub fn proxy_running(&self) -> bool {
        self.proxy.is_running()
    }

    /// Start the proxy and then the relay server
    ///
    /// Blocks until the proxy accepts connections, then launches the relay
    /// server on a background task and returns once the listener has had a
    /// grace period to bind. If the relay task finishes during that grace
    /// period (a bind failure does), the proxy is stopped and the relay's
    /// error is surfaced.
    pub async fn start(&mut self) -> Result<()> {
        self.proxy.start().await?;

        let relay = Arc::clone(&self.relay);
        self.relay_task = Some(tokio::spawn(async move { relay.serve().await }));

        // Give the listener time to bind before handing control back.
        tokio::time::sleep(GRACE_PERIOD).await;

        if self.relay_task.as_ref().is_some_and(|task| task.is_finished()) {
            let task = self.relay_task.take().expect("relay task checked above");
            let result = match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(SidecarError::Other(format!("relay server task failed: {}", e))),
            };
            if let Err(e) = result {
                let _ = self.proxy.stop().await;
                return Err(e);
            }
        }

        info!("Proxy is running and the relay server is ready");
        Ok(())
    }

    /// Stop the proxy and the relay server
    ///
    /// Asks the proxy to exit, closes the relay listener, then awaits the
    /// relay task for a bounded grace period. Failures on the shutdown
    /// path are logged but do not block the remaining teardown steps.
    /// Stopping a manager that was never started is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let proxy_result = self.proxy.stop().await;

        self.relay.close();
        if let Some(task) = self.relay_task.take() {
            match timeout(GRACE_PERIOD, task).await {
                Ok(Ok(Ok(()))) => info!("Relay server closed"),
                Ok(Ok(Err(e))) => warn!("Relay server ended with error: {}", e),
                Ok(Err(e)) => warn!("Relay server task failed: {}", e),
                Err(_) => warn!("Relay server did not settle within the grace period"),
            }
        }

        proxy_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_new_is_inert() {
        let config = SidecarConfig::default();
        let manager = Manager::new(&config);

        assert!(!manager.proxy_running());
        assert!(!manager.relay().is_closed());
    }
}
