//! Proxy process controller
//!
//! Launches the external intercepting proxy with a fixed replay-oriented
//! flag set, waits until it accepts connections, and terminates it on
//! request. The proxy's own cache file is an opaque path handed to the
//! process; the controller never opens it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::process::{Child, Command};

use crate::common::net::wait_for_port;
use crate::common::{Result, SidecarError};

/// Controller for the external proxy subprocess
///
/// At most one live child exists per controller instance. `start` creates
/// it, `stop` invalidates it.
pub struct ProxyProcess {
    /// Path to the proxy executable
    proxy_path: PathBuf,
    /// Port the proxy is told to bind
    port: u16,
    /// Replay session cache handed to the proxy
    cache_path: PathBuf,
    /// How long to wait for the proxy to accept connections
    readiness_timeout: Duration,
    /// Live child, if the proxy is running
    child: Option<Child>,
}

impl ProxyProcess {
    /// Create a new controller
    ///
    /// The proxy is not launched until [`start`](Self::start) is called.
    pub fn new(
        proxy_path: impl Into<PathBuf>,
        port: u16,
        cache_path: impl Into<PathBuf>,
        readiness_timeout: Duration,
    ) -> Self {
        Self {
            proxy_path: proxy_path.into(),
            port,
            cache_path: cache_path.into(),
            readiness_timeout,
            child: None,
        }
    }

    /// Whether a live child handle exists
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Port the proxy is configured to bind
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fixed argument set handed to the proxy
    ///
    /// Disables upstream certificate validation, kills extra replayed
    /// responses, keeps replayed responses in the pool, loads/saves the
    /// session cache, binds the configured port, and allows insecure
    /// upstream TLS.
    fn replay_args(&self) -> Vec<String> {
        vec![
            "--set".to_string(),
            "upstream_cert=false".to_string(),
            "--set".to_string(),
            "server_replay_kill_extra=true".to_string(),
            "--set".to_string(),
            "server_replay_nopop=true".to_string(),
            "-S".to_string(),
            self.cache_path.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "--ssl-insecure".to_string(),
        ]
    }

    /// Launch the proxy and wait for it to accept connections
    ///
    /// Repairs a missing execute permission on the configured executable
    /// before launching. The child's stdout is discarded; stderr is
    /// inherited.
    ///
    /// # Errors
    ///
    /// * [`SidecarError::PermissionRepair`] if the execute bit could not be granted
    /// * [`SidecarError::Spawn`] if the process could not be launched
    /// * [`SidecarError::ReadinessTimeout`] if the port never accepted a
    ///   connection. The child spawned for this attempt is killed before
    ///   the error is returned, so no process is left behind.
    pub async fn start(&mut self) -> Result<()> {
        ensure_executable(&self.proxy_path)?;

        info!(
            "Starting proxy {} on port {}",
            self.proxy_path.display(),
            self.port
        );

        let child = Command::new(&self.proxy_path)
            .args(self.replay_args())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| SidecarError::Spawn {
                path: self.proxy_path.clone(),
                source: e,
            })?;
        self.child = Some(child);

        if let Err(e) = wait_for_port("localhost", self.port, self.readiness_timeout).await {
            warn!(
                "Proxy never became reachable on port {}, killing it",
                self.port
            );
            if let Some(mut child) = self.child.take() {
                if let Err(kill_err) = child.start_kill() {
                    debug!("Kill after readiness timeout failed: {}", kill_err);
                }
            }
            return Err(e);
        }

        info!("Proxy is accepting connections on port {}", self.port);
        Ok(())
    }

    /// Ask the proxy to exit
    ///
    /// Sends a non-forceful termination request and returns without
    /// waiting for the process to die. A request that fails because the
    /// process is already gone is tolerated. Stopping a controller with no
    /// live child is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            debug!("Proxy stop requested but no process is running");
            return Ok(());
        };

        info!("Stopping proxy on port {}", self.port);
        terminate(&mut child);
        Ok(())
    }
}

/// Grant owner/group/other execute permission if the file lacks it
///
/// A file that cannot be inspected at all is reported as a spawn failure,
/// matching what launching it directly would have produced.
fn ensure_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).map_err(|e| SidecarError::Spawn {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            let mut permissions = metadata.permissions();
            permissions.set_mode(mode | 0o111);
            std::fs::set_permissions(path, permissions).map_err(|e| {
                SidecarError::PermissionRepair {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
            info!("Granted execute permission on {}", path.display());
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Send a non-forceful termination request to the child
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("Termination request failed (process likely exited): {}", e);
            }
        }
        None => debug!("Proxy process already exited"),
    }
}

/// Fall back to a hard kill where no gentle signal exists
#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Termination request failed (process likely exited): {}", e);
    }
}
