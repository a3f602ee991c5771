//! Relay server implementation
//!
//! The relay is a pure sink: every inbound text or binary frame is
//! observed and logged, none is answered. Each accepted connection runs an
//! independent drain task, so a misbehaving peer can never affect another
//! connection or the accept loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_tungstenite::tungstenite::Message;

use crate::common::{Result, SidecarError};

/// Events observed by the relay
///
/// Embedders (and tests) can subscribe to these through
/// [`RelayServer::set_observer`]; without a subscriber the relay only
/// logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A peer completed the WebSocket handshake
    Connected {
        /// Remote endpoint of the peer
        peer: SocketAddr,
    },
    /// A text or binary frame arrived
    Message {
        /// Remote endpoint of the peer
        peer: SocketAddr,
        /// Raw frame payload, untouched
        payload: Vec<u8>,
    },
    /// The peer's connection ended, cleanly or not
    Closed {
        /// Remote endpoint of the peer
        peer: SocketAddr,
        /// Why the connection ended
        reason: String,
    },
}

/// Observer channel for relay events
type Observer = Option<mpsc::UnboundedSender<RelayEvent>>;

/// Relay server
///
/// Binds a listener when [`serve`](Self::serve) is called and accepts
/// connections until [`close`](Self::close) is signalled. Admission is
/// bounded: once the configured ceiling of concurrent connections is
/// reached, further peers are rejected before the handshake.
pub struct RelayServer {
    /// Address the listener binds
    listen_addr: SocketAddr,
    /// Ceiling on concurrently admitted connections
    max_connections: usize,
    /// Permits for connection admission
    admission: Arc<Semaphore>,
    /// Signal resolving `serve`'s suspension
    shutdown: Notify,
    /// Whether `close` has been called
    closed: AtomicBool,
    /// Optional subscriber for observed events
    observer: Mutex<Observer>,
}

impl RelayServer {
    /// Create a new relay server
    ///
    /// # Parameters
    ///
    /// * `listen_addr` - Address to listen on
    /// * `max_connections` - Ceiling on concurrently admitted connections
    pub fn new(listen_addr: SocketAddr, max_connections: usize) -> Self {
        Self {
            listen_addr,
            max_connections,
            admission: Arc::new(Semaphore::new(max_connections)),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
            observer: Mutex::new(None),
        }
    }

    /// Address the listener binds
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of currently admitted connections
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.admission.available_permits()
    }

    /// Subscribe to observed relay events
    ///
    /// Replaces any previous subscriber. Connections admitted afterwards
    /// report to the new one.
    pub fn set_observer(&self, observer: mpsc::UnboundedSender<RelayEvent>) {
        *self.observer.lock().expect("observer lock poisoned") = Some(observer);
    }

    /// Run the relay server
    ///
    /// Binds the listener, then suspends accepting connections until
    /// [`close`](Self::close) is called. Each accepted connection is
    /// drained on its own task while accepting continues.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::ListenerBind`] if the listen address is
    /// unavailable.
    pub async fn serve(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let listener =
            TcpListener::bind(self.listen_addr)
                .await
                .map_err(|e| SidecarError::ListenerBind {
                    addr: self.listen_addr,
                    source: e,
                })?;

        info!("Relay server listening on {}", self.listen_addr);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Relay server on {} closing", self.listen_addr);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.admit(stream, peer),
                        Err(e) => warn!("Error accepting relay connection: {}", e),
                    }
                }
            }
        }
    }

    /// Stop accepting new connections
    ///
    /// Resolves `serve`'s suspension. Drain tasks already in flight are
    /// not cancelled; they end when their peer disconnects or the runtime
    /// is torn down. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    /// Hand an accepted connection to its own drain task, or reject it
    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let Ok(permit) = Arc::clone(&self.admission).try_acquire_owned() else {
            warn!(
                "Rejecting relay connection from {}: ceiling of {} connections reached",
                peer, self.max_connections
            );
            return;
        };

        let observer = self.observer.lock().expect("observer lock poisoned").clone();
        tokio::spawn(async move {
            drain_connection(stream, peer, observer).await;
            drop(permit);
        });
    }
}

/// Consume one connection's inbound message sequence until it ends
///
/// Performs the WebSocket handshake, then observes every text and binary
/// frame in arrival order. Nothing is ever sent back. The task ends when
/// the peer closes cleanly or a protocol error occurs; either way the
/// reason is logged and no other connection is affected.
async fn drain_connection(stream: TcpStream, peer: SocketAddr, observer: Observer) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    info!("New relay connection from {}", peer);
    emit(&observer, RelayEvent::Connected { peer });

    let reason = loop {
        match ws.next().await {
            Some(Ok(message)) => match message {
                Message::Text(text) => {
                    info!("Received message from {}: {}", peer, text);
                    emit(
                        &observer,
                        RelayEvent::Message {
                            peer,
                            payload: text.into_bytes(),
                        },
                    );
                }
                Message::Binary(payload) => {
                    info!("Received {} byte binary message from {}", payload.len(), peer);
                    emit(&observer, RelayEvent::Message { peer, payload });
                }
                Message::Close(frame) => {
                    break match frame {
                        Some(frame) => format!("close frame: {:?}", frame),
                        None => "close frame".to_string(),
                    };
                }
                // Transport keepalive, not relayed events.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    debug!("Ignoring control frame from {}", peer);
                }
            },
            Some(Err(e)) => break format!("protocol error: {}", e),
            None => break "peer disconnected".to_string(),
        }
    };

    info!("Connection from {} closed ({})", peer, reason);
    emit(&observer, RelayEvent::Closed { peer, reason });
}

/// Forward an event to the subscriber, if any
fn emit(observer: &Observer, event: RelayEvent) {
    if let Some(tx) = observer {
        // A dropped receiver only means nobody is watching anymore.
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_server_new() {
        let server = RelayServer::new("127.0.0.1:8765".parse().unwrap(), 8);

        assert_eq!(server.listen_addr().port(), 8765);
        assert_eq!(server.active_connections(), 0);
        assert!(!server.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let server = RelayServer::new("127.0.0.1:8765".parse().unwrap(), 8);

        server.close();
        server.close();
        assert!(server.is_closed());
    }
}
