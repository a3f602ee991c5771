//! Relay server module
//!
//! This module implements the event relay: a WebSocket listener that
//! accepts connections and drains their messages without interpreting or
//! answering them.

pub mod server;

pub use server::{RelayEvent, RelayServer};
