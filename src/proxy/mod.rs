//! Proxy process module
//!
//! This module owns the lifecycle of the external intercepting proxy
//! subprocess: permission preparation, argument construction, launch,
//! readiness wait, and termination.

pub mod process;

pub use process::ProxyProcess;
