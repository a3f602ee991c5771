//! Replay Sidecar Command Line Tool
//!
//! This binary is the command-line interface for the replay sidecar. It is
//! also the only place that terminates the hosting process: the library
//! components return results and leave the exit decision here.

use clap::Parser;
use log::{error, info, warn};

use replay_sidecar::common::{init_logger, Result};
use replay_sidecar::config::SidecarConfig;
use replay_sidecar::manager::Manager;
use replay_sidecar::{APP_NAME, VERSION};

use std::path::Path;

/// Replay Sidecar: supervisor for an intercepting replay proxy with a WebSocket event relay
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the intercepting proxy executable
    #[clap(long, default_value = "mitmdump")]
    proxy: String,

    /// Port the proxy listens on
    #[clap(short = 'p', long, default_value_t = 8080)]
    proxy_port: u16,

    /// Replay session cache path handed to the proxy
    #[clap(long, default_value = "replay-cache.mitm")]
    cache: String,

    /// Address the relay server listens on
    #[clap(long, default_value = "127.0.0.1:8765")]
    relay_listen: String,

    /// Seconds to wait for the proxy to become reachable
    #[clap(long, default_value_t = 60)]
    readiness_timeout: u64,

    /// Maximum concurrently admitted relay connections
    #[clap(long, default_value_t = 256)]
    max_relay_connections: usize,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Load configuration from a file
    #[clap(long)]
    config_file: Option<String>,

    /// Load configuration from environment variables
    #[clap(long)]
    from_env: bool,
}

/// Assemble the configuration by merging each source over the previous
/// one: defaults, then file, then environment variables, then command line
/// arguments. Every source only overrides the fields it actually sets.
fn build_config(args: &Args) -> Result<SidecarConfig> {
    let mut config = SidecarConfig::default();

    if let Some(config_file) = &args.config_file {
        if Path::new(config_file).exists() {
            info!("Loading configuration from file: {}", config_file);
            config = config.merge(SidecarConfig::load_file(Path::new(config_file))?);
        } else {
            warn!("Configuration file not found: {}", config_file);
        }
    }

    if args.from_env {
        info!("Loading configuration from environment variables");
        config = config.merge(SidecarConfig::from_env()?);
    }

    // Command line arguments have the highest priority.
    info!("Loading configuration from command line arguments");
    let args_config = SidecarConfig::from_args(
        &args.proxy,
        args.proxy_port,
        &args.cache,
        &args.relay_listen,
        args.readiness_timeout,
        args.max_relay_connections,
        &args.log_level,
    )?;
    config = config.merge(args_config);

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    init_logger(&args.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    let config = build_config(&args)?;

    info!("Proxy executable: {}", config.proxy_path.display());
    info!("Proxy port: {}", config.proxy_port);
    info!("Relay listener: {}", config.relay_listen);
    info!("Replay cache: {}", config.cache_path.display());

    let mut manager = Manager::new(&config);

    if let Err(e) = manager.start().await {
        error!("Failed to start: {}", e);
        std::process::exit(1);
    }

    info!("Sidecar ready, press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", e);
    }

    if let Err(e) = manager.stop().await {
        error!("Error during shutdown: {}", e);
        std::process::exit(1);
    }

    info!("{} stopped", APP_NAME);

    // Exit policy lives here: the library components never terminate the
    // hosting process themselves.
    std::process::exit(0);
}
