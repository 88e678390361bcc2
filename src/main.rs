//! rdgate - HTTP gateway for remote desktop backends
//!
//! Serves the tunnel API and opens backend connections listed in a JSON
//! configuration file.

mod config;
mod directory;

use anyhow::{Context, Result};
use clap::Parser;
use rdgate_api::{ApiServer, ApiServerConfig};
use rdgate_tunnel::{HttpTunnelTransport, TransportConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::GatewayConfig;
use directory::StaticDirectory;

/// rdgate - Reach remote desktops from the browser over plain HTTP
#[derive(Parser, Debug)]
#[command(name = "rdgate")]
#[command(about = "rdgate - Reach remote desktops from the browser over plain HTTP")]
#[command(version, long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Address to serve the tunnel API on
    #[arg(long, env = "RDGATE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path to the JSON connection configuration
    #[arg(long, env = "RDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend proxy address, overriding the configuration file
    #[arg(long, env = "RDGATE_BACKEND")]
    backend: Option<String>,

    /// Seconds a read waits for backend output before returning empty
    #[arg(long, env = "RDGATE_IDLE_TIMEOUT", default_value = "15")]
    idle_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable CORS for browser clients served from another origin
    #[arg(long)]
    cors: bool,

    /// Allowed CORS origin (repeatable; all origins if omitted)
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => {
            warn!("No configuration file given; no connections are available");
            GatewayConfig::default()
        }
    };

    if let Some(backend) = &cli.backend {
        config.backend = backend.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level);

    info!("rdgate starting...");

    let config = load_config(&cli).context("Failed to load gateway configuration")?;
    info!("Backend: {}", config.backend);

    let directory = StaticDirectory::new(config);
    info!(
        "Loaded {} connections and {} groups",
        directory.connection_count(),
        directory.group_count()
    );

    let transport = Arc::new(HttpTunnelTransport::new(
        Arc::new(directory),
        TransportConfig {
            idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
            ..TransportConfig::default()
        },
    ));

    let server = ApiServer::new(
        ApiServerConfig {
            bind_addr: cli.bind,
            enable_cors: cli.cors,
            cors_origins: if cli.cors_origins.is_empty() {
                None
            } else {
                Some(cli.cors_origins.clone())
            },
        },
        transport.clone(),
    );

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        result = server.start() => {
            if let Err(e) = &result {
                error!("API server error: {:#}", e);
            }
            result
        }
    };

    transport.shutdown();
    info!("rdgate stopped");
    result
}
