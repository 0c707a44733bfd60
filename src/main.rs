//! Authenticating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ POST login ──▶ auth::validator ──▶ backend (probe + GET)
//!                     │                               │
//!                     │                               ▼
//!                     │                        session::store (pending token)
//!                     │                               │
//!                     ▼                               ▼
//!               http::dispatcher ◀──────────── session::binding (client, bound once)
//!                     │
//!                     ▼
//!               auth::client (Basic / Digest, one challenge answer) ──▶ backend
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use auth_proxy::config::{load_config, validate_config, ProxyConfig};
use auth_proxy::lifecycle::{signals, Shutdown};
use auth_proxy::observability::{logging, metrics};
use auth_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "auth-proxy")]
#[command(about = "Reverse proxy that authenticates callers against its backend", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("invalid configuration: {e}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init(&config.observability.log_level);
    tracing::info!("auth-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend_scheme = %config.backend.scheme,
        backend_host = %config.backend.host,
        backend_port = config.backend.port,
        digest_caching_enabled = config.backend.digest_caching_enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
