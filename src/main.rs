//! Request guard server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer ─▶ guard middleware ─────────────────────────┐
//!                                   │ id + nonce + security headers           │
//!                                   │ RequestLogger.track (sanitized context) │
//!                                   │ API?  RateLimiter ──▶ 429 short-circuit │
//!                                   │ page? CSRF token issue                  │
//!                                   ▼                                         │
//!                          Timeout ─▶ application                             │
//!                                   │                                         │
//!     Client Response               ▼                                         │
//!     ◀────────────── finalize headers, close log entry ◀────────────────────┘
//!
//!     Admin listener: /admin/{status,metrics,logs,logs/export}
//!     Prometheus listener: /metrics (optional)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use request_guard::config::{load_config, GuardConfig};
use request_guard::lifecycle::{wait_for_shutdown, Shutdown};
use request_guard::observability::{logging, metrics};
use request_guard::HttpServer;

#[derive(Parser)]
#[command(name = "request-guard", version)]
#[command(about = "Security pipeline for inbound HTTP requests", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability, config.environment);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-guard starting");
    if args.config.is_none() {
        tracing::warn!("No config file given, running with defaults");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        store = ?config.rate_limit.store,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config).await?;

    let shutdown = Arc::new(Shutdown::new());
    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        trigger.trigger();
    });

    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
