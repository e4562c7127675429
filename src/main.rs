//! RelayProxy - Main entry point
//!
//! A single-upstream HTTP forwarding gateway

use anyhow::{Context, Result};
use clap::Parser;
use relayproxy::config::{DEFAULT_LISTEN_ADDR, DEFAULT_UPSTREAM};
use relayproxy::{GatewayConfig, GatewayServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// RelayProxy - A single-upstream HTTP forwarding gateway
#[derive(Parser, Debug)]
#[command(name = "relayproxy")]
#[command(author = "RelayProxy Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Forward every request to one fixed upstream origin")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Upstream origin every request is forwarded to
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM)]
    upstream: String,

    /// Ceiling in seconds for each blocking network step
    #[arg(long, env = "TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "67108864")]
    max_body_bytes: usize,

    /// Answer 400 to paths containing `..` segments instead of forwarding them
    #[arg(long, env = "REJECT_TRAVERSAL", default_value = "false")]
    reject_traversal: bool,

    /// Log level or filter directive (e.g. "debug", "relayproxy=trace")
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let (filter, filter_error) = match EnvFilter::try_new(&args.log_level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("info"), Some(e)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    if let Some(e) = filter_error {
        warn!("Invalid log level {:?} ({}), falling back to info", args.log_level, e);
    }

    let config = GatewayConfig::new(args.listen, &args.upstream)
        .context("Invalid gateway configuration")?
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .context("Invalid gateway configuration")?
        .with_max_body_bytes(args.max_body_bytes)
        .with_reject_traversal(args.reject_traversal);

    info!("Starting RelayProxy v1.0.0");
    info!("Listening on: {}", config.listen_addr);
    info!("Forwarding to: {}", config.upstream.origin());
    info!("Timeout: {:?}", config.timeout);

    let server = Arc::new(GatewayServer::new(config));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("RelayProxy stopped");

    Ok(())
}
