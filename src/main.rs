//! Strike Relay Server
//!
//! Run with: cargo run --bin strike-relay
//!
//! # Configuration
//!
//! Settings come from defaults, then a TOML file (`--config`, or the first of
//! `~/.config/strike-relay/config.toml`, `/etc/strike-relay/config.toml`,
//! `./config.toml`), then environment variables, then CLI flags.
//!
//! Common environment variables:
//! - `PORT`: Port to listen on (default: 3001)
//! - `MAX_STRIKES`: Strikes kept in history (default: 100)
//! - `SEND_BACKLOG_ON_CONNECT`: Send history to new subscribers (default: true)
//! - `UPSTREAM_URL`: Upstream WebSocket feed
//! - `VERBOSE`: Debug-level diagnostics (default: false)
//! - `LOG_STREAM_DATA`: Log payload previews (default: false)
//! - `RUST_LOG`: Overrides the log filter entirely

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strike_relay::api::{self, AppState};
use strike_relay::capture::{CaptureSupervisor, WebSocketSource};
use strike_relay::config::{
    generate_default_config, with_bootstrap_logging, Config, LoggingConfig,
};
use strike_relay::shutdown::{graceful_shutdown, wait_for_shutdown_signal};
use strike_relay::websocket::RelayHub;

/// CLI arguments for strike-relay.
#[derive(Parser, Debug)]
#[command(name = "strike-relay")]
#[command(about = "Relays live lightning strikes to WebSocket subscribers")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Strikes kept in history (overrides config and MAX_STRIKES)
    #[arg(long)]
    max_strikes: Option<usize>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = with_bootstrap_logging(std::io::stderr, || load_config(&args))?;

    init_logging(&config.logging);

    tracing::info!("Starting strike relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        max_strikes = config.relay.max_strikes,
        send_backlog_on_connect = config.relay.send_backlog_on_connect,
        upstream = %config.capture.upstream_url,
        "Relay configured"
    );

    let shutdown = CancellationToken::new();
    let hub = Arc::new(RelayHub::new(config.hub_config()));

    // Capture pipeline
    let source = Arc::new(WebSocketSource::new(config.source_config()));
    let supervisor = CaptureSupervisor::new(source, Arc::clone(&hub), config.supervisor_config());
    let state = AppState::new(Arc::clone(&hub), config.api_config(), shutdown.clone())
        .with_capture(supervisor.state(), supervisor.stats());

    // Bind before starting capture so a taken port fails fast
    let listener = api::bind(&config.api_config())
        .await
        .context("Failed to bind listener")?;

    let mut server_handle = tokio::spawn(api::serve(listener, state));
    let supervisor_handle = supervisor.start(shutdown.clone());

    tokio::select! {
        result = wait_for_shutdown_signal() => {
            result.context("Failed to install signal handlers")?;
            tracing::info!("Shutdown signal received");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => tracing::warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
        }
    }

    // Later signals are only reported; the deadline below still applies
    tokio::spawn(async {
        while wait_for_shutdown_signal().await.is_ok() {
            tracing::info!("Shutdown already in progress");
        }
    });

    let pending = async move {
        if !server_handle.is_finished() {
            let _ = server_handle.await;
        }
        let _ = supervisor_handle.await;
    };

    let outcome = graceful_shutdown(&shutdown, &hub, pending, config.grace_period()).await;
    std::process::exit(outcome.exit_code());
}

/// Layer file, environment and CLI settings, then validate
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(max_strikes) = args.max_strikes {
        config.relay.max_strikes = max_strikes;
    }
    config.validate()?;

    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.filter_directive()));

    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
