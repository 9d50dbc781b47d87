//! Notes service (v1)
//!
//! An HTTP notes API gated by an ordered admission pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                      NOTES SERVICE                         │
//!                     │                                                            │
//!   Client Request    │  ┌──────────┐   ┌────────────┐   ┌───────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│   rate   │──▶│   bearer   │──▶│ input │──▶│ handlers │  │
//!                     │  │  limiter │   │   token    │   │ valid.│   │ + notes  │  │
//!                     │  └────┬─────┘   └─────┬──────┘   └───┬───┘   └────┬─────┘  │
//!                     │       │ 429           │ 401          │ 400/413    │        │
//!   Client Response   │       ▼               ▼              ▼            ▼        │
//!   ◀─────────────────┼───────────────────── response + RateLimit-* ─────────────  │
//!                     │                                                            │
//!                     │  ┌──────────────────────────────────────────────────────┐  │
//!                     │  │  config │ observability (tracing, metrics) │ lifecycle │  │
//!                     │  └──────────────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use notes_gate::config::{resolve_config, Overrides};
use notes_gate::observability::{logging, metrics};
use notes_gate::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "notes-gate")]
#[command(
    about = "Notes API behind rate limiting, bearer tokens and input validation",
    long_about = None
)]
struct Args {
    /// Optional TOML configuration file.
    #[arg(short, long, env = "NOTES_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on; overrides the configured bind address port.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Token signing secret.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Instance identifier reported by /health and /whoami.
    #[arg(long, env = "INSTANCE")]
    instance: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = resolve_config(
        args.config.as_deref(),
        Overrides {
            port: args.port,
            secret: args.secret,
            instance: args.instance,
        },
    )?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("notes-gate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        instance = %config.instance.id,
        rate_limit_enabled = config.rate_limit.enabled,
        window_ms = config.rate_limit.window_ms,
        max_requests = config.rate_limit.max_requests,
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

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
