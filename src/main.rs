//! Service gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                   SERVICE GATEWAY                     │
//!                    │                                                       │
//!   Client Request   │  ┌────────┐   ┌──────────┐   ┌──────────┐   ┌───────┐ │
//!   ─────────────────┼─▶│  http  │──▶│ routing  │──▶│ registry │──▶│circuit│─┼──▶ Backend
//!                    │  │ server │   │  table   │   │  lookup  │   │breaker│ │
//!                    │  └───┬────┘   └──────────┘   └────▲─────┘   └───────┘ │
//!                    │      │ checkout                   │ probes            │
//!                    │      ▼                       ┌────┴─────┐             │
//!                    │  ┌─────────┐                 │  health  │             │
//!                    │  │publisher│                 │  prober  │             │
//!                    │  └───┬─────┘                 └──────────┘             │
//!                    │      ▼                                                │
//!                    │  ┌──────────────┐   ┌──────────────┐                  │
//!                    │  │ topic broker │──▶│  consumers   │ notification     │
//!                    │  │  (exchange)  │   │ (per queue)  │ analytics        │
//!                    │  └──────────────┘   └──────────────┘                  │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::load_config;
use service_gateway::events::{connect, Broker, InMemoryBroker};
use service_gateway::lifecycle::signals::spawn_signal_listener;
use service_gateway::lifecycle::Gateway;
use service_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "service-gateway", version, about = "API gateway with service registry and event pipeline")]
struct Args {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        environment = ?config.environment,
        bind_address = %config.listener.bind_address,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        breaker_threshold = config.circuit_breaker.failure_threshold,
        breaker_open_secs = config.circuit_breaker.open_duration_secs,
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

    let broker: std::sync::Arc<dyn Broker> = match config.broker.url.as_deref() {
        Some(url) => connect(url).await?,
        None => {
            tracing::warn!("No broker URL configured, events stay inside this process");
            std::sync::Arc::new(InMemoryBroker::new())
        }
    };

    let gateway = Gateway::start(config.clone(), broker).await?;
    spawn_signal_listener(gateway.shutdown());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    gateway.serve(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
