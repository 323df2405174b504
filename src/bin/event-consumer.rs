//! Standalone checkout consumer.
//!
//! Runs one of the gateway's event consumers as its own process against an
//! external broker, so notification and analytics can be deployed and
//! restarted independently of the gateway (set `consumers.notification` /
//! `consumers.analytics` to false there).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use service_gateway::config::load_config;
use service_gateway::events::{connect, AnalyticsHandler, Consumer, EventHandler, NotificationHandler};
use service_gateway::lifecycle::signals::spawn_signal_listener;
use service_gateway::lifecycle::{Shutdown, ANALYTICS_QUEUE, NOTIFICATION_QUEUE};
use service_gateway::observability::logging;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Notification,
    Analytics,
}

#[derive(Parser)]
#[command(name = "event-consumer", version, about = "Consume checkout events from the broker")]
struct Args {
    /// Which consumer to run.
    #[arg(value_enum)]
    kind: Kind,

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

    let Some(url) = config.broker.url.as_deref() else {
        eprintln!("broker.url (or BROKER_URL) is required to run a standalone consumer");
        std::process::exit(1);
    };
    let broker = connect(url).await?;

    let (queue, handler): (&str, Arc<dyn EventHandler>) = match args.kind {
        Kind::Notification => (NOTIFICATION_QUEUE, Arc::new(NotificationHandler::new())),
        Kind::Analytics => (ANALYTICS_QUEUE, Arc::new(AnalyticsHandler::new())),
    };
    let consumer = Consumer::bind(
        broker,
        &config.broker.exchange,
        queue,
        &config.consumers.pattern,
        handler,
    )
    .await?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    consumer.run(shutdown.subscribe()).await;

    tracing::info!(queue = %queue, "Consumer stopped");
    Ok(())
}
