//! Accumulator server - counts and inspects context broker notifications
//!
//! Launches a pool of HTTP responders (plus a pool of delayed responders), or
//! an MQTT subscriber, and logs the number of notifications received every
//! second.

use accumulator::app;
use accumulator::args::Args;
use accumulator::config::{IngestMode, ListenerConfig};
use anyhow::{Context, Result};
use tracing::info;

/// Initialize tracing subscriber for structured logging
fn setup_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"))
                .add_directive("rumqttc=warn".parse()?),
        )
        .init();
    Ok(())
}

/// Announce the switches that change what gets logged
fn print_startup_info(config: &ListenerConfig) {
    if config.verbose {
        info!("# Verbosity activated");
    }
    if config.timestamp_diagnostics {
        info!("# Timestamp activated");
    }
    if config.accumulator_mode {
        info!("# Accumulator mode activated");
    }
    if config.silent {
        return;
    }
    match config.mode() {
        IngestMode::Http {
            plain_ports,
            delayed_ports,
        } => {
            if let Some(first) = plain_ports.first() {
                info!("Setup ports starting at: {}", first);
            }
            if let Some(first) = delayed_ports.first() {
                info!(
                    "Setup delayed ports starting at: {} (delay {} ms)",
                    first,
                    config.delay.as_millis()
                );
            }
        }
        IngestMode::Mqtt(broker) => info!("MQTT broker: {}", broker),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_with_legacy();
    setup_logging()?;

    let config = ListenerConfig::from_args(&args).context("Invalid configuration")?;
    print_startup_info(&config);

    let running = app::start(&config).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    running.shutdown();

    Ok(())
}
