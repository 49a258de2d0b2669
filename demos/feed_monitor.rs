//! Feed Monitor - live view of a decoded signal feed
//!
//! Usage: feed_monitor [config.toml] [file.dbc]
//!
//! Connects to the feed, routes signals into a few logging sinks and
//! prints pipeline events until Ctrl+C. When a DBC path is given it is
//! sent to the backend over the command socket first.

use gauge_feed::{
    CommandClient, FeedClient, LogRenderer, PipelineConfig, PipelineEvent, SinkConfig, SinkKind,
    SinkRegistry,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn demo_sinks() -> Vec<SinkConfig> {
    vec![
        SinkConfig::gauge("Engine RPM", 0.0, 8000.0, ["rpm", "engine_rpm", "engine_speed"])
            .with_unit("RPM"),
        SinkConfig::gauge("Speed", 0.0, 240.0, ["speed", "vehicle_speed"])
            .with_unit("km/h")
            .with_display(SinkKind::Readout {
                digits: 3,
                decimals: 0,
            }),
        SinkConfig::gauge("Coolant", 40.0, 130.0, ["coolant_temp", "engine_coolant_temp"])
            .with_unit("°C"),
        SinkConfig::gauge("Check Engine", 0.0, 1.0, ["mil", "check_engine"])
            .with_display(SinkKind::Indicator { threshold: 0.5 }),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gauge_feed=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    if config.sinks.is_empty() {
        config.sinks = demo_sinks();
    }

    if let Some(dbc) = args.next() {
        let mut commands = CommandClient::new(&config.command_url, config.command_timeout())?;
        match commands.connect().await {
            Ok(()) => match commands.load_dbc(&dbc).await {
                Ok(response) => info!("DBC loaded: {}", response.message),
                Err(e) => error!("Failed to load DBC {}: {}", dbc, e),
            },
            Err(e) => warn!("Command socket unavailable: {}", e),
        }
        commands.close();
    }

    println!("Feed:    {}", config.feed_url);
    println!("Policy:  {}", config.backpressure);
    println!(
        "Ticks:   poll {}ms / flush {}ms",
        config.poll_interval_ms, config.flush_interval_ms
    );
    println!("Sinks:   {}\n", config.sinks.len());

    let registry = SinkRegistry::from_configs(&config.sinks, config.thresholds(), LogRenderer)?;
    let client = FeedClient::start(config, registry).await?;
    let mut events = client.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PipelineEvent::SignalApplied { name, value, decision }) => {
                    println!("{:<24} {:>12.3}  {}", name, value, decision);
                }
                Ok(PipelineEvent::DecodedFrame { .. }) => {}
                Ok(PipelineEvent::RawFrame(raw)) => {
                    println!("raw {:<20} {}", raw.id_hex, raw.data_hex);
                }
                Ok(PipelineEvent::ConnectionChanged(state)) => println!("== connection {}", state),
                Ok(PipelineEvent::StatusChanged(status)) => println!("== {}", status),
                Ok(PipelineEvent::ErrorOccurred(message)) => eprintln!("!! {}", message),
                Err(RecvError::Lagged(missed)) => warn!("Monitor lagging, {} events missed", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await?;
    Ok(())
}
