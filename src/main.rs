//! # containerd-events
//!
//! Subscribes to the containerd event service and prints every received
//! event as one JSON line on stdout.
//!
//! ## Usage
//! `containerd-events [CONFIG_FILE]`
//!
//! Without a config file the settings come from the environment.
//!
//! ## Environment variables
//! - `CONTAINERD_EVENTS_ADDRESS`: containerd socket (default: /run/containerd/containerd.sock)
//! - `CONTAINERD_EVENTS_NAMESPACE`: namespace sent with the subscription
//! - `CONTAINERD_EVENTS_FILTERS`: comma separated event filters
//! - `CONTAINERD_EVENTS_POLL_INTERVAL_MS`: completion queue wait bound (default: 1000)
//! - `CONTAINERD_EVENTS_DRAIN_INTERVAL_MS`: output drain interval (default: 1000)
//! - `CONTAINERD_EVENTS_LOG_LEVEL`: log level when `RUST_LOG` is unset (default: info)

use containerd_events::{config::Config, publisher::ContainerEventPublisher};
use std::io::Write;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing - RUST_LOG wins over the configured level
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .or_else(|| config.log_level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    // Logs go to stderr so stdout only carries events
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("containerd-events v{}", containerd_events::VERSION);
    info!(
        "Configuration loaded: address={}, namespace={:?}, filters={:?}",
        config.address, config.namespace, config.filters
    );

    // Setup graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Spawn signal handler
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM signal");
                        }
                        _ = sigint.recv() => {
                            info!("Received SIGINT signal");
                        }
                    }
                }
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(windows)]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C signal");
        }

        let _ = shutdown_tx.send(());
    });

    let mut publisher = ContainerEventPublisher::new(config.clone());
    tokio::task::block_in_place(|| publisher.set_up())?;
    info!("Event subscription started");

    let mut interval = tokio::time::interval(config.drain_interval());
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received, stopping subscription...");
                break;
            }
            _ = interval.tick() => {
                let events = match tokio::task::block_in_place(|| publisher.run()) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Failed to drain events: {}", e);
                        continue;
                    }
                };

                let mut out = stdout.lock();
                for event in events {
                    writeln!(out, "{}", serde_json::to_string(&event)?)?;
                }
                out.flush()?;
            }
        }
    }

    tokio::task::block_in_place(|| publisher.tear_down());

    info!("Shutdown complete");
    Ok(())
}
