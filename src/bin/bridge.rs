//! PCM WebSocket Bridge
//!
//! Accepts raw PCM over WebSocket and plays it on the local output device.
//!
//! Usage: `pcm-ws-bridge [CONFIG.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_ws_bridge::{
    audio::{dispatch_queue, list_output_devices, PlaybackLoop},
    config::AppConfig,
    ui::{AppState, WebServer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PCM WebSocket bridge");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        tracing::debug!(
            "Output device {}{}: rates {:?}, channels {:?}",
            device.name,
            default_marker,
            device.sample_rates,
            device.channels
        );
    }

    let format = config.audio.format()?;
    tracing::info!(
        "Expecting {} Hz, {} channel(s), {}-byte signed PCM",
        format.sample_rate(),
        format.channels(),
        format.precision()
    );

    let (queue_tx, queue_rx) = dispatch_queue(config.queue.capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let playback = match PlaybackLoop::start(&config.audio, &format, queue_rx, shutdown_rx) {
        Ok(playback) => playback,
        Err(e) => {
            tracing::error!("Audio output unavailable: {}", e);
            return Err(e).context("failed to initialize audio output");
        }
    };

    let state = AppState::new(&config, format, queue_tx);
    let server = WebServer::new(config.server.clone(), state);

    let served = server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await;

    let _ = shutdown_tx.send(true);
    playback.join().await;

    if let Err(e) = served {
        tracing::error!("Server failed: {}", e);
        return Err(e).context("web server failed");
    }

    tracing::info!("Stopped");
    Ok(())
}
