//! Playout Server
//!
//! A thin async control-plane service around `playout-core`: starts and
//! stops playout channels, admits content blocks, and drives preview/live
//! switching, each channel running its deterministic tick loop on its own
//! blocking OS thread.

#![allow(dead_code)]

mod channel;
mod config;
mod config_file;
mod error;
mod http;
mod limits;
mod metrics;
mod net_sink;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "playout-server";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    playout_core::ffmpeg_init().map_err(|e| crate::error::ServerError::Internal(e.to_string()))?;
    playout_core::ffmpeg_log_filter();
    tracing::info!("FFmpeg initialized successfully");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        match crate::config_file::ConfigFile::from_file(&config_path) {
            Ok(cf) => cf.into_server_config(),
            Err(e) => {
                tracing::warn!("Failed to load config file {}: {}. Using defaults.", config_path, e);
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };
    tracing::info!("Configuration loaded: {:?}", config);

    let state = Arc::new(AppState::new(config.clone()));

    {
        let state_bg = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let removed = state_bg.cleanup_finished_channels().await;
                if removed > 0 {
                    tracing::info!("Reaped {} finished channel(s)", removed);
                }
                state_bg.metrics.set_active_channels(state_bg.channel_count() as u64);
            }
        });
    }

    let app = create_router(state.clone());

    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| crate::error::ServerError::Config(format!("invalid host/port: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playout_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
