//! BotDeck operator binary
//!
//! Runs the sync loop against the configured backend and logs the merged
//! snapshot each cycle. Rendering, routing, and auth live elsewhere.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use botdeck::api::ApiClient;
use botdeck::bus::EventBus;
use botdeck::cache::SnapshotCache;
use botdeck::config::PanelConfig;
use botdeck::sync::SyncCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PanelConfig::load()?;
    info!("Starting botdeck: {}", config.digest());

    let api = Arc::new(ApiClient::new(&config.backend.base_url, config.backend.timeout_ms));
    let cache = SnapshotCache::open(Path::new(&config.cache.data_dir));
    let bus = EventBus::new();
    let coordinator = Arc::new(SyncCoordinator::new(api, cache, bus, &config));

    // Prime the panel before the timer kicks in.
    let report = coordinator.refresh(true).await;
    if !report.is_clean() {
        warn!("Initial sync incomplete, serving last-known data where available");
    }

    let state = coordinator.state();
    let log = coordinator.log();
    let mut state_rx = coordinator.bus().subscribe_state();

    let loop_handle = tokio::spawn(
        Arc::clone(&coordinator).run(Duration::from_secs(config.sync.poll_interval_secs)),
    );

    let summary_handle = tokio::spawn(async move {
        while let Ok(update) = state_rx.recv().await {
            let status = state.bot_status().await;
            let actions = log.lock().await.records().len();
            info!(
                "portfolio=${:.2} mode={} running={} actions={}",
                update.portfolio_value,
                update.trading_mode.as_str(),
                status.runtime.running,
                actions
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    loop_handle.abort();
    summary_handle.abort();

    Ok(())
}
