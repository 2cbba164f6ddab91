//! Sync coordinator
//!
//! Fans out concurrent fetches to every backend resource, isolates
//! per-resource failure, and publishes a merged snapshot. A resource that
//! fails keeps its previously published value and is reported stale through
//! the error channel instead of going blank.
//!
//! Every refresh cycle is tagged with a generation counter at issue time; a
//! response is applied only if no newer generation has already been applied
//! for that resource, so an older, slow request can never overwrite a newer,
//! fast one. Timer-driven and manual refreshes share this one code path and
//! may overlap freely.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::actions::ActionLogEngine;
use crate::api::{ApiResult, BackendApi};
use crate::bot_config::BotConfig;
use crate::bus::{EventBus, StateUpdate};
use crate::cache::SnapshotCache;
use crate::config::PanelConfig;
use crate::types::{AccountSnapshot, ActionRecord, BotStatus, Position};

/// Logical resources reconciled by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Account,
    Positions,
    Actions,
    BotStatus,
    BotConfig,
}

impl Resource {
    /// Cache key / log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Account => "account",
            Resource::Positions => "positions",
            Resource::Actions => "actions",
            Resource::BotStatus => "bot_status",
            Resource::BotConfig => "bot_config",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published slice plus the generation that last touched it.
#[derive(Debug, Default)]
struct Slice<T> {
    value: T,
    generation: u64,
    /// Error from the most recent cycle that touched this slice, if any.
    error: Option<String>,
}

impl<T: Clone> Slice<T> {
    /// Replace the value if `generation` is not older than what is already
    /// applied. Returns whether the slice was replaced.
    fn apply(&mut self, generation: u64, value: T) -> bool {
        if generation < self.generation {
            debug!("Discarding stale response (gen {} < {})", generation, self.generation);
            return false;
        }
        self.generation = generation;
        self.value = value;
        self.error = None;
        true
    }

    /// Record a failure, keeping the previous value. The generation still
    /// advances so an even older success cannot land afterwards.
    fn fail(&mut self, generation: u64, error: String) -> bool {
        if generation < self.generation {
            return false;
        }
        self.generation = generation;
        self.error = Some(error);
        true
    }
}

/// Published, reconciled panel state. Every slice is replaced wholesale on
/// successful update; there is no field-level merging across writers.
#[derive(Default)]
pub struct PanelState {
    account: RwLock<Slice<AccountSnapshot>>,
    positions: RwLock<Slice<Vec<Position>>>,
    bot_status: RwLock<Slice<BotStatus>>,
    bot_config: RwLock<Slice<BotConfig>>,
    last_sync_ms: RwLock<Option<i64>>,
}

impl PanelState {
    pub async fn account(&self) -> AccountSnapshot {
        self.account.read().await.value.clone()
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.positions.read().await.value.clone()
    }

    pub async fn bot_status(&self) -> BotStatus {
        self.bot_status.read().await.value.clone()
    }

    pub async fn bot_config(&self) -> BotConfig {
        self.bot_config.read().await.value.clone()
    }

    /// Per-resource staleness: resources whose latest cycle failed, with the
    /// error surfaced verbatim.
    pub async fn stale_resources(&self) -> HashMap<Resource, String> {
        let mut out = HashMap::new();
        if let Some(e) = &self.account.read().await.error {
            out.insert(Resource::Account, e.clone());
        }
        if let Some(e) = &self.positions.read().await.error {
            out.insert(Resource::Positions, e.clone());
        }
        if let Some(e) = &self.bot_status.read().await.error {
            out.insert(Resource::BotStatus, e.clone());
        }
        if let Some(e) = &self.bot_config.read().await.error {
            out.insert(Resource::BotConfig, e.clone());
        }
        out
    }

    pub async fn last_sync_ms(&self) -> Option<i64> {
        *self.last_sync_ms.read().await
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub generation: u64,
    /// Resources that failed this cycle and are now serving stale data.
    pub errors: Vec<(Resource, String)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reconciles the backend resources into [`PanelState`] and drives the
/// action log engine.
pub struct SyncCoordinator {
    api: Arc<dyn BackendApi>,
    cache: SnapshotCache,
    bus: EventBus,
    state: Arc<PanelState>,
    log: Arc<Mutex<ActionLogEngine>>,
    generation: AtomicU64,
    /// Generation guard for action-log ingestion.
    actions_generation: Mutex<u64>,
    action_limit: usize,
    account_ttl_ms: i64,
    config_ttl_ms: i64,
}

impl SyncCoordinator {
    pub fn new(api: Arc<dyn BackendApi>, cache: SnapshotCache, bus: EventBus, config: &PanelConfig) -> Self {
        Self {
            api,
            cache,
            bus,
            state: Arc::new(PanelState::default()),
            log: Arc::new(Mutex::new(ActionLogEngine::new())),
            generation: AtomicU64::new(0),
            actions_generation: Mutex::new(0),
            action_limit: config.sync.action_limit,
            account_ttl_ms: config.cache.account_ttl_ms,
            config_ttl_ms: config.cache.config_ttl_ms,
        }
    }

    pub fn state(&self) -> Arc<PanelState> {
        Arc::clone(&self.state)
    }

    pub fn log(&self) -> Arc<Mutex<ActionLogEngine>> {
        Arc::clone(&self.log)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Cache-or-live read for the account snapshot. `force` always goes to
    /// the network and writes the result back.
    async fn fetch_account(&self, force: bool) -> ApiResult<AccountSnapshot> {
        if !force {
            if let Some(cached) = self.cache.get::<AccountSnapshot>(Resource::Account.as_str()).await {
                debug!("Serving account from cache");
                return Ok(cached);
            }
        }
        let account = self.api.fetch_account().await?;
        self.cache
            .put(Resource::Account.as_str(), &account, self.account_ttl_ms)
            .await;
        Ok(account)
    }

    async fn fetch_bot_config(&self, force: bool) -> ApiResult<BotConfig> {
        if !force {
            if let Some(cached) = self.cache.get::<BotConfig>(Resource::BotConfig.as_str()).await {
                debug!("Serving bot config from cache");
                return Ok(cached);
            }
        }
        let config = self.api.fetch_bot_config().await?;
        self.cache
            .put(Resource::BotConfig.as_str(), &config, self.config_ttl_ms)
            .await;
        Ok(config)
    }

    /// Refresh all resources concurrently and merge the results.
    ///
    /// Both the interval timer and manual triggers land here; overlapping
    /// invocations are tolerated, the generation guard decides which
    /// responses win.
    pub async fn refresh(&self, force: bool) -> SyncReport {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Refresh cycle {} (force={})", generation, force);

        let (account, positions, actions, bot_status, bot_config) = tokio::join!(
            self.fetch_account(force),
            self.api.fetch_positions(),
            self.api.fetch_actions(self.action_limit),
            self.api.fetch_bot_status(),
            self.fetch_bot_config(force),
        );

        let mut errors = Vec::new();

        let account_ok =
            Self::apply(&self.state.account, generation, Resource::Account, account, &mut errors).await;
        Self::apply(&self.state.positions, generation, Resource::Positions, positions, &mut errors)
            .await;
        Self::apply(&self.state.bot_status, generation, Resource::BotStatus, bot_status, &mut errors)
            .await;
        let config_ok =
            Self::apply(&self.state.bot_config, generation, Resource::BotConfig, bot_config, &mut errors)
                .await;

        self.ingest_actions(generation, actions, &mut errors).await;

        *self.state.last_sync_ms.write().await = Some(chrono::Utc::now().timestamp_millis());

        let report = SyncReport { generation, errors };
        if report.is_clean() {
            info!("Sync cycle {} clean", generation);
        } else {
            for (resource, error) in &report.errors {
                warn!("Sync cycle {}: {} stale: {}", generation, resource, error);
            }
        }

        // Compact summary for sibling panels, from the published slices.
        if account_ok && config_ok {
            let portfolio_value = self.state.account().await.portfolio_value;
            let trading_mode = self.state.bot_config().await.trading_mode;
            self.bus.publish_state(StateUpdate {
                portfolio_value,
                trading_mode,
            });
        }

        report
    }

    async fn apply<T: Clone>(
        slice: &RwLock<Slice<T>>,
        generation: u64,
        resource: Resource,
        result: ApiResult<T>,
        errors: &mut Vec<(Resource, String)>,
    ) -> bool {
        let mut slot = slice.write().await;
        match result {
            Ok(value) => slot.apply(generation, value),
            Err(e) => {
                errors.push((resource, e.to_string()));
                slot.fail(generation, e.to_string());
                false
            }
        }
    }

    async fn ingest_actions(
        &self,
        generation: u64,
        result: ApiResult<Vec<ActionRecord>>,
        errors: &mut Vec<(Resource, String)>,
    ) {
        match result {
            Ok(records) => {
                let mut marker = self.actions_generation.lock().await;
                if generation < *marker {
                    debug!("Discarding stale action window (gen {} < {})", generation, *marker);
                    return;
                }
                *marker = generation;
                self.log.lock().await.ingest(records);
            }
            Err(e) => {
                // The working set keeps its previous window.
                errors.push((Resource::Actions, e.to_string()));
            }
        }
    }

    // ── Control commands ────────────────────────────────────────────────
    // Fire-and-refresh: issue the command, then force a full resync so the
    // published state reflects the new bot state.

    pub async fn start_bot(&self) -> ApiResult<SyncReport> {
        self.api.start_bot().await?;
        info!("Bot start requested");
        Ok(self.refresh(true).await)
    }

    pub async fn stop_bot(&self) -> ApiResult<SyncReport> {
        self.api.stop_bot().await?;
        info!("Bot stop requested");
        Ok(self.refresh(true).await)
    }

    pub async fn flatten_positions(&self) -> ApiResult<SyncReport> {
        self.api.flatten_positions().await?;
        info!("Emergency flatten requested");
        Ok(self.refresh(true).await)
    }

    /// Timer loop plus resync-on-request: refreshes every `interval` and
    /// whenever a sibling panel publishes a mode change. Runs until the
    /// task is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        let mut mode_rx = self.bus.subscribe_mode_change();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh(false).await;
                }
                request = mode_rx.recv() => {
                    match request {
                        Ok(request) => {
                            info!("Mode change to {} requested, forcing resync", request.trading_mode.as_str());
                            self.refresh(true).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Missed {} mode change requests, forcing resync", skipped);
                            self.refresh(true).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}
