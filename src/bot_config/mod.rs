//! Bot configuration draft management
//!
//! Holds an editable local copy of the remote bot configuration and performs
//! atomic read-merge-write updates against the backend. The server is
//! authoritative: a successful save replaces the draft with the confirmed
//! config, and any field the server omits is filled from the fixed defaults
//! so the draft is always fully populated.

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{ApiError, BackendApi};

/// Whether the bot is allowed to submit real orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Offline,
}

impl<'de> Deserialize<'de> for TradingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Anything that is not exactly "live" degrades to offline.
        let raw = String::deserialize(deserializer)?;
        Ok(if raw.trim().eq_ignore_ascii_case("live") {
            TradingMode::Live
        } else {
            TradingMode::Offline
        })
    }
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Live => "live",
            TradingMode::Offline => "offline",
        }
    }
}

/// Which brokerage credentials the bot trades with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Paper,
    Live,
}

impl<'de> Deserialize<'de> for AccountMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw.trim().eq_ignore_ascii_case("live") {
            AccountMode::Live
        } else {
            AccountMode::Paper
        })
    }
}

impl AccountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountMode::Paper => "paper",
            AccountMode::Live => "live",
        }
    }
}

/// Short-horizon strategy group toggles and sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortTermConfig {
    pub mean_reversion_enabled: bool,
    pub breakout_enabled: bool,
    pub base_notional: f64,
    pub breakout_notional: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub breakout_lookback_bars: u32,
    pub breakout_volume_mult: f64,
    pub breakout_buffer_pct: f64,
    pub dip_notional_multiplier: f64,
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            mean_reversion_enabled: true,
            breakout_enabled: true,
            base_notional: 6.0,
            breakout_notional: 7.5,
            rsi_oversold: 28.0,
            rsi_overbought: 72.0,
            breakout_lookback_bars: 20,
            breakout_volume_mult: 1.9,
            breakout_buffer_pct: 0.15,
            dip_notional_multiplier: 1.3,
        }
    }
}

/// Long-horizon strategy group toggles and sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongTermConfig {
    pub ma_crossover_enabled: bool,
    pub ma_fast: u32,
    pub ma_slow: u32,
    pub crossover_notional: f64,
    pub dca_enabled: bool,
    pub dca_notional: f64,
    pub dca_interval_min: u32,
    pub dca_dip_pct: f64,
    pub dca_dip_multiplier: f64,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            ma_crossover_enabled: true,
            ma_fast: 50,
            ma_slow: 200,
            crossover_notional: 8.0,
            dca_enabled: true,
            dca_notional: 4.0,
            dca_interval_min: 180,
            dca_dip_pct: 1.5,
            dca_dip_multiplier: 1.5,
        }
    }
}

/// Client-side take-profit / stop-loss exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticExitsConfig {
    pub enabled: bool,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

impl Default for SyntheticExitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            take_profit_pct: 3.0,
            stop_loss_pct: 1.8,
        }
    }
}

/// Full bot configuration as the backend reports it.
///
/// Container-level serde default means a partial server response yields a
/// draft with every absent field taken from these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    pub trading_mode: TradingMode,
    pub account_mode: AccountMode,
    pub poll_interval_sec: u64,
    pub timeframe: String,
    pub symbols: Vec<String>,
    pub auto_discover_pairs: bool,
    pub auto_discover_limit: u32,
    pub auto_discover_quote: String,
    pub auto_discover_tradable_only: bool,
    pub min_order_notional_usd: f64,
    pub max_open_positions: u32,
    pub max_notional_per_trade: f64,
    pub max_total_exposure: f64,
    pub max_daily_drawdown_pct: f64,
    pub cooldown_sec: u64,
    pub anti_spam_sec: u64,
    pub short_term: ShortTermConfig,
    pub long_term: LongTermConfig,
    pub synthetic_exits: SyntheticExitsConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trading_mode: TradingMode::Offline,
            account_mode: AccountMode::Paper,
            poll_interval_sec: 30,
            timeframe: "1Min".to_string(),
            symbols: vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            auto_discover_pairs: false,
            auto_discover_limit: 20,
            auto_discover_quote: "USD".to_string(),
            auto_discover_tradable_only: true,
            min_order_notional_usd: 10.0,
            max_open_positions: 3,
            max_notional_per_trade: 15.0,
            max_total_exposure: 250.0,
            max_daily_drawdown_pct: 4.0,
            cooldown_sec: 90,
            anti_spam_sec: 30,
            short_term: ShortTermConfig::default(),
            long_term: LongTermConfig::default(),
            synthetic_exits: SyntheticExitsConfig::default(),
        }
    }
}

/// Normalize a free-form symbol list: trim, uppercase, drop empties,
/// drop exact duplicates, preserve first-seen order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in symbols {
        let sym = raw.trim().to_uppercase();
        if sym.is_empty() {
            continue;
        }
        if seen.insert(sym.clone()) {
            out.push(sym);
        }
    }
    out
}

/// Failures specific to the draft coordinator.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A second save was requested while one is already in flight.
    #[error("a config save is already in flight")]
    SaveInFlight,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Editable local draft of the remote bot configuration.
///
/// Edits are purely local; `save` performs the read-merge-write round trip.
/// Edits made while a save is in flight land on the draft used by the next
/// save, never the one already sent.
pub struct ConfigDraft {
    draft: Mutex<BotConfig>,
    saving: AtomicBool,
}

impl ConfigDraft {
    pub fn new() -> Self {
        Self {
            draft: Mutex::new(BotConfig::default()),
            saving: AtomicBool::new(false),
        }
    }

    /// Replace the draft with the server's reported configuration.
    pub async fn load(&self, api: &dyn BackendApi) -> Result<BotConfig, ApiError> {
        let config = api.fetch_bot_config().await?;
        let mut draft = self.draft.lock().await;
        *draft = config.clone();
        Ok(config)
    }

    /// Current draft value.
    pub async fn draft(&self) -> BotConfig {
        self.draft.lock().await.clone()
    }

    /// Apply a pure local mutation to the draft. Never contacts the server.
    pub async fn edit<F>(&self, mutate: F)
    where
        F: FnOnce(&mut BotConfig),
    {
        let mut draft = self.draft.lock().await;
        mutate(&mut draft);
    }

    /// Whether a save round trip is currently in flight.
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Submit the full draft as a partial-update request.
    ///
    /// On success the draft is replaced by the server-confirmed config; on
    /// failure the draft is left exactly as the user left it.
    pub async fn save(&self, api: &dyn BackendApi) -> Result<BotConfig, ConfigError> {
        if self.saving.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::SaveInFlight);
        }

        // Snapshot the draft at send time; later edits belong to the next
        // save. Normalization applies to the outgoing payload only, so a
        // failed save leaves the draft exactly as the user typed it.
        let snapshot = self.draft.lock().await.clone();
        let mut outgoing = snapshot.clone();
        outgoing.symbols = normalize_symbols(&outgoing.symbols);

        let result = api.update_bot_config(&outgoing).await;
        self.saving.store(false, Ordering::SeqCst);

        match result {
            Ok(confirmed) => {
                let mut draft = self.draft.lock().await;
                // The server is authoritative over what was sent. Edits made
                // while the save was in flight stay in the draft for the
                // next save instead of being clobbered by the echo.
                if *draft == snapshot {
                    *draft = confirmed.clone();
                }
                info!("Bot config saved ({} symbols)", confirmed.symbols.len());
                Ok(confirmed)
            }
            Err(e) => {
                warn!("Bot config save failed: {}", e);
                Err(ConfigError::Api(e))
            }
        }
    }
}

impl Default for ConfigDraft {
    fn default() -> Self {
        Self::new()
    }
}
