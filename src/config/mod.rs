//! Panel configuration
//!
//! Loads from config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Settings for the panel core itself (not the remote bot config).
#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the bot backend API
    pub base_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Timer-driven refresh interval in seconds
    pub poll_interval_secs: u64,
    /// Action log fetch window (most-recent N records)
    pub action_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory for session-durable state
    pub data_dir: String,
    /// Freshness window for the account snapshot in milliseconds
    pub account_ttl_ms: i64,
    /// Freshness window for the bot config in milliseconds
    pub config_ttl_ms: i64,
}

impl PanelConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Backend defaults
            .set_default("backend.base_url", "http://127.0.0.1:8000/api/alpaca/crypto")?
            .set_default("backend.timeout_ms", 15_000)?
            // Sync defaults
            .set_default("sync.poll_interval_secs", 10)?
            .set_default("sync.action_limit", 200)?
            // Cache defaults
            .set_default("cache.data_dir", "./data")?
            .set_default("cache.account_ttl_ms", 30_000)?
            .set_default("cache.config_ttl_ms", 120_000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (BOTDECK_*)
            .add_source(Environment::with_prefix("BOTDECK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let panel_config: PanelConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(panel_config)
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "backend={} poll={}s actions={} data_dir={}",
            self.backend.base_url,
            self.sync.poll_interval_secs,
            self.sync.action_limit,
            self.cache.data_dir
        )
    }
}

impl std::fmt::Display for PanelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
