//! Core domain types shared across the panel
//!
//! One canonical serde schema per backend resource. Normalization happens
//! here, once, at the network boundary: unknown fields are ignored and
//! missing optional fields default, so the rest of the crate never probes
//! loosely-typed payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Account summary as reported by the backend.
///
/// Replaced wholesale on every successful sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub cash: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub buying_power: f64,
    #[serde(default)]
    pub portfolio_value: f64,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub status: String,
}

/// One open position, keyed by symbol (unique within a snapshot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub avg_entry_price: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub market_value: f64,
    #[serde(default)]
    pub unrealized_pl: f64,
    #[serde(default)]
    pub unrealized_plpc: f64,
    #[serde(default = "default_side")]
    pub side: String,
}

fn default_side() -> String {
    "long".to_string()
}

/// Outcome class of a bot-taken action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Signal,
    Blocked,
    Error,
    Info,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 5] = [
        ActionStatus::Success,
        ActionStatus::Signal,
        ActionStatus::Blocked,
        ActionStatus::Error,
        ActionStatus::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Signal => "signal",
            ActionStatus::Blocked => "blocked",
            ActionStatus::Error => "error",
            ActionStatus::Info => "info",
        }
    }
}

impl Default for ActionStatus {
    fn default() -> Self {
        ActionStatus::Info
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the bot's audit log.
///
/// Ids are backend-assigned, unique, and monotonically increasing; they
/// define the stable arrival order used as a sort tiebreaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: u64,
    /// Unix milliseconds.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub qty: Option<f64>,
    #[serde(default)]
    pub notional: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default)]
    pub reason: String,
    /// Opaque structured context attached by the bot.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// Live (in-process) half of the bot status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotRuntimeStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub last_cycle_at: Option<i64>,
    #[serde(default)]
    pub iterations: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub halted_reason: Option<String>,
}

/// Durable half of the bot status report, persisted by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotPersistedStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub last_heartbeat: Option<i64>,
    #[serde(default)]
    pub iterations: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub halted_reason: Option<String>,
    #[serde(default)]
    pub day_start_equity: Option<f64>,
    #[serde(default)]
    pub day_start_ts: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Read-only bot status; the panel never writes this back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    #[serde(default)]
    pub runtime: BotRuntimeStatus,
    #[serde(default)]
    pub persisted: BotPersistedStatus,
}

// ── Response envelopes ──────────────────────────────────────────────────

/// `{items: [...]}` list wrapper used by the positions and actions endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

/// `{config: {...}}` wrapper used by the bot config endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse<T> {
    pub config: T,
}

/// `{removed: n}` reply from the action-log clear endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearResponse {
    #[serde(default)]
    pub removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_record_defaults_missing_fields() {
        let record: ActionRecord =
            serde_json::from_str(r#"{"id": 7, "ts": 1000, "action_type": "entry"}"#).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.status, ActionStatus::Info);
        assert!(record.qty.is_none());
        assert!(record.payload.is_empty());
    }

    #[test]
    fn test_action_status_roundtrips_lowercase() {
        for status in ActionStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        let parsed: ActionStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(parsed, ActionStatus::Blocked);
    }

    #[test]
    fn test_position_side_defaults_to_long() {
        let pos: Position = serde_json::from_str(r#"{"symbol": "BTC/USD"}"#).unwrap();
        assert_eq!(pos.side, "long");
    }

    #[test]
    fn test_bot_status_accepts_partial_payload() {
        let status: BotStatus =
            serde_json::from_str(r#"{"runtime": {"running": true}}"#).unwrap();
        assert!(status.runtime.running);
        assert!(!status.persisted.running);
    }
}
