//! BotDeck Library
//!
//! State synchronization, caching, and audit-log query engine for the
//! trading bot control panel

pub mod actions;
pub mod api;
pub mod bot_config;
pub mod bus;
pub mod cache;
pub mod config;
pub mod sync;
pub mod types;
