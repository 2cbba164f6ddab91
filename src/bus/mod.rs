//! Cross-panel event bus
//!
//! Decouples this panel from sibling UI panels (e.g. a global header) via
//! in-process publish/subscribe. One broadcast channel per topic gives
//! in-order delivery within a topic; dropping the returned receiver is the
//! unsubscribe handle, so a torn-down panel cannot leak handlers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::bot_config::TradingMode;

const CHANNEL_CAPACITY: usize = 64;

/// Compact summary broadcast after every successful sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub portfolio_value: f64,
    pub trading_mode: TradingMode,
}

/// Request that other panels resynchronize after a mode change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChangeRequest {
    pub trading_mode: TradingMode,
}

/// Publish/subscribe hub shared by all panels in the process.
#[derive(Debug, Clone)]
pub struct EventBus {
    state_tx: broadcast::Sender<StateUpdate>,
    mode_tx: broadcast::Sender<ModeChangeRequest>,
}

impl EventBus {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (mode_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { state_tx, mode_tx }
    }

    /// Fan out a state update to all current subscribers.
    /// No subscribers is fine.
    pub fn publish_state(&self, update: StateUpdate) {
        let _ = self.state_tx.send(update);
    }

    /// Ask sibling panels to resynchronize.
    pub fn publish_mode_change(&self, request: ModeChangeRequest) {
        let _ = self.mode_tx.send(request);
    }

    /// Subscribe to state updates; drop the receiver to unsubscribe.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateUpdate> {
        self.state_tx.subscribe()
    }

    /// Subscribe to mode-change requests; drop the receiver to unsubscribe.
    pub fn subscribe_mode_change(&self) -> broadcast::Receiver<ModeChangeRequest> {
        self.mode_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_updates_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_state();

        for value in [100.0, 200.0, 300.0] {
            bus.publish_state(StateUpdate {
                portfolio_value: value,
                trading_mode: TradingMode::Offline,
            });
        }

        assert_eq!(rx.recv().await.unwrap().portfolio_value, 100.0);
        assert_eq!(rx.recv().await.unwrap().portfolio_value, 200.0);
        assert_eq!(rx.recv().await.unwrap().portfolio_value, 300.0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        bus.publish_mode_change(ModeChangeRequest {
            trading_mode: TradingMode::Live,
        });
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_receiving() {
        let bus = EventBus::new();
        let rx = bus.subscribe_state();
        drop(rx);
        // Send should not panic with zero receivers left.
        bus.publish_state(StateUpdate {
            portfolio_value: 1.0,
            trading_mode: TradingMode::Offline,
        });
        assert_eq!(bus.state_tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let bus = EventBus::new();
        let mut state_rx = bus.subscribe_state();
        let mut mode_rx = bus.subscribe_mode_change();

        bus.publish_mode_change(ModeChangeRequest {
            trading_mode: TradingMode::Live,
        });
        bus.publish_state(StateUpdate {
            portfolio_value: 50.0,
            trading_mode: TradingMode::Live,
        });

        assert_eq!(mode_rx.recv().await.unwrap().trading_mode, TradingMode::Live);
        assert_eq!(state_rx.recv().await.unwrap().portfolio_value, 50.0);
    }
}
