//! Broadcast bus for simulation notifications
//!
//! Bounded per subscriber. A subscriber that falls behind loses the oldest
//! events and sees `RecvError::Lagged`; publishers never block.

use risk_model::PriceMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::events::RebalanceEvent;
use crate::planner::display_hf;
use crate::prices::CrashTick;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BusPayload {
    SimulationStart { prices: PriceMap },
    Tick(CrashTick),
    Rebalance(Box<RebalanceEvent>),
    #[serde(rename_all = "camelCase")]
    Health {
        vault_id: String,
        #[serde(with = "display_hf")]
        health_factor: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEvent {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub payload: BusPayload,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire and forget; with no subscribers the event is dropped
    pub fn publish(&self, timestamp_ms: u64, payload: BusPayload) {
        let _ = self.tx.send(BusEvent { timestamp_ms, payload });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
