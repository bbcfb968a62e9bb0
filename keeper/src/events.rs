//! Rebalance event records and their persistence backends

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::{display_hf, RebalancePlan};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("event encoding: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("event store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(with = "display_hf")]
    pub health_factor: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub asset: String,
    /// Human amount, 6 places
    pub amount: String,
    #[serde(rename = "valueUSD")]
    pub value_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub collateral: PositionView,
    pub debt: PositionView,
}

/// Immutable record of one breach and the plan produced for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceEvent {
    /// Unix milliseconds
    pub timestamp_ms: u64,
    pub vault_id: String,
    #[serde(with = "display_hf")]
    pub hf_before: f64,
    #[serde(with = "display_hf")]
    pub hf_after: f64,
    pub trigger: Trigger,
    pub current_state: CurrentState,
    pub plan: RebalancePlan,
}

/// Append-only rebalance log
pub trait EventStore: Send + Sync {
    fn append(&self, event: &RebalanceEvent) -> Result<(), StoreError>;

    /// Every event in append order
    fn list_all(&self) -> Result<Vec<RebalanceEvent>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<RebalanceEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &RebalanceEvent) -> Result<(), StoreError> {
        self.events
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(event.clone());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<RebalanceEvent>, StoreError> {
        Ok(self.events.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }
}

/// One JSON object per line
#[derive(Debug)]
pub struct JsonLinesEventStore {
    path: PathBuf,
    /// Serializes appends within this process
    write_lock: Mutex<()>,
}

impl JsonLinesEventStore {
    /// `path` may start with `~`
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let path = PathBuf::from(shellexpand::tilde(path).into_owned());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl EventStore for JsonLinesEventStore {
    fn append(&self, event: &RebalanceEvent) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<RebalanceEvent>, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

/// Latest event per vault, in order of each vault's first appearance
pub fn latest_per_vault(events: &[RebalanceEvent]) -> Vec<&RebalanceEvent> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: std::collections::HashMap<&str, &RebalanceEvent> = Default::default();
    for event in events {
        if !latest.contains_key(event.vault_id.as_str()) {
            order.push(&event.vault_id);
        }
        latest.insert(&event.vault_id, event);
    }
    order.into_iter().filter_map(|id| latest.get(id).copied()).collect()
}
