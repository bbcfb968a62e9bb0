//! Priority queue for tracking vault health (min-heap by health factor)

use priority_queue::PriorityQueue;
use risk_model::{classify, hf_to_f64, HealthClass, U256};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Vault health snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct VaultHealth {
    pub vault_id: String,
    /// Health factor (WAD), `HF_INFINITE` for zero debt
    pub health_factor: U256,
    /// Tick the snapshot was taken at
    pub tick: u64,
}

impl VaultHealth {
    /// Check if vault needs a rebalance
    pub fn needs_rebalance(&self, trigger: U256) -> bool {
        self.health_factor < trigger
    }

    pub fn class(&self, trigger: U256, target: U256) -> HealthClass {
        classify(self.health_factor, trigger, target)
    }

    pub fn display_hf(&self) -> f64 {
        hf_to_f64(self.health_factor)
    }
}

/// Health-based priority queue (min-heap: lowest HF first)
#[derive(Default)]
pub struct HealthQueue {
    queue: PriorityQueue<String, Reverse<U256>>,
    map: HashMap<String, VaultHealth>,
}

impl HealthQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push or update vault health
    pub fn push(&mut self, health: VaultHealth) {
        let priority = Reverse(health.health_factor);
        self.queue.push(health.vault_id.clone(), priority);
        self.map.insert(health.vault_id.clone(), health);
    }

    /// Pop vault with lowest HF
    pub fn pop(&mut self) -> Option<VaultHealth> {
        let (vault_id, _priority) = self.queue.pop()?;
        self.map.remove(&vault_id)
    }

    /// Peek at vault with lowest HF without removing
    pub fn peek(&self) -> Option<&VaultHealth> {
        let (vault_id, _priority) = self.queue.peek()?;
        self.map.get(vault_id)
    }

    pub fn get(&self, vault_id: &str) -> Option<&VaultHealth> {
        self.map.get(vault_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All vaults below the trigger, worst first
    pub fn below(&self, trigger: U256) -> Vec<VaultHealth> {
        let mut out: Vec<_> = self
            .map
            .values()
            .filter(|vh| vh.needs_rebalance(trigger))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.health_factor.cmp(&b.health_factor));
        out
    }

    /// Every tracked vault, worst first
    pub fn ranked(&self) -> Vec<VaultHealth> {
        let mut out: Vec<_> = self.map.values().cloned().collect();
        out.sort_by(|a, b| a.health_factor.cmp(&b.health_factor));
        out
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.map.clear();
    }
}
