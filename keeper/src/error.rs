//! Keeper error types

use risk_model::RiskError;
use thiserror::Error;

use crate::events::StoreError;
use crate::tx_builder::PayloadError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Rebalance event was not durably recorded
    #[error("failed to persist rebalance event: {0}")]
    Persistence(#[from] StoreError),

    #[error("failed to build execution payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("unknown vault {vault_id}")]
    UnknownVault { vault_id: String },

    /// Forced drop symbol has no price entry
    #[error("unknown asset {symbol}")]
    UnknownAsset { symbol: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
