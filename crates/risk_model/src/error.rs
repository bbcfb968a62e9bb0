//! Error types for risk computations

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// An asset (or its resolved underlying) has no entry in the price map
    #[error("missing price for asset {symbol}")]
    MissingPrice { symbol: String },

    /// A resolved price is zero, so no trade against it can be sized
    #[error("zero price for asset {symbol}")]
    ZeroPrice { symbol: String },

    /// Symbol is not present in the token registry
    #[error("unknown asset {symbol}")]
    UnknownAsset { symbol: String },

    /// Solver denominator is zero: T == L / (1 - s)
    #[error(
        "target health factor {target_hf} unreachable with liquidation threshold \
         {liquidation_threshold} and slippage {slippage} (WAD)"
    )]
    UnsolvableTarget {
        target_hf: String,
        liquidation_threshold: String,
        slippage: String,
    },

    /// Malformed "<amount> <symbol>" text
    #[error("invalid amount format: {input:?}")]
    InvalidAmountFormat { input: String },

    /// Vault collateral and debt must be different assets
    #[error("collateral and debt share the same asset {symbol}")]
    SameAsset { symbol: String },
}
