//! Vault, asset and price state

use std::collections::BTreeMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::RiskError;

/// Token metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    /// Opaque contract address, only used to build execution payloads
    pub address: String,
    pub decimals: u8,
    /// Symbol whose price entry this asset is valued with (loan/wrapped tokens)
    pub underlying: Option<String>,
    /// Fractional digits when displaying amounts
    pub display_places: usize,
}

impl Asset {
    pub fn new(symbol: &str, name: &str, address: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            decimals,
            underlying: None,
            display_places: 4,
        }
    }

    /// Price this asset through another symbol's price entry
    pub fn priced_via(mut self, underlying: &str) -> Self {
        self.underlying = Some(underlying.to_string());
        self
    }

    pub fn with_display_places(mut self, places: usize) -> Self {
        self.display_places = places;
        self
    }
}

/// Token/price resolver
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    assets: BTreeMap<String, Asset>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an asset
    pub fn insert(&mut self, asset: Asset) {
        self.assets.insert(asset.symbol.clone(), asset);
    }

    pub fn with(mut self, asset: Asset) -> Self {
        self.insert(asset);
        self
    }

    pub fn get(&self, symbol: &str) -> Result<&Asset, RiskError> {
        self.assets.get(symbol).ok_or_else(|| RiskError::UnknownAsset {
            symbol: symbol.to_string(),
        })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.assets.contains_key(symbol)
    }

    pub fn decimals_of(&self, symbol: &str) -> Result<u8, RiskError> {
        self.get(symbol).map(|a| a.decimals)
    }

    /// Symbol whose price values `symbol` (identity for non-derivative assets)
    pub fn underlying_price_symbol<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.assets
            .get(symbol)
            .and_then(|a| a.underlying.as_deref())
            .unwrap_or(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }
}

/// One side of a vault, amount in base units
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub asset: String,
    pub amount: U256,
}

impl Position {
    pub fn new(asset: &str, amount: U256) -> Self {
        Self {
            asset: asset.to_string(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub vault_id: String,
    pub collateral: Position,
    pub debt: Position,
}

impl Vault {
    /// Build a vault; collateral and debt must be different assets
    pub fn new(vault_id: &str, collateral: Position, debt: Position) -> Result<Self, RiskError> {
        if collateral.asset == debt.asset {
            return Err(RiskError::SameAsset {
                symbol: collateral.asset,
            });
        }
        Ok(Self {
            vault_id: vault_id.to_string(),
            collateral,
            debt,
        })
    }

    /// Same vault with new base amounts
    pub fn with_amounts(&self, collateral: U256, debt: U256) -> Self {
        Self {
            vault_id: self.vault_id.clone(),
            collateral: Position::new(&self.collateral.asset, collateral),
            debt: Position::new(&self.debt.asset, debt),
        }
    }
}

/// USD prices (WAD) keyed by underlying symbol
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceMap(BTreeMap<String, U256>);

impl PriceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, price: U256) -> Self {
        self.set(symbol, price);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<U256> {
        self.0.get(symbol).copied()
    }

    pub fn set(&mut self, symbol: &str, price: U256) {
        self.0.insert(symbol.to_string(), price);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.contains_key(symbol)
    }

    /// Price of `symbol`, resolved through its underlying first
    pub fn price_of(&self, symbol: &str, registry: &TokenRegistry) -> Result<U256, RiskError> {
        let resolved = registry.underlying_price_symbol(symbol);
        self.get(resolved).ok_or_else(|| RiskError::MissingPrice {
            symbol: resolved.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &U256)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
