//! In-memory vault and price state

use risk_model::math::{pow10, WAD};
use risk_model::{Asset, PriceMap, Position, RiskError, TokenRegistry, Vault, U256};

use crate::error::SimError;

/// State a run starts from
#[derive(Debug, Clone)]
pub struct SeedState {
    pub registry: TokenRegistry,
    pub vaults: Vec<Vault>,
    pub prices: PriceMap,
}

fn usd(n: u64) -> U256 {
    U256::from(n) * WAD
}

fn units(n: u64, decimals: u8) -> U256 {
    U256::from(n) * pow10(decimals)
}

/// Default token set: two LSTs, USDC, WETH and their loan tokens
pub fn default_registry() -> TokenRegistry {
    TokenRegistry::new()
        .with(Asset::new(
            "wstETH",
            "Wrapped Liquid Staked Ether",
            "0xc1cba3fcea344f02d92366546156461897602fe4",
            18,
        ))
        .with(Asset::new(
            "weETH",
            "Wrapped eETH",
            "0x04c0599ae5a44309205625474389146123841773",
            18,
        ))
        .with(
            Asset::new("USDC", "USD Coin", "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", 6)
                .with_display_places(2),
        )
        .with(Asset::new(
            "WETH",
            "Wrapped Ether",
            "0x4200000000000000000000000000000000000006",
            18,
        ))
        .with(
            Asset::new(
                "bUSDC",
                "Blend Loan Token: USDC",
                "0x1234567890123456789012345678901234567890",
                6,
            )
            .priced_via("USDC")
            .with_display_places(2),
        )
        .with(
            Asset::new(
                "bETH",
                "Blend Loan Token: ETH",
                "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd",
                18,
            )
            .priced_via("WETH"),
        )
}

impl SeedState {
    /// Two vaults: a stable-debt vault with room and an ETH-debt vault near the edge
    pub fn default_seed() -> Result<Self, RiskError> {
        let vaults = vec![
            Vault::new(
                "VAULT-A-WSTETH-BUSDC",
                Position::new("wstETH", units(10, 18)),
                Position::new("bUSDC", units(15_000, 6)),
            )?,
            Vault::new(
                "VAULT-B-WEETH-BETH",
                Position::new("weETH", units(5, 18)),
                Position::new("bETH", units(5, 18)),
            )?,
        ];

        let prices = PriceMap::new()
            .with("wstETH", usd(3_500))
            .with("weETH", usd(3_600))
            .with("USDC", usd(1))
            .with("WETH", usd(3_550));

        Ok(Self { registry: default_registry(), vaults, prices })
    }

    /// Same registry and prices, different vault set
    pub fn with_vaults(mut self, vaults: Vec<Vault>) -> Self {
        self.vaults = vaults;
        self
    }
}

/// Vaults in seed order plus the current price map
#[derive(Debug, Clone, Default)]
pub struct VaultStore {
    vaults: Vec<Vault>,
    prices: PriceMap,
}

impl VaultStore {
    pub fn from_seed(seed: &SeedState) -> Self {
        let mut store = Self::default();
        store.reset(seed);
        store
    }

    /// Discard all mutations and reload the seed
    pub fn reset(&mut self, seed: &SeedState) {
        self.vaults = seed.vaults.clone();
        self.prices = seed.prices.clone();
    }

    pub fn vaults(&self) -> &[Vault] {
        &self.vaults
    }

    pub fn vault(&self, vault_id: &str) -> Result<&Vault, SimError> {
        self.vaults
            .iter()
            .find(|v| v.vault_id == vault_id)
            .ok_or_else(|| SimError::UnknownVault { vault_id: vault_id.to_string() })
    }

    pub fn prices(&self) -> &PriceMap {
        &self.prices
    }

    pub fn prices_mut(&mut self) -> &mut PriceMap {
        &mut self.prices
    }

    /// Overwrite both amounts of one vault
    pub fn apply(&mut self, vault_id: &str, collateral: U256, debt: U256) -> Result<(), SimError> {
        let vault = self
            .vaults
            .iter_mut()
            .find(|v| v.vault_id == vault_id)
            .ok_or_else(|| SimError::UnknownVault { vault_id: vault_id.to_string() })?;
        vault.collateral.amount = collateral;
        vault.debt.amount = debt;
        Ok(())
    }
}
