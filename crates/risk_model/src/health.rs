//! Health factor calculation for vaults
//!
//! HF = (collateral_usd * L) / debt_usd, all WAD scaled.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::RiskError;
use crate::math::{div, mul, to_human, wad_to_f64};
use crate::state::{PriceMap, TokenRegistry, Vault};

/// HF returned when the vault has no debt value: no liquidation risk.
///
/// Any value at or above this sentinel must be treated as infinite.
pub const HF_INFINITE: U256 = U256::from_limbs([0, 0, 0, 1 << 63]);

pub fn is_infinite(hf: U256) -> bool {
    hf >= HF_INFINITE
}

/// USD valuation of both sides of a vault (WAD)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub collateral_usd: U256,
    pub debt_usd: U256,
}

pub fn valuation(
    vault: &Vault,
    prices: &PriceMap,
    registry: &TokenRegistry,
) -> Result<Valuation, RiskError> {
    let pc = prices.price_of(&vault.collateral.asset, registry)?;
    let pd = prices.price_of(&vault.debt.asset, registry)?;

    let cw = to_human(vault.collateral.amount, registry.decimals_of(&vault.collateral.asset)?);
    let dw = to_human(vault.debt.amount, registry.decimals_of(&vault.debt.asset)?);

    Ok(Valuation {
        collateral_usd: mul(cw, pc),
        debt_usd: mul(dw, pd),
    })
}

/// HF from an existing valuation
pub fn health_factor_from_valuation(v: &Valuation, liquidation_threshold: U256) -> U256 {
    if v.debt_usd.is_zero() {
        return HF_INFINITE;
    }
    div(mul(v.collateral_usd, liquidation_threshold), v.debt_usd)
}

/// Calculate health factor (WAD)
///
/// Fails with `MissingPrice` if either side's resolved price is absent.
/// Returns `HF_INFINITE` when the debt is worth nothing.
pub fn health_factor(
    vault: &Vault,
    prices: &PriceMap,
    registry: &TokenRegistry,
    liquidation_threshold: U256,
) -> Result<U256, RiskError> {
    let v = valuation(vault, prices, registry)?;
    Ok(health_factor_from_valuation(&v, liquidation_threshold))
}

/// HF as a display float (infinite sentinel maps to `f64::INFINITY`)
pub fn hf_to_f64(hf: U256) -> f64 {
    if is_infinite(hf) {
        f64::INFINITY
    } else {
        wad_to_f64(hf)
    }
}

/// Risk bucket of a health factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    /// HF < 1
    Liquidatable,
    /// 1 <= HF < trigger
    Breach,
    /// trigger <= HF < target
    Monitor,
    Healthy,
}

impl HealthClass {
    pub fn label(&self) -> &'static str {
        match self {
            HealthClass::Liquidatable => "(liquidatable)",
            HealthClass::Breach => "(breach)",
            HealthClass::Monitor => "(monitor)",
            HealthClass::Healthy => "(healthy)",
        }
    }
}

pub fn classify(hf: U256, trigger: U256, target: U256) -> HealthClass {
    if hf < crate::math::WAD {
        HealthClass::Liquidatable
    } else if hf < trigger {
        HealthClass::Breach
    } else if hf < target {
        HealthClass::Monitor
    } else {
        HealthClass::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{wad_from_f64, WAD};
    use crate::state::{Asset, Position};

    fn registry() -> TokenRegistry {
        TokenRegistry::new()
            .with(Asset::new("wstETH", "Wrapped stETH", "0x01", 18))
            .with(Asset::new("weETH", "Wrapped eETH", "0x02", 18))
            .with(Asset::new("USDC", "USD Coin", "0x03", 6).with_display_places(2))
            .with(Asset::new("WETH", "Wrapped Ether", "0x04", 18))
            .with(Asset::new("bUSDC", "Loan USDC", "0x05", 6).priced_via("USDC"))
            .with(Asset::new("bETH", "Loan ETH", "0x06", 18).priced_via("WETH"))
    }

    fn usd(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn prices() -> PriceMap {
        PriceMap::new()
            .with("wstETH", usd(3500))
            .with("weETH", usd(3600))
            .with("USDC", usd(1))
            .with("WETH", usd(3550))
    }

    fn vault_a() -> Vault {
        Vault::new(
            "VAULT-A",
            Position::new("wstETH", usd(10)),
            Position::new("bUSDC", U256::from(15_000_000_000u64)),
        )
        .unwrap()
    }

    fn vault_b() -> Vault {
        Vault::new(
            "VAULT-B",
            Position::new("weETH", usd(5)),
            Position::new("bETH", usd(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_hf_baseline_vault_a() {
        let hf = health_factor(&vault_a(), &prices(), &registry(), wad_from_f64(0.85)).unwrap();
        // 35000 * 0.85 / 15000 = 1.98333...
        assert_eq!(crate::math::round_to(hf_to_f64(hf), 3), 1.983);
    }

    #[test]
    fn test_hf_baseline_vault_b_already_breached() {
        let hf = health_factor(&vault_b(), &prices(), &registry(), wad_from_f64(0.85)).unwrap();
        // 18000 * 0.85 / 17750 = 0.8619...
        assert_eq!(crate::math::round_to(hf_to_f64(hf), 3), 0.862);
    }

    #[test]
    fn test_hf_after_crash_below_trigger() {
        let crashed = prices().with("wstETH", usd(1700));
        let hf = health_factor(&vault_a(), &crashed, &registry(), wad_from_f64(0.85)).unwrap();
        assert!(hf < wad_from_f64(1.15));
    }

    #[test]
    fn test_zero_debt_is_infinite() {
        let vault = vault_a().with_amounts(usd(10), U256::ZERO);
        let hf = health_factor(&vault, &prices(), &registry(), wad_from_f64(0.85)).unwrap();
        assert_eq!(hf, HF_INFINITE);
        assert!(is_infinite(hf));
        assert_eq!(hf_to_f64(hf), f64::INFINITY);
    }

    #[test]
    fn test_missing_underlying_price() {
        let mut p = prices();
        p = PriceMap::new()
            .with("wstETH", p.get("wstETH").unwrap())
            .with("bUSDC", usd(1)); // own entry, underlying missing
        let err = health_factor(&vault_a(), &p, &registry(), wad_from_f64(0.85)).unwrap_err();
        assert_eq!(err, RiskError::MissingPrice { symbol: "USDC".into() });
    }

    #[test]
    fn test_unknown_asset_fails() {
        let vault = Vault::new(
            "V",
            Position::new("DOGE", usd(1)),
            Position::new("USDC", usd(1)),
        )
        .unwrap();
        let p = prices().with("DOGE", usd(1));
        let err = health_factor(&vault, &p, &registry(), WAD).unwrap_err();
        assert_eq!(err, RiskError::UnknownAsset { symbol: "DOGE".into() });
    }

    #[test]
    fn test_classify() {
        let trigger = wad_from_f64(1.15);
        let target = wad_from_f64(1.25);
        assert_eq!(classify(wad_from_f64(0.9), trigger, target), HealthClass::Liquidatable);
        assert_eq!(classify(wad_from_f64(1.1), trigger, target), HealthClass::Breach);
        assert_eq!(classify(wad_from_f64(1.2), trigger, target), HealthClass::Monitor);
        assert_eq!(classify(HF_INFINITE, trigger, target), HealthClass::Healthy);
    }
}
