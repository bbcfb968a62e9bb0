//! Property tests for the health factor and rebalance solver
//!
//! These use proptest to generate random vaults and prices and verify the
//! solver and calculator bounds hold.

use proptest::prelude::*;
use risk_model::math::{mul, to_human, wad_from_f64, WAD};
use risk_model::*;

fn registry() -> TokenRegistry {
    TokenRegistry::new()
        .with(Asset::new("wstETH", "Wrapped stETH", "0x01", 18))
        .with(Asset::new("USDC", "USD Coin", "0x03", 6).with_display_places(2))
        .with(Asset::new("WETH", "Wrapped Ether", "0x04", 18))
        .with(Asset::new("bUSDC", "Loan USDC", "0x05", 6).priced_via("USDC"))
        .with(Asset::new("bETH", "Loan ETH", "0x06", 18).priced_via("WETH"))
}

// Collateral in milli-tokens: 0.001 .. 1_000_000 tokens
fn collateral_strategy() -> impl Strategy<Value = u64> {
    1u64..1_000_000_000
}

// Debt in cents: 0.01 .. 100M USDC
fn debt_cents_strategy() -> impl Strategy<Value = u64> {
    1u64..10_000_000_000
}

// Price in cents: $0.01 .. $100k
fn price_cents_strategy() -> impl Strategy<Value = u64> {
    1u64..10_000_000
}

// Slippage 0 .. 5%
fn slippage_strategy() -> impl Strategy<Value = u32> {
    0u32..500
}

fn cents(n: u64) -> U256 {
    U256::from(n) * WAD / U256::from(100u64)
}

fn vault(collateral_milli: u64, debt_cents: u64) -> Vault {
    Vault::new(
        "V",
        Position::new("wstETH", U256::from(collateral_milli) * U256::from(1_000_000_000_000_000u64)),
        Position::new("bUSDC", U256::from(debt_cents) * U256::from(10_000u64)),
    )
    .unwrap()
}

fn prices(coll_cents: u64) -> PriceMap {
    PriceMap::new()
        .with("wstETH", cents(coll_cents))
        .with("USDC", WAD)
}

proptest! {
    #[test]
    fn fuzz_hf_within_one_wad_unit(
        coll in collateral_strategy(),
        debt in debt_cents_strategy(),
        price in price_cents_strategy(),
    ) {
        let reg = registry();
        let p = prices(price);
        let v = vault(coll, debt);
        let l = wad_from_f64(0.85);

        let hf = health_factor(&v, &p, &reg, l).unwrap();
        let val = valuation(&v, &p, &reg).unwrap();
        let n = mul(val.collateral_usd, l) * WAD;

        // floor(n / debt): hf * debt <= n < (hf + 1) * debt
        prop_assert!(hf * val.debt_usd <= n);
        prop_assert!(n < (hf + U256::from(1u64)) * val.debt_usd);
    }

    #[test]
    fn fuzz_zero_debt_is_infinite(
        coll in collateral_strategy(),
        price in price_cents_strategy(),
    ) {
        let reg = registry();
        let v = vault(coll, 1).with_amounts(U256::from(coll), U256::ZERO);
        let hf = health_factor(&v, &prices(price), &reg, wad_from_f64(0.85)).unwrap();
        prop_assert!(is_infinite(hf));
    }

    #[test]
    fn fuzz_solver_bounds(
        coll in collateral_strategy(),
        debt in debt_cents_strategy(),
        price in price_cents_strategy(),
        slippage in slippage_strategy(),
    ) {
        let reg = registry();
        let p = prices(price);
        let v = vault(coll, debt);
        let params = RebalanceParams::new(wad_from_f64(1.25), wad_from_f64(0.85), slippage);

        let sol = solve(&v, &p, &reg, &params).unwrap();
        let val = valuation(&v, &p, &reg).unwrap();

        prop_assert!(sol.sell_human <= to_human(v.collateral.amount, 18));
        prop_assert!(sol.sell_base <= v.collateral.amount);
        prop_assert!(sol.repay_usd <= val.debt_usd);
        prop_assert!(sol.new_debt_base <= v.debt.amount);
        prop_assert!(sol.new_collateral_base <= v.collateral.amount);
    }

    #[test]
    fn fuzz_projected_hf_reproducible(
        coll in collateral_strategy(),
        debt in debt_cents_strategy(),
        price in price_cents_strategy(),
        slippage in slippage_strategy(),
    ) {
        let reg = registry();
        let p = prices(price);
        let v = vault(coll, debt);
        let l = wad_from_f64(0.85);
        let params = RebalanceParams::new(wad_from_f64(1.25), l, slippage);

        let sol = solve(&v, &p, &reg, &params).unwrap();
        let projected = v.with_amounts(sol.new_collateral_base, sol.new_debt_base);

        prop_assert_eq!(health_factor(&projected, &p, &reg, l).unwrap(), sol.projected_hf);
    }

    #[test]
    fn fuzz_breached_vault_improves(
        debt in debt_cents_strategy(),
        price in price_cents_strategy(),
        hf_bps in 9_100u64..12_300,
    ) {
        let reg = registry();
        let p = prices(price);
        let l = wad_from_f64(0.85);
        let params = RebalanceParams::new(wad_from_f64(1.25), l, 50);

        // Size collateral so the starting HF lands near hf_bps
        let debt_usd = cents(debt);
        let coll_usd = debt_usd * U256::from(hf_bps) / U256::from(8_500u64);
        let coll_base = coll_usd * WAD / cents(price);
        let v = Vault::new(
            "V",
            Position::new("wstETH", coll_base),
            Position::new("bUSDC", U256::from(debt) * U256::from(10_000u64)),
        )
        .unwrap();

        let before = health_factor(&v, &p, &reg, l).unwrap();
        prop_assume!(before < wad_from_f64(1.24) && before > wad_from_f64(0.9));

        let sol = solve(&v, &p, &reg, &params).unwrap();
        prop_assert!(sol.projected_hf >= before);
    }
}
