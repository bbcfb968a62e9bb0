//! Rebalance plan construction
//!
//! Wraps the closed-form solver output into ordered actions, a projected
//! outcome and the atomic execution bundle.

use risk_model::math::{format_units, mul_div, round_to, BPS_DENOMINATOR};
use risk_model::{hf_to_f64, solve, PriceMap, RebalanceSolution, TokenRegistry, Vault, U256};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::SimError;
use crate::tx_builder::{build_atomic_execution, AtomicExecution, SwapAmounts};

/// Fractional digits of swap and repay amounts
const SWAP_PLACES: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlanAction {
    #[serde(rename_all = "camelCase")]
    WithdrawCollateral { step: u8, amount: String, reason: String },

    #[serde(rename_all = "camelCase")]
    Swap {
        step: u8,
        from_token: String,
        from_amount: String,
        to_token: String,
        expected_amount: String,
        min_amount: String,
        slippage: String,
        dex: String,
        route: String,
    },

    #[serde(rename_all = "camelCase")]
    RepayDebt { step: u8, asset: String, amount: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedOutcome {
    /// "<amount> <symbol>"
    pub new_collateral_amount: String,
    pub new_debt_amount: String,
    pub new_collateral_base: U256,
    pub new_debt_base: U256,
    /// Solver HF recomputed on the projected amounts, never the target
    pub estimated_hf_wad: U256,
    #[serde(with = "display_hf")]
    pub estimated_hf: f64,
    pub gas_estimate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlan {
    pub target_hf: f64,
    pub actions: Vec<PlanAction>,
    pub projected: ProjectedOutcome,
    pub atomic_execution: AtomicExecution,
}

/// Display HF as JSON: infinite (zero debt) round-trips through `null`
pub mod display_hf {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hf: &f64, s: S) -> Result<S::Ok, S::Error> {
        if hf.is_finite() {
            s.serialize_some(hf)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

/// Display an amount with the asset's precision
pub fn display_amount(base: U256, symbol: &str, registry: &TokenRegistry) -> Result<String, SimError> {
    let asset = registry.get(symbol)?;
    Ok(format!("{} {}", format_units(base, asset.decimals, asset.display_places), symbol))
}

/// Swap path, through the hub asset unless one side already is the hub
pub fn route(from: &str, to: &str, hub: &str) -> String {
    if from == hub || to == hub {
        format!("{from} -> {to}")
    } else {
        format!("{from} -> {hub} -> {to}")
    }
}

/// "0.50%" for 50 bps
pub fn slippage_text(slippage_bps: u32) -> String {
    format!("{:.2}%", slippage_bps as f64 / 100.0)
}

/// Solve and shape a plan for one vault
///
/// `now_secs` anchors the swap deadline of the execution bundle.
pub fn build_plan(
    vault: &Vault,
    prices: &PriceMap,
    registry: &TokenRegistry,
    config: &Config,
    now_secs: u64,
) -> Result<RebalancePlan, SimError> {
    let params = config.rebalance_params();
    let solution = solve(vault, prices, registry, &params)?;
    plan_from_solution(vault, registry, config, &solution, now_secs)
}

pub fn plan_from_solution(
    vault: &Vault,
    registry: &TokenRegistry,
    config: &Config,
    solution: &RebalanceSolution,
    now_secs: u64,
) -> Result<RebalancePlan, SimError> {
    let coll_symbol = vault.collateral.asset.as_str();
    let underlying = registry.underlying_price_symbol(&vault.debt.asset);
    let coll_decimals = registry.decimals_of(coll_symbol)?;
    let underlying_decimals = registry.decimals_of(underlying)?;

    let keep = U256::from(BPS_DENOMINATOR.saturating_sub(u64::from(config.slippage_bps)));
    let min_out_base = mul_div(solution.repay_base, keep, U256::from(BPS_DENOMINATOR));

    let expected = format_units(solution.repay_base, underlying_decimals, SWAP_PLACES);

    let actions = vec![
        PlanAction::WithdrawCollateral {
            step: 1,
            amount: display_amount(solution.sell_base, coll_symbol, registry)?,
            reason: "Withdraw collateral to swap for debt repayment".to_string(),
        },
        PlanAction::Swap {
            step: 2,
            from_token: coll_symbol.to_string(),
            from_amount: format_units(solution.sell_base, coll_decimals, SWAP_PLACES),
            to_token: underlying.to_string(),
            expected_amount: expected.clone(),
            min_amount: format_units(min_out_base, underlying_decimals, SWAP_PLACES),
            slippage: slippage_text(config.slippage_bps),
            dex: config.execution.dex.clone(),
            route: route(coll_symbol, underlying, &config.execution.hub_asset),
        },
        PlanAction::RepayDebt {
            step: 3,
            asset: vault.debt.asset.clone(),
            amount: expected,
            reason: "Reduce debt to increase health factor".to_string(),
        },
    ];

    let projected = ProjectedOutcome {
        new_collateral_amount: display_amount(solution.new_collateral_base, coll_symbol, registry)?,
        new_debt_amount: display_amount(solution.new_debt_base, &vault.debt.asset, registry)?,
        new_collateral_base: solution.new_collateral_base,
        new_debt_base: solution.new_debt_base,
        estimated_hf_wad: solution.projected_hf,
        estimated_hf: round_to(hf_to_f64(solution.projected_hf), 3),
        gas_estimate: config.execution.gas_estimate.clone(),
    };

    let atomic_execution = build_atomic_execution(
        vault,
        registry,
        &config.execution,
        SwapAmounts { sell_base: solution.sell_base, repay_base: solution.repay_base },
        now_secs,
    )?;

    log::debug!(
        "{}: sell {} {}, repay {} {}, projected HF {:.3}",
        vault.vault_id,
        format_units(solution.sell_base, coll_decimals, 4),
        coll_symbol,
        format_units(solution.repay_base, underlying_decimals, 4),
        underlying,
        projected.estimated_hf,
    );

    Ok(RebalancePlan {
        target_hf: config.target_health_factor,
        actions,
        projected,
        atomic_execution,
    })
}
