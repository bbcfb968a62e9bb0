//! Apply rebalance plans to the in-memory vault state
//!
//! Stands in for on-chain execution: the projected post-trade amounts become
//! the vault's new amounts.

use risk_model::math::{format_units, parse_units, round_to};
use risk_model::{hf_to_f64, solve, RiskError, TokenRegistry, U256};
use serde::Serialize;

use crate::error::SimError;
use crate::events::latest_per_vault;
use crate::simulation::Simulator;

/// Amount parsed from "<decimal> <symbol>"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAmount {
    pub symbol: String,
    pub base: U256,
}

pub fn parse_projected_amount(text: &str, registry: &TokenRegistry) -> Result<ParsedAmount, RiskError> {
    let invalid = || RiskError::InvalidAmountFormat { input: text.to_string() };

    let mut parts = text.split_whitespace();
    let (amount, symbol) = match (parts.next(), parts.next(), parts.next()) {
        (Some(amount), Some(symbol), None) => (amount, symbol),
        _ => return Err(invalid()),
    };
    let decimals = registry.decimals_of(symbol).map_err(|_| invalid())?;
    let base = parse_units(amount, decimals).map_err(|_| invalid())?;

    Ok(ParsedAmount { symbol: symbol.to_string(), base })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPosition {
    pub asset: String,
    /// Human amount, 6 places
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub vault_id: String,
    pub hf_before: f64,
    pub hf_after: f64,
    pub collateral: AppliedPosition,
    pub debt: AppliedPosition,
}

struct PendingApply {
    vault_id: String,
    collateral: ParsedAmount,
    debt: ParsedAmount,
}

async fn apply_and_report(
    sim: &Simulator,
    vault_id: &str,
    collateral: U256,
    debt: U256,
) -> Result<ExecutionReport, SimError> {
    let hf_before = sim.health_factor_of(vault_id).await?;
    sim.apply_plan(vault_id, collateral, debt).await?;
    let hf_after = sim.health_factor_of(vault_id).await?;

    let vaults = sim.current_vaults().await;
    let vault = vaults
        .iter()
        .find(|v| v.vault_id == vault_id)
        .ok_or_else(|| SimError::UnknownVault { vault_id: vault_id.to_string() })?;
    let registry = sim.registry();
    let human = |amount: U256, symbol: &str| -> Result<AppliedPosition, SimError> {
        Ok(AppliedPosition {
            asset: symbol.to_string(),
            amount: format_units(amount, registry.decimals_of(symbol)?, 6),
        })
    };

    let report = ExecutionReport {
        vault_id: vault_id.to_string(),
        hf_before: round_to(hf_to_f64(hf_before), 3),
        hf_after: round_to(hf_to_f64(hf_after), 3),
        collateral: human(vault.collateral.amount, &vault.collateral.asset)?,
        debt: human(vault.debt.amount, &vault.debt.asset)?,
    };
    log::info!(
        "Executed plan for {}: HF {:.3} -> {:.3}",
        vault_id,
        report.hf_before,
        report.hf_after
    );
    Ok(report)
}

/// Solve against current state and apply the exact projected amounts
pub async fn execute_vault(sim: &Simulator, vault_id: &str) -> Result<ExecutionReport, SimError> {
    let vaults = sim.current_vaults().await;
    let vault = vaults
        .iter()
        .find(|v| v.vault_id == vault_id)
        .ok_or_else(|| SimError::UnknownVault { vault_id: vault_id.to_string() })?;
    let prices = sim.current_prices().await;

    let solution = solve(vault, &prices, sim.registry(), &sim.config().rebalance_params())?;
    apply_and_report(sim, vault_id, solution.new_collateral_base, solution.new_debt_base).await
}

/// Apply the latest persisted plan of every vault
///
/// All projected amounts are parsed and checked before any vault changes.
/// Events for vaults not in the current state are skipped.
pub async fn execute_latest_plans(sim: &Simulator) -> Result<Vec<ExecutionReport>, SimError> {
    let events = sim.events()?;
    if events.is_empty() {
        log::info!("No rebalance events to execute");
        return Ok(Vec::new());
    }
    let vaults = sim.current_vaults().await;
    let registry = sim.registry();

    let mut pending = Vec::new();
    for event in latest_per_vault(&events) {
        let Some(vault) = vaults.iter().find(|v| v.vault_id == event.vault_id) else {
            log::warn!("Skipping event for unknown vault {}", event.vault_id);
            continue;
        };
        let projected = &event.plan.projected;
        let collateral = parse_projected_amount(&projected.new_collateral_amount, registry)?;
        let debt = parse_projected_amount(&projected.new_debt_amount, registry)?;

        for (parsed, expected, text) in [
            (&collateral, &vault.collateral.asset, &projected.new_collateral_amount),
            (&debt, &vault.debt.asset, &projected.new_debt_amount),
        ] {
            if &parsed.symbol != expected {
                return Err(RiskError::InvalidAmountFormat { input: text.clone() }.into());
            }
        }
        pending.push(PendingApply { vault_id: vault.vault_id.clone(), collateral, debt });
    }

    let mut reports = Vec::with_capacity(pending.len());
    for p in pending {
        reports.push(apply_and_report(sim, &p.vault_id, p.collateral.base, p.debt.base).await?);
    }
    Ok(reports)
}
