//! Crash Simulation Keeper
//!
//! Runs one crash simulation against the seeded vaults, records a rebalance
//! plan for the first breach and optionally applies the latest plans.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crash_keeper::{
    execute_latest_plans, Config, JsonLinesEventStore, RunOptions, SeedState, Simulator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting crash simulation keeper");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using defaults", e);
        Config::default_simulation()
    });

    let events_path = config.expanded_events_path();
    let store = JsonLinesEventStore::open(&events_path)
        .context(format!("Failed to open event log {}", events_path))?;
    log::info!("Recording rebalance events to {}", events_path);

    let seed = SeedState::default_seed().context("Invalid seed state")?;
    let sim = Simulator::new(config, seed, Arc::new(store));

    let opts = run_options_from_env()?;
    let summary = match sim.start_run(opts).await {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Simulation failed: {}", e);
            return Err(e.into());
        }
    };
    log::info!("Run summary: {}", serde_json::to_string(&summary)?);

    if env_flag("APPLY_PLANS") {
        let reports = execute_latest_plans(&sim).await?;
        for report in &reports {
            log::info!("Execution result: {}", serde_json::to_string(report)?);
        }
    }

    for snapshot in sim.vault_snapshots().await? {
        log::debug!("{}", serde_json::to_string(&snapshot)?);
    }

    Ok(())
}

/// EXTRA_TICKS, FORCE_DROP_SYMBOL and TICK_DELAY_MS overrides
fn run_options_from_env() -> Result<RunOptions> {
    let extra_ticks_after_breach = match std::env::var("EXTRA_TICKS") {
        Ok(v) => v.trim().parse().context(format!("Invalid EXTRA_TICKS: {}", v))?,
        Err(_) => 0,
    };
    let tick_delay = match std::env::var("TICK_DELAY_MS") {
        Ok(v) => Some(Duration::from_millis(
            v.trim().parse().context(format!("Invalid TICK_DELAY_MS: {}", v))?,
        )),
        Err(_) => None,
    };
    let force_drop_symbol = std::env::var("FORCE_DROP_SYMBOL")
        .ok()
        .filter(|s| !s.trim().is_empty());

    Ok(RunOptions { extra_ticks_after_breach, tick_delay, force_drop_symbol })
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).map(|v| v.to_ascii_lowercase()),
        Ok(v) if v == "1" || v == "true"
    )
}
