//! Crash simulation orchestrator
//!
//! Drives the price simulator tick by tick, watches every vault's health
//! factor and records a rebalance plan when one falls below the trigger.
//! One run at a time per `Simulator`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use risk_model::math::{format_units, round_to, wad_from_f64, wad_to_f64};
use risk_model::{health_factor, hf_to_f64, valuation, PriceMap, TokenRegistry, Vault, U256};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::bus::{BusEvent, BusPayload, EventBus};
use crate::config::Config;
use crate::error::SimError;
use crate::events::{CurrentState, EventStore, PositionView, RebalanceEvent, Trigger};
use crate::planner::{self, RebalancePlan};
use crate::prices::{default_random_source, PriceSimulator, RandomSource};
use crate::priority_queue::{HealthQueue, VaultHealth};
use crate::store::{SeedState, VaultStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Running = 1,
    Breached = 2,
    ExtraTicks = 3,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Running,
            2 => RunPhase::Breached,
            3 => RunPhase::ExtraTicks,
            _ => RunPhase::Idle,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ticks to keep running after the first breach
    pub extra_ticks_after_breach: u64,
    /// Fixed inter-tick delay instead of the random window
    pub tick_delay: Option<Duration>,
    /// Drop this asset on every tick
    pub force_drop_symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// False when another run was already active
    pub started: bool,
    pub ticks_executed: u64,
    pub breaching_vault_id: Option<String>,
    pub breach_hf: Option<f64>,
    pub extra_ticks_executed: u64,
    /// Ended by `request_stop`
    pub stopped: bool,
}

/// Vault with its current valuation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSnapshot {
    pub vault: Vault,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    pub health_factor_wad: U256,
    #[serde(with = "planner::display_hf")]
    pub health_factor: f64,
    pub status: &'static str,
}

/// Returns the phase to `Idle` on every exit path of a run
struct RunGuard<'a> {
    phase: &'a AtomicU8,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(RunPhase::Idle as u8, Ordering::Release);
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub struct Simulator {
    config: Config,
    seed: SeedState,
    store: RwLock<VaultStore>,
    prices: Mutex<PriceSimulator>,
    health: RwLock<HealthQueue>,
    events: Arc<dyn EventStore>,
    bus: EventBus,
    phase: AtomicU8,
    stop: AtomicBool,
}

impl Simulator {
    pub fn new(config: Config, seed: SeedState, events: Arc<dyn EventStore>) -> Self {
        let rng = default_random_source(config.rng_seed);
        Self::with_random_source(config, seed, events, rng)
    }

    pub fn with_random_source(
        config: Config,
        seed: SeedState,
        events: Arc<dyn EventStore>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            prices: Mutex::new(PriceSimulator::new(&config, rng)),
            store: RwLock::new(VaultStore::from_seed(&seed)),
            health: RwLock::new(HealthQueue::new()),
            bus: EventBus::new(config.bus_capacity),
            phase: AtomicU8::new(RunPhase::Idle as u8),
            stop: AtomicBool::new(false),
            config,
            seed,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.seed.registry
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.phase() != RunPhase::Idle
    }

    /// Ask the active run to end at its next loop boundary
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe()
    }

    /// Persisted rebalance log
    pub fn events(&self) -> Result<Vec<RebalanceEvent>, SimError> {
        Ok(self.events.list_all()?)
    }

    pub async fn current_vaults(&self) -> Vec<Vault> {
        self.store.read().await.vaults().to_vec()
    }

    pub async fn current_prices(&self) -> PriceMap {
        self.store.read().await.prices().clone()
    }

    pub async fn health_factor_of(&self, vault_id: &str) -> Result<U256, SimError> {
        let store = self.store.read().await;
        let vault = store.vault(vault_id)?;
        Ok(health_factor(vault, store.prices(), &self.seed.registry, self.liquidation_threshold())?)
    }

    /// Plan against current state without recording it
    pub async fn build_plan(&self, vault_id: &str) -> Result<RebalancePlan, SimError> {
        let (vault, prices) = {
            let store = self.store.read().await;
            (store.vault(vault_id)?.clone(), store.prices().clone())
        };
        planner::build_plan(&vault, &prices, &self.seed.registry, &self.config, unix_ms() / 1_000)
    }

    /// Overwrite one vault's amounts; serialized with ticks by the store lock
    pub async fn apply_plan(
        &self,
        vault_id: &str,
        new_collateral_base: U256,
        new_debt_base: U256,
    ) -> Result<(), SimError> {
        self.store.write().await.apply(vault_id, new_collateral_base, new_debt_base)?;
        log::info!("Applied rebalance to {}", vault_id);
        Ok(())
    }

    pub async fn vault_snapshots(&self) -> Result<Vec<VaultSnapshot>, SimError> {
        let store = self.store.read().await;
        store
            .vaults()
            .iter()
            .map(|vault| self.snapshot(vault, store.prices()))
            .collect()
    }

    /// Vaults from the last health check, worst first
    pub async fn health_ranking(&self) -> Vec<VaultHealth> {
        self.health.read().await.ranked()
    }

    fn liquidation_threshold(&self) -> U256 {
        wad_from_f64(self.config.liquidation_threshold)
    }

    fn trigger(&self) -> U256 {
        wad_from_f64(self.config.trigger_health_factor)
    }

    fn snapshot(&self, vault: &Vault, prices: &PriceMap) -> Result<VaultSnapshot, SimError> {
        let registry = &self.seed.registry;
        let val = valuation(vault, prices, registry)?;
        let hf = health_factor(vault, prices, registry, self.liquidation_threshold())?;
        let class = risk_model::classify(hf, self.trigger(), wad_from_f64(self.config.target_health_factor));
        Ok(VaultSnapshot {
            vault: vault.clone(),
            collateral_usd: round_to(wad_to_f64(val.collateral_usd), 2),
            debt_usd: round_to(wad_to_f64(val.debt_usd), 2),
            health_factor_wad: hf,
            health_factor: round_to(hf_to_f64(hf), 3),
            status: class.label(),
        })
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Run one crash simulation
    ///
    /// Returns immediately with `started: false` if a run is already active.
    /// Errors from planning or persistence end the run and propagate.
    pub async fn start_run(&self, opts: RunOptions) -> Result<RunSummary, SimError> {
        if self
            .phase
            .compare_exchange(
                RunPhase::Idle as u8,
                RunPhase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            log::warn!("Simulation already running, ignoring start request");
            return Ok(RunSummary::default());
        }
        let _guard = RunGuard { phase: &self.phase };
        self.stop.store(false, Ordering::Release);

        let start_prices = {
            let mut store = self.store.write().await;
            store.reset(&self.seed);
            store.prices().clone()
        };
        self.health.write().await.clear();

        log::info!(
            "Simulation start: {} vaults, {} prices, extra ticks after breach {}",
            self.seed.vaults.len(),
            start_prices.len(),
            opts.extra_ticks_after_breach
        );
        self.bus.publish(unix_ms(), BusPayload::SimulationStart { prices: start_prices });

        let mut summary = RunSummary { started: true, ..Default::default() };

        loop {
            let breached = self.check_vaults(summary.ticks_executed).await?;

            if summary.breaching_vault_id.is_none() {
                if let Some((vault, hf)) = breached.first() {
                    log::info!(
                        "Breach detected: {} HF={:.3} < {}",
                        vault.vault_id,
                        hf_to_f64(*hf),
                        self.config.trigger_health_factor
                    );
                    self.handle_breach(vault, *hf).await?;
                    summary.breaching_vault_id = Some(vault.vault_id.clone());
                    summary.breach_hf = Some(round_to(hf_to_f64(*hf), 3));
                    self.set_phase(RunPhase::Breached);

                    if opts.extra_ticks_after_breach == 0 {
                        break;
                    }
                    log::info!("Continuing for {} tick(s) after breach", opts.extra_ticks_after_breach);
                    self.set_phase(RunPhase::ExtraTicks);
                }
            } else {
                for (vault, hf) in &breached {
                    self.handle_breach(vault, *hf).await?;
                }
                if summary.extra_ticks_executed >= opts.extra_ticks_after_breach {
                    break;
                }
            }

            if summary.breaching_vault_id.is_none() && summary.ticks_executed >= self.config.max_ticks {
                log::warn!("No breach after {} ticks, ending run", summary.ticks_executed);
                break;
            }
            if self.stop_requested() {
                summary.stopped = true;
                break;
            }

            let delay = match opts.tick_delay {
                Some(delay) => delay,
                None => self.prices.lock().await.next_delay(),
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.stop_requested() {
                summary.stopped = true;
                break;
            }

            let tick = {
                let mut sim = self.prices.lock().await;
                let mut store = self.store.write().await;
                sim.apply_tick(store.prices_mut(), opts.force_drop_symbol.as_deref())?
            };
            summary.ticks_executed += 1;
            if summary.breaching_vault_id.is_some() {
                summary.extra_ticks_executed += 1;
            }

            log::info!(
                "[Tick {}] Price drop {}: -{}% {} -> {}",
                summary.ticks_executed,
                tick.asset,
                tick.drop_pct,
                format_units(tick.old_price, 18, 2),
                format_units(tick.new_price, 18, 2),
            );
            self.bus.publish(unix_ms(), BusPayload::Tick(tick));
        }

        if summary.stopped {
            log::warn!("Simulation stopped after {} ticks", summary.ticks_executed);
        }
        log::info!(
            "Simulation finished: ticks={} breach={:?} extra={}",
            summary.ticks_executed,
            summary.breaching_vault_id,
            summary.extra_ticks_executed
        );
        Ok(summary)
    }

    /// Evaluate every vault in seed order; returns those below the trigger
    async fn check_vaults(&self, tick: u64) -> Result<Vec<(Vault, U256)>, SimError> {
        let (vaults, prices) = {
            let store = self.store.read().await;
            (store.vaults().to_vec(), store.prices().clone())
        };
        let trigger = self.trigger();
        let target = wad_from_f64(self.config.target_health_factor);
        let l = self.liquidation_threshold();

        let mut breached = Vec::new();
        let mut queue = self.health.write().await;
        for vault in vaults {
            let hf = health_factor(&vault, &prices, &self.seed.registry, l)?;
            let entry = VaultHealth { vault_id: vault.vault_id.clone(), health_factor: hf, tick };
            log::debug!(
                "Vault {} | HF={:.3} {}",
                vault.vault_id,
                entry.display_hf(),
                entry.class(trigger, target).label()
            );
            self.bus.publish(
                unix_ms(),
                BusPayload::Health {
                    vault_id: vault.vault_id.clone(),
                    health_factor: round_to(entry.display_hf(), 3),
                },
            );
            if entry.needs_rebalance(trigger) {
                breached.push((vault, hf));
            }
            queue.push(entry);
        }
        if let Some(worst) = queue.peek() {
            log::debug!("Worst vault {} HF={:.3}", worst.vault_id, worst.display_hf());
        }
        Ok(breached)
    }

    /// Plan, persist and publish; vault state is left untouched
    async fn handle_breach(&self, vault: &Vault, hf: U256) -> Result<RebalanceEvent, SimError> {
        let prices = self.current_prices().await;
        let registry = &self.seed.registry;
        let now = unix_ms();

        let plan = planner::build_plan(vault, &prices, registry, &self.config, now / 1_000)?;
        for action in &plan.actions {
            log::info!("{:?}", action);
        }
        log::info!(
            "Projected: collateral={} debt={} HF~{}",
            plan.projected.new_collateral_amount,
            plan.projected.new_debt_amount,
            plan.projected.estimated_hf
        );

        let val = valuation(vault, &prices, registry)?;
        let hf_before = round_to(hf_to_f64(hf), 3);
        let event = RebalanceEvent {
            timestamp_ms: now,
            vault_id: vault.vault_id.clone(),
            hf_before,
            hf_after: plan.projected.estimated_hf,
            trigger: Trigger {
                health_factor: hf_before,
                reason: format!(
                    "Below rebalance threshold of {}",
                    self.config.trigger_health_factor
                ),
            },
            current_state: CurrentState {
                collateral: PositionView {
                    asset: vault.collateral.asset.clone(),
                    amount: format_units(
                        vault.collateral.amount,
                        registry.decimals_of(&vault.collateral.asset)?,
                        6,
                    ),
                    value_usd: round_to(wad_to_f64(val.collateral_usd), 2),
                },
                debt: PositionView {
                    asset: vault.debt.asset.clone(),
                    amount: format_units(vault.debt.amount, registry.decimals_of(&vault.debt.asset)?, 6),
                    value_usd: round_to(wad_to_f64(val.debt_usd), 2),
                },
            },
            plan,
        };

        self.events.append(&event)?;
        log::info!("Persisted rebalance event for {}", vault.vault_id);
        self.bus.publish(now, BusPayload::Rebalance(Box::new(event.clone())));
        Ok(event)
    }
}
