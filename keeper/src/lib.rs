//! Crash simulation keeper
//!
//! Drops collateral prices tick by tick, watches vault health factors and
//! produces rebalance plans for vaults that fall below the trigger.

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod execute;
pub mod planner;
pub mod prices;
pub mod priority_queue;
pub mod simulation;
pub mod store;
pub mod tx_builder;

pub use bus::{BusEvent, BusPayload, EventBus};
pub use config::{Config, ExecutionConfig};
pub use error::SimError;
pub use events::{EventStore, JsonLinesEventStore, MemoryEventStore, RebalanceEvent, StoreError};
pub use execute::{execute_latest_plans, execute_vault, parse_projected_amount, ExecutionReport};
pub use planner::{build_plan, PlanAction, RebalancePlan};
pub use prices::{CrashTick, PriceSimulator, RandomSource};
pub use simulation::{RunOptions, RunPhase, RunSummary, Simulator, VaultSnapshot};
pub use store::{SeedState, VaultStore};
