//! Keeper configuration

use anyhow::{bail, Context, Result};
use risk_model::math::wad_from_f64;
use risk_model::RebalanceParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fraction of collateral value counted toward solvency (L)
    pub liquidation_threshold: f64,

    /// Rebalance when HF drops below this
    pub trigger_health_factor: f64,

    /// HF the solver restores (T)
    pub target_health_factor: f64,

    /// Swap slippage in basis points
    pub slippage_bps: u32,

    /// Inter-tick delay window in milliseconds
    pub tick_delay_min_ms: u64,
    pub tick_delay_max_ms: u64,

    /// Per-tick price drop window in basis points
    pub drop_min_bps: u32,
    pub drop_max_bps: u32,

    /// Assets the crash simulator may drop
    pub volatile_assets: Vec<String>,

    /// Ticks after which a run without breach ends
    pub max_ticks: u64,

    /// Seed for the random source (entropy when absent)
    pub rng_seed: Option<u64>,

    /// Rebalance event log (JSON lines)
    pub events_path: String,

    /// Event bus buffer per subscriber
    pub bus_capacity: usize,

    pub execution: ExecutionConfig,
}

/// Parameters of the atomic execution payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub dex: String,
    pub router_address: String,
    pub executor_address: String,
    pub bundler: String,
    /// Asset swaps are routed through when neither side is it
    pub hub_asset: String,
    /// Pool fee tier (hundredths of a bip)
    pub swap_fee_tier: u32,
    /// Swap deadline from plan creation, seconds
    pub deadline_secs: u64,
    pub gas_estimate: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dex: "Uniswap V3".to_string(),
            router_address: "0xE592427A0AEce92De3Edee1F18E0157C05861564".to_string(),
            executor_address: "0x1111111111111111111111111111111111111111".to_string(),
            bundler: "Morpho Bundler".to_string(),
            hub_asset: "WETH".to_string(),
            swap_fee_tier: 500,
            deadline_secs: 600,
            gas_estimate: "~350,000".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_simulation()
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_simulation() -> Self {
        Self {
            liquidation_threshold: 0.85,
            trigger_health_factor: 1.15,
            target_health_factor: 1.25,
            slippage_bps: 50, // 0.5%
            tick_delay_min_ms: 2_000,
            tick_delay_max_ms: 3_000,
            drop_min_bps: 500,  // 5%
            drop_max_bps: 1_500, // 15%
            volatile_assets: vec!["wstETH".to_string(), "weETH".to_string()],
            max_ticks: 1_000,
            rng_seed: None,
            events_path: "~/.crash-keeper/rebalances.jsonl".to_string(),
            bus_capacity: 256,
            execution: ExecutionConfig::default(),
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_simulation();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        std::fs::write(path, toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |x: f64| x.is_finite() && x > 0.0;
        if !positive(self.liquidation_threshold) {
            bail!("liquidation_threshold must be positive");
        }
        if !positive(self.trigger_health_factor) || !positive(self.target_health_factor) {
            bail!("health factor thresholds must be positive");
        }
        if self.slippage_bps >= 10_000 {
            bail!("slippage_bps must be below 10000");
        }
        if self.tick_delay_min_ms > self.tick_delay_max_ms {
            bail!("tick delay window is inverted");
        }
        if self.drop_min_bps > self.drop_max_bps || self.drop_max_bps >= 10_000 {
            bail!("price drop window must satisfy min <= max < 10000 bps");
        }
        if self.volatile_assets.is_empty() {
            bail!("volatile_assets must not be empty");
        }
        if self.bus_capacity == 0 {
            bail!("bus_capacity must be positive");
        }
        Ok(())
    }

    /// Solver parameters as WAD
    pub fn rebalance_params(&self) -> RebalanceParams {
        RebalanceParams::new(
            wad_from_f64(self.target_health_factor),
            wad_from_f64(self.liquidation_threshold),
            self.slippage_bps,
        )
    }

    /// Events path with `~` expanded
    pub fn expanded_events_path(&self) -> String {
        shellexpand::tilde(&self.events_path).into_owned()
    }
}
