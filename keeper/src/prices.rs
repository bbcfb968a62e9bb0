//! Crash price simulator
//!
//! Each tick drops exactly one volatile asset's price by a fraction drawn
//! uniformly from the configured window.

use std::time::Duration;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use risk_model::math::{bps_to_wad, mul, round_to, wad_to_f64, WAD};
use risk_model::{PriceMap, U256};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::SimError;

/// Source of randomness for symbol choice, drop size and tick delay
pub trait RandomSource: Send {
    /// Uniform draw in `[low, high]`
    fn next_in_range(&mut self, low: u64, high: u64) -> u64;
}

impl<R: RngCore + Send> RandomSource for R {
    fn next_in_range(&mut self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        self.gen_range(low..=high)
    }
}

/// Seeded source when `seed` is set, entropy otherwise
pub fn default_random_source(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
        None => Box::new(ChaCha8Rng::from_entropy()),
    }
}

/// One applied price drop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashTick {
    pub asset: String,
    pub old_price: U256,
    pub new_price: U256,
    /// Drop fraction (WAD)
    pub drop_wad: U256,
    /// Drop in percent, 2 decimals
    pub drop_pct: f64,
}

pub struct PriceSimulator {
    volatile: Vec<String>,
    /// Drop window as WAD fractions
    drop_min: U256,
    drop_max: U256,
    delay_min_ms: u64,
    delay_max_ms: u64,
    rng: Box<dyn RandomSource>,
}

impl PriceSimulator {
    pub fn new(config: &Config, rng: Box<dyn RandomSource>) -> Self {
        Self {
            volatile: config.volatile_assets.clone(),
            drop_min: bps_to_wad(config.drop_min_bps),
            drop_max: bps_to_wad(config.drop_max_bps),
            delay_min_ms: config.tick_delay_min_ms,
            delay_max_ms: config.tick_delay_max_ms,
            rng,
        }
    }

    pub fn volatile_assets(&self) -> &[String] {
        &self.volatile
    }

    /// Drop one asset's price
    ///
    /// `forced` picks the asset deterministically; otherwise a uniform choice
    /// among the volatile set. The chosen asset must have a price entry.
    pub fn apply_tick(
        &mut self,
        prices: &mut PriceMap,
        forced: Option<&str>,
    ) -> Result<CrashTick, SimError> {
        let symbol = match forced {
            Some(symbol) => symbol.to_string(),
            None => {
                let last = self.volatile.len().saturating_sub(1) as u64;
                let idx = self.rng.next_in_range(0, last) as usize;
                self.volatile
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| SimError::InvalidConfig("no volatile assets".to_string()))?
            }
        };

        let old_price = prices
            .get(&symbol)
            .ok_or_else(|| SimError::UnknownAsset { symbol: symbol.clone() })?;

        // Drop window is below 1.0, so both bounds fit in u64
        let lo = self.drop_min.saturating_to::<u64>();
        let hi = self.drop_max.saturating_to::<u64>();
        let drop = U256::from(self.rng.next_in_range(lo, hi));

        let new_price = mul(old_price, WAD - drop);
        prices.set(&symbol, new_price);

        Ok(CrashTick {
            asset: symbol,
            old_price,
            new_price,
            drop_wad: drop,
            drop_pct: round_to(wad_to_f64(drop) * 100.0, 2),
        })
    }

    /// Delay before the next tick
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.next_in_range(self.delay_min_ms, self.delay_max_ms))
    }
}
