//! Pure risk model for collateralized lending vaults
//! No I/O, no unwrap/panic, all functions total or returning `RiskError`

pub mod error;
pub mod health;
pub mod math;
pub mod solver;
pub mod state;

// Re-export commonly used types
pub use alloy_primitives::U256;
pub use error::*;
pub use health::*;
pub use solver::*;
pub use state::*;
