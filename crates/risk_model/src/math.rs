//! WAD fixed-point helpers - no unwrap, no panics
//!
//! Every USD value, price and human-readable amount is a `U256` scaled by
//! 10^18 (WAD). On-chain balances are scaled by the asset's own decimals
//! (base units). All operands are non-negative.
//!
//! Precision: `mul` and `div` truncate toward zero, so each call loses less
//! than one unit of the smaller scale involved (1e-18 for WAD results, one
//! base unit for `to_base`). Converting base -> human -> base is exact only
//! down to the asset's own resolution; anything finer is dropped.
//!
//! Products saturate at `U256::MAX` instead of wrapping. With prices below
//! 1e12 USD and amounts below 1e30 units the widest intermediate stays under
//! 2^200, so saturation is never reached in practice.

use alloy_primitives::U256;

use crate::error::RiskError;

/// 10^18
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis points per unit
pub const BPS_DENOMINATOR: u64 = 10_000;

/// 10^n as U256
pub fn pow10(n: u8) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}

/// a * b / denominator, truncating; zero denominator yields zero
pub fn mul_div(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    a.saturating_mul(b) / denominator
}

/// WAD multiply: a * b / WAD
pub fn mul(a: U256, b: U256) -> U256 {
    mul_div(a, b, WAD)
}

/// WAD divide: a * WAD / b (zero when b is zero)
pub fn div(a: U256, b: U256) -> U256 {
    mul_div(a, WAD, b)
}

/// Base units -> human WAD: base * WAD / 10^decimals
pub fn to_human(base: U256, decimals: u8) -> U256 {
    mul_div(base, WAD, pow10(decimals))
}

/// Human WAD -> base units: human * 10^decimals / WAD
pub fn to_base(human: U256, decimals: u8) -> U256 {
    mul_div(human, pow10(decimals), WAD)
}

/// Basis points -> WAD fraction
pub fn bps_to_wad(bps: u32) -> U256 {
    mul_div(U256::from(bps), WAD, U256::from(BPS_DENOMINATOR))
}

pub fn clamp(x: U256, lo: U256, hi: U256) -> U256 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// Float -> WAD with 6 decimal digits of precision (config values like 0.85)
///
/// Negative and non-finite inputs map to zero.
pub fn wad_from_f64(x: f64) -> U256 {
    if !x.is_finite() || x <= 0.0 {
        return U256::ZERO;
    }
    let micros = (x * 1e6).round() as u128;
    mul_div(U256::from(micros), WAD, U256::from(1_000_000u64))
}

/// WAD -> float for display and logging only
pub fn wad_to_f64(x: U256) -> f64 {
    format_units(x, 18, 18).parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Round a display value to `places` decimals
pub fn round_to(x: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (x * factor).round() / factor
}

/// Base units -> decimal string with exactly `places` fractional digits
///
/// Digits past `places` are truncated, not rounded.
pub fn format_units(base: U256, decimals: u8, places: usize) -> String {
    let scale = pow10(decimals);
    let integer = base / scale;
    if places == 0 {
        return integer.to_string();
    }
    let frac = (base % scale).to_string();
    let mut digits = format!("{:0>width$}", frac, width = decimals as usize);
    if digits.len() > places {
        digits.truncate(places);
    } else {
        while digits.len() < places {
            digits.push('0');
        }
    }
    format!("{integer}.{digits}")
}

/// Decimal string -> base units, e.g. "2.5" with 6 decimals -> 2_500_000
///
/// Accepts digits with an optional single fractional part. Fractional digits
/// beyond the asset's resolution are truncated.
pub fn parse_units(text: &str, decimals: u8) -> Result<U256, RiskError> {
    let invalid = || RiskError::InvalidAmountFormat {
        input: text.to_string(),
    };

    let trimmed = text.trim();
    let (integer, fraction) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if integer.is_empty() || !all_digits(integer) || !all_digits(fraction) {
        return Err(invalid());
    }
    if trimmed.ends_with('.') {
        return Err(invalid());
    }

    let places = decimals as usize;
    let mut fraction = fraction.to_string();
    if fraction.len() > places {
        fraction.truncate(places);
    }
    while fraction.len() < places {
        fraction.push('0');
    }

    format!("{integer}{fraction}")
        .parse::<U256>()
        .map_err(|_| invalid())
}
