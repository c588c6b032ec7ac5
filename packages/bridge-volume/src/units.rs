//! Conversions between raw token units and human-readable amounts

use alloy::primitives::U256;

/// Convert a human-readable amount to raw token units (truncating past `decimals`).
pub fn to_token_units(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }

    let formatted = format!("{:.*}", decimals as usize, amount);
    let digits: String = formatted.chars().filter(|c| *c != '.').collect();
    U256::from_str_radix(&digits, 10).unwrap_or(U256::ZERO)
}

/// Convert raw token units to a human-readable amount.
pub fn from_token_units(raw: U256, decimals: u8) -> f64 {
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / scale;
    let frac = raw % scale;
    to_f64(whole) + to_f64(frac) / 10f64.powi(decimals as i32)
}

fn to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap_or(f64::MAX)
}

/// Scale `amount` by a float multiplier with four decimal places of precision.
pub fn scale_amount(amount: U256, multiplier: f64) -> U256 {
    let basis = (multiplier.max(0.0) * 10_000.0).round() as u64;
    amount * U256::from(basis) / U256::from(10_000u64)
}
