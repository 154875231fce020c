//! Fixed-point encoding used on every value crossing the ledger boundary.

pub const SCALE: f64 = 10_000.0;

/// Scale and truncate toward zero. Negative inputs saturate to 0.
pub fn to_fixed(value: f64) -> u64 {
    (value * SCALE).trunc() as u64
}

pub fn from_fixed(value: u64) -> f64 {
    value as f64 / SCALE
}
