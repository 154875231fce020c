//! Offchain reference pricing.
//!
//! `P_off = M_d × Q_p` where the market factor comes from a logarithmic
//! scarcity transform of the perturbed demand/supply ratio and the quality
//! index is the equal-weight geometric mean of the five scores.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenario::{Market, MarketConstants, QualityScores};

/// Weight applied to every quality component.
pub const QUALITY_WEIGHT: f64 = 0.2;

#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// `ln(e - 1 + ratio)` needs a positive argument. Hitting this means the
    /// market constants are out of range, not that the trial was unlucky.
    #[error("scarcity log argument non-positive (supply ratio {supply_ratio:.6})")]
    ScarcityDomain { supply_ratio: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffchainPricing {
    pub market_factor: f64,
    pub quality_index: f64,
    pub reference_price: f64,
}

pub fn scarcity_factor(supply_ratio: f64) -> Result<f64, PricingError> {
    let arg = std::f64::consts::E - 1.0 + supply_ratio;
    if arg <= 0.0 || !arg.is_finite() {
        return Err(PricingError::ScarcityDomain { supply_ratio });
    }
    Ok(arg.ln())
}

pub fn quality_index(q: &QualityScores) -> f64 {
    q.as_array().iter().map(|s| s.powf(QUALITY_WEIGHT)).product()
}

/// Compute the reference price. Consumes exactly one draw from `rng`.
pub fn calculate_offchain<R: Rng + ?Sized>(
    market: Market,
    constants: &MarketConstants,
    quality: &QualityScores,
    rng: &mut R,
) -> Result<OffchainPricing, PricingError> {
    let jitter = market.demand_jitter();
    let delta = rng.gen_range(-jitter..jitter);
    let adjusted_demand = constants.base_demand * (1.0 + delta);
    let supply_ratio = adjusted_demand / (constants.scarcity * constants.base_supply);
    let scarcity = scarcity_factor(supply_ratio)?;
    let market_factor = constants.price_sensitivity * constants.anchor_price * scarcity;
    let quality_index = quality_index(quality);
    Ok(OffchainPricing {
        market_factor,
        quality_index,
        reference_price: market_factor * quality_index,
    })
}
