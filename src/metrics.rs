//! Derived fairness/efficiency metrics for a settled trade.

use serde::{Deserialize, Serialize};

/// Prices that went into one negotiation, unscaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceContext {
    pub reference_price: f64,
    pub seller_reserve: f64,
    pub buyer_reserve: f64,
    pub seller_offer: f64,
    pub buyer_offer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Price Deviation Ratio
    pub pdr: f64,
    /// Surplus Distribution Fairness
    pub sdf: f64,
    /// Expectation Convergence Efficiency
    pub ece: f64,
}

pub fn price_deviation_ratio(settled: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (settled - reference).abs() / reference
}

/// 1.0 when both reserves coincide.
pub fn surplus_distribution_fairness(settled: f64, seller_reserve: f64, buyer_reserve: f64) -> f64 {
    let spread = buyer_reserve - seller_reserve;
    if spread == 0.0 {
        return 1.0;
    }
    1.0 - (((settled - seller_reserve) / spread) - 0.5).abs()
}

/// 1.0 when both opening offers coincide.
pub fn expectation_convergence_efficiency(settled: f64, seller_offer: f64, buyer_offer: f64) -> f64 {
    let gap = seller_offer - buyer_offer;
    if gap == 0.0 {
        return 1.0;
    }
    1.0 - ((seller_offer - settled).abs() + (buyer_offer - settled).abs()) / gap.abs()
}

impl DerivedMetrics {
    pub fn compute(settled: f64, ctx: &PriceContext) -> Self {
        Self {
            pdr: price_deviation_ratio(settled, ctx.reference_price),
            sdf: surplus_distribution_fairness(settled, ctx.seller_reserve, ctx.buyer_reserve),
            ece: expectation_convergence_efficiency(settled, ctx.seller_offer, ctx.buyer_offer),
        }
    }
}
