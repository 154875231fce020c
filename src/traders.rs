use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::scenario::Market;

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.3;

/// Uniform draw bounds for one trader role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleBounds {
    /// Reserve price as a fraction of `P_off`, before the market multiplier.
    pub reserve: (f64, f64),
    /// Initial offer as a fraction of the reserve price.
    pub offer: (f64, f64),
    pub concession: (f64, f64),
    pub flexibility: (f64, f64),
}

pub const SELLER_BOUNDS: RoleBounds = RoleBounds {
    reserve: (0.5, 1.05),
    offer: (1.05, 1.7),
    concession: (0.6, 0.9),
    flexibility: (0.3, 0.9),
};

pub const BUYER_BOUNDS: RoleBounds = RoleBounds {
    reserve: (0.95, 1.5),
    offer: (0.3, 0.95),
    concession: (0.4, 0.8),
    flexibility: (0.3, 0.9),
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SellerParams {
    pub reserve_price: f64,
    pub initial_offer: f64,
    pub concession_rate: f64,
    pub flexibility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyerParams {
    pub reserve_price: f64,
    pub initial_offer: f64,
    pub concession_rate: f64,
    pub flexibility: f64,
    pub quality_threshold: f64,
}

fn draw<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    rng.gen_range(lo..hi)
}

/// Seller floor and ask. The ask always sits above the floor.
pub fn generate_seller<R: Rng + ?Sized>(market: Market, reference_price: f64, rng: &mut R) -> SellerParams {
    let b = SELLER_BOUNDS;
    let reserve_price = reference_price * draw(rng, b.reserve) * market.reserve_multiplier();
    let initial_offer = reserve_price * draw(rng, b.offer);
    SellerParams {
        reserve_price,
        initial_offer,
        concession_rate: draw(rng, b.concession),
        flexibility: draw(rng, b.flexibility),
    }
}

/// Buyer ceiling and bid. The bid always sits below the ceiling.
pub fn generate_buyer<R: Rng + ?Sized>(market: Market, reference_price: f64, rng: &mut R) -> BuyerParams {
    generate_buyer_with_threshold(market, reference_price, DEFAULT_QUALITY_THRESHOLD, rng)
}

pub fn generate_buyer_with_threshold<R: Rng + ?Sized>(
    market: Market,
    reference_price: f64,
    quality_threshold: f64,
    rng: &mut R,
) -> BuyerParams {
    let b = BUYER_BOUNDS;
    let reserve_price = reference_price * draw(rng, b.reserve) * market.reserve_multiplier();
    let initial_offer = reserve_price * draw(rng, b.offer);
    BuyerParams {
        reserve_price,
        initial_offer,
        concession_rate: draw(rng, b.concession),
        flexibility: draw(rng, b.flexibility),
        quality_threshold,
    }
}
