use rand::Rng;

use crate::scenario::{QualityProfile, QualityScores};

pub const SCORE_FLOOR: f64 = 0.1;
pub const SCORE_CEIL: f64 = 1.0;

/// Sample a quality vector around the profile's base scores.
///
/// Each component is scaled by an independent `Uniform(1 - r, 1 + r)` draw
/// and clamped to `[0.1, 1.0]`. Components are drawn in field order.
pub fn generate_quality<R: Rng + ?Sized>(profile: &QualityProfile, rng: &mut R) -> QualityScores {
    let lo = 1.0 - profile.range;
    let hi = 1.0 + profile.range;
    let base = profile.base.as_array();
    let mut out = [0.0; 5];
    for (slot, b) in out.iter_mut().zip(base) {
        let u = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        *slot = (b * u).clamp(SCORE_FLOOR, SCORE_CEIL);
    }
    QualityScores::from_array(out)
}
