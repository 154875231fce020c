//! Static experiment tables: markets, quality profiles, the scenario matrix
//! and per-mode repeat counts.
//!
//! Everything here is immutable once built. Generators receive the tables
//! they need by reference instead of reading module-level state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    HighVolatility,
    OverSupply,
    Balanced,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::HighVolatility => "high_volatility",
            Market::OverSupply => "over_supply",
            Market::Balanced => "balanced",
        }
    }

    /// Period code the ledger expects in `addProduct`.
    pub fn period_code(&self) -> u8 {
        match self {
            Market::HighVolatility => 0,
            Market::OverSupply => 1,
            Market::Balanced => 2,
        }
    }

    /// Multiplier applied to both reserve prices.
    pub fn reserve_multiplier(&self) -> f64 {
        match self {
            Market::OverSupply => 0.9,
            Market::HighVolatility => 1.1,
            Market::Balanced => 1.0,
        }
    }

    /// Half-width of the uniform demand perturbation.
    pub fn demand_jitter(&self) -> f64 {
        match self {
            Market::HighVolatility => 0.10,
            _ => 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Low,
    Baseline,
    High,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Low => "low",
            QualityLevel::Baseline => "baseline",
            QualityLevel::High => "high",
        }
    }
}

/// Ledger-side pricing algorithm selected before each trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PricingMode {
    #[serde(rename = "BASELINE")]
    Baseline,
    #[serde(rename = "STATIC")]
    Static,
    #[serde(rename = "BEHAVIOR_OFF")]
    BehaviorFactorOff,
}

impl PricingMode {
    pub const ALL: [PricingMode; 3] = [
        PricingMode::Baseline,
        PricingMode::Static,
        PricingMode::BehaviorFactorOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingMode::Baseline => "BASELINE",
            PricingMode::Static => "STATIC",
            PricingMode::BehaviorFactorOff => "BEHAVIOR_OFF",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PricingMode::Baseline => 0,
            PricingMode::Static => 1,
            PricingMode::BehaviorFactorOff => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BASELINE" => Some(PricingMode::Baseline),
            "STATIC" => Some(PricingMode::Static),
            "BEHAVIOR_OFF" | "NASH" => Some(PricingMode::BehaviorFactorOff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub market: Market,
    pub quality: QualityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketConstants {
    /// D
    pub base_demand: f64,
    /// S
    pub base_supply: f64,
    /// ζ
    pub scarcity: f64,
    /// λ
    pub price_sensitivity: f64,
    /// P̄
    pub anchor_price: f64,
}

/// Five component scores, in draw order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub reputation: f64,
    pub transparency: f64,
    pub completeness: f64,
    pub processing: f64,
    pub user_rating: f64,
}

impl QualityScores {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.reputation,
            self.transparency,
            self.completeness,
            self.processing,
            self.user_rating,
        ]
    }

    pub fn from_array(v: [f64; 5]) -> Self {
        Self {
            reputation: v[0],
            transparency: v[1],
            completeness: v[2],
            processing: v[3],
            user_rating: v[4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub base: QualityScores,
    pub range: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatCounts {
    pub baseline: u32,
    pub static_mode: u32,
    pub behavior_off: u32,
}

impl RepeatCounts {
    pub fn for_mode(&self, mode: PricingMode) -> u32 {
        match mode {
            PricingMode::Baseline => self.baseline,
            PricingMode::Static => self.static_mode,
            PricingMode::BehaviorFactorOff => self.behavior_off,
        }
    }

    pub fn total(&self) -> u32 {
        self.baseline + self.static_mode + self.behavior_off
    }
}

impl Default for RepeatCounts {
    fn default() -> Self {
        Self {
            baseline: 2,
            static_mode: 1,
            behavior_off: 1,
        }
    }
}

/// The full static configuration of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    /// Ordered scenario matrix; order defines execution order.
    pub scenarios: Vec<(String, Scenario)>,
    pub repeats: RepeatCounts,
    pub high_volatility: MarketConstants,
    pub over_supply: MarketConstants,
    pub balanced: MarketConstants,
    pub low_quality: QualityProfile,
    pub baseline_quality: QualityProfile,
    pub high_quality: QualityProfile,
}

impl ExperimentPlan {
    pub fn market(&self, market: Market) -> &MarketConstants {
        match market {
            Market::HighVolatility => &self.high_volatility,
            Market::OverSupply => &self.over_supply,
            Market::Balanced => &self.balanced,
        }
    }

    pub fn quality(&self, level: QualityLevel) -> &QualityProfile {
        match level {
            QualityLevel::Low => &self.low_quality,
            QualityLevel::Baseline => &self.baseline_quality,
            QualityLevel::High => &self.high_quality,
        }
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|(sid, _)| sid == id).map(|(_, s)| s)
    }

    pub fn total_trials(&self) -> u32 {
        self.scenarios.len() as u32 * self.repeats.total()
    }

    /// Every (scenario id, mode, repeat) cell in execution order.
    pub fn cells(&self) -> Vec<(String, PricingMode, u32)> {
        let mut cells = Vec::with_capacity(self.total_trials() as usize);
        for (id, _) in &self.scenarios {
            for mode in PricingMode::ALL {
                for repeat in 0..self.repeats.for_mode(mode) {
                    cells.push((id.clone(), mode, repeat));
                }
            }
        }
        cells
    }
}

impl Default for ExperimentPlan {
    fn default() -> Self {
        let s = |market, quality| Scenario { market, quality };
        Self {
            scenarios: vec![
                ("S1".to_string(), s(Market::HighVolatility, QualityLevel::Low)),
                ("S2".to_string(), s(Market::HighVolatility, QualityLevel::High)),
                ("M1".to_string(), s(Market::OverSupply, QualityLevel::Baseline)),
                ("M2".to_string(), s(Market::OverSupply, QualityLevel::Low)),
                ("L1".to_string(), s(Market::Balanced, QualityLevel::High)),
                ("L2".to_string(), s(Market::Balanced, QualityLevel::Baseline)),
            ],
            repeats: RepeatCounts::default(),
            high_volatility: MarketConstants {
                base_demand: 100.0,
                base_supply: 25.0,
                scarcity: 4.0,
                price_sensitivity: 1.5,
                anchor_price: 100.0,
            },
            over_supply: MarketConstants {
                base_demand: 80.0,
                base_supply: 25.0,
                scarcity: 7.0,
                price_sensitivity: 0.8,
                anchor_price: 100.0,
            },
            balanced: MarketConstants {
                base_demand: 150.0,
                base_supply: 30.0,
                scarcity: 5.0,
                price_sensitivity: 0.8,
                anchor_price: 100.0,
            },
            low_quality: QualityProfile {
                base: QualityScores::from_array([0.7, 0.6, 0.65, 0.6, 0.55]),
                range: 0.15,
            },
            baseline_quality: QualityProfile {
                base: QualityScores::from_array([0.8, 0.8, 0.75, 0.7, 0.7]),
                range: 0.10,
            },
            high_quality: QualityProfile {
                base: QualityScores::from_array([0.9, 0.9, 0.85, 0.8, 0.85]),
                range: 0.05,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_has_six_scenarios_and_24_cells() {
        let plan = ExperimentPlan::default();
        assert_eq!(plan.scenarios.len(), 6);
        assert_eq!(plan.total_trials(), 24);
        assert_eq!(plan.cells().len(), 24);
    }

    #[test]
    fn cells_follow_scenario_then_mode_then_repeat() {
        let plan = ExperimentPlan::default();
        let cells = plan.cells();
        assert_eq!(cells[0], ("S1".to_string(), PricingMode::Baseline, 0));
        assert_eq!(cells[1], ("S1".to_string(), PricingMode::Baseline, 1));
        assert_eq!(cells[2], ("S1".to_string(), PricingMode::Static, 0));
        assert_eq!(cells[3], ("S1".to_string(), PricingMode::BehaviorFactorOff, 0));
        assert_eq!(cells[4].0, "S2");
    }

    #[test]
    fn scenario_lookup_by_id() {
        let plan = ExperimentPlan::default();
        let m2 = plan.scenario("M2").unwrap();
        assert_eq!(m2.market, Market::OverSupply);
        assert_eq!(m2.quality, QualityLevel::Low);
        assert!(plan.scenario("Z9").is_none());
    }

    #[test]
    fn pricing_mode_codes_and_parse() {
        assert_eq!(PricingMode::Baseline.code(), 0);
        assert_eq!(PricingMode::Static.code(), 1);
        assert_eq!(PricingMode::BehaviorFactorOff.code(), 2);
        assert_eq!(PricingMode::parse("nash"), Some(PricingMode::BehaviorFactorOff));
        assert_eq!(PricingMode::parse("static"), Some(PricingMode::Static));
        assert_eq!(PricingMode::parse("dynamic"), None);
    }
}
