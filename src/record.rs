//! Per-trial result record.
//!
//! A record always carries its identification prefix; the outcome is a
//! tagged union so that "priced", "unpriced" and "aborted" trials cannot be
//! confused downstream.

use serde::{Deserialize, Serialize};

use crate::metrics::DerivedMetrics;
use crate::pricing::OffchainPricing;
use crate::scenario::{PricingMode, QualityScores, Scenario};
use crate::traders::{BuyerParams, SellerParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialId {
    pub scenario_id: String,
    pub scenario: Scenario,
    pub mode: PricingMode,
    pub repeat: u32,
}

impl TrialId {
    pub fn product_id(&self) -> String {
        format!("{}_{}_{}", self.scenario_id, self.mode.as_str(), self.repeat)
    }

    pub fn seller_id(&self) -> String {
        format!("seller_{}_{}", self.scenario_id, self.repeat)
    }

    pub fn buyer_id(&self) -> String {
        format!("buyer_{}_{}", self.scenario_id, self.repeat)
    }

    pub fn label(&self) -> String {
        format!("{}-{}-{}", self.scenario_id, self.mode.as_str(), self.repeat)
    }
}

/// Everything drawn from the trial's seeded stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedInputs {
    pub seed: u64,
    pub quality: QualityScores,
    pub pricing: OffchainPricing,
    pub seller: SellerParams,
    pub buyer: BuyerParams,
}

/// Gas used per step; zero for steps never reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasLog {
    pub add_product: u64,
    pub add_seller: u64,
    pub add_buyer: u64,
    pub matching: u64,
}

impl GasLog {
    pub fn total(&self) -> u64 {
        self.add_product + self.add_seller + self.add_buyer + self.matching
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timing {
    /// Offchain pricing model wall time.
    pub offchain_secs: f64,
    /// Wall time around the matching call.
    pub match_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Summary,
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStage {
    Reset,
    GenerateInputs,
    SetMode,
    SubmitProduct,
    SubmitSeller,
    SubmitBuyer,
    ExecuteMatching,
}

impl TrialStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStage::Reset => "reset",
            TrialStage::GenerateInputs => "generate_inputs",
            TrialStage::SetMode => "set_mode",
            TrialStage::SubmitProduct => "submit_product",
            TrialStage::SubmitSeller => "submit_seller",
            TrialStage::SubmitBuyer => "submit_buyer",
            TrialStage::ExecuteMatching => "execute_matching",
        }
    }

    pub fn touches_ledger(&self) -> bool {
        !matches!(self, TrialStage::GenerateInputs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrialOutcome {
    Success {
        settled_price: f64,
        metrics: DerivedMetrics,
        buyer_id: String,
        seller_id: String,
        source: EventSource,
        /// Diagnostic reasons reported alongside a completed deal.
        notes: Option<String>,
    },
    Failure {
        reason: String,
    },
    Error {
        stage: TrialStage,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: TrialId,
    pub inputs: Option<GeneratedInputs>,
    pub gas: GasLog,
    pub timing: Timing,
    pub outcome: TrialOutcome,
}

impl TrialRecord {
    pub fn match_success(&self) -> u8 {
        matches!(self.outcome, TrialOutcome::Success { .. }) as u8
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, TrialOutcome::Error { .. })
    }

    pub fn settled_price(&self) -> Option<f64> {
        match &self.outcome {
            TrialOutcome::Success { settled_price, .. } => Some(*settled_price),
            _ => None,
        }
    }

    pub fn metrics(&self) -> Option<&DerivedMetrics> {
        match &self.outcome {
            TrialOutcome::Success { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> String {
        match &self.outcome {
            TrialOutcome::Success { notes, .. } => notes.clone().unwrap_or_default(),
            TrialOutcome::Failure { reason } => reason.clone(),
            TrialOutcome::Error {
                stage: TrialStage::Reset,
                message,
            } => message.clone(),
            TrialOutcome::Error { stage, message } if stage.touches_ledger() => {
                format!("transaction failed: {}", message)
            }
            TrialOutcome::Error { message, .. } => format!("input generation failed: {}", message),
        }
    }

    /// Flatten for tabular export.
    pub fn to_row(&self) -> TrialRow {
        let (buyer_id, seller_id) = match &self.outcome {
            TrialOutcome::Success { buyer_id, seller_id, .. } => (Some(buyer_id.clone()), Some(seller_id.clone())),
            _ => (None, None),
        };
        let error_stage = match &self.outcome {
            TrialOutcome::Error { stage, .. } => Some(stage.as_str().to_string()),
            _ => None,
        };
        let m = self.metrics();
        let inp = self.inputs.as_ref();
        TrialRow {
            test_id: self.id.scenario_id.clone(),
            repeat_idx: self.id.repeat,
            mode: self.id.mode.as_str().to_string(),
            market: self.id.scenario.market.as_str().to_string(),
            quality: self.id.scenario.quality.as_str().to_string(),
            seed: inp.map(|i| i.seed),
            p_off: inp.map(|i| i.pricing.reference_price),
            q_p: inp.map(|i| i.pricing.quality_index),
            m_d: inp.map(|i| i.pricing.market_factor),
            p_res_s: inp.map(|i| i.seller.reserve_price),
            p_res_b: inp.map(|i| i.buyer.reserve_price),
            p_0_s: inp.map(|i| i.seller.initial_offer),
            p_0_b: inp.map(|i| i.buyer.initial_offer),
            offchain_time: self.timing.offchain_secs,
            gas_add_product: self.gas.add_product,
            gas_add_seller: self.gas.add_seller,
            gas_add_buyer: self.gas.add_buyer,
            gas_matching: self.gas.matching,
            total_gas: self.gas.total(),
            match_time: self.timing.match_secs,
            match_success: self.match_success(),
            failure_reason: self.failure_reason(),
            p_on: self.settled_price(),
            pdr: m.map(|m| m.pdr),
            sdf: m.map(|m| m.sdf),
            ece: m.map(|m| m.ece),
            buyer_id,
            seller_id,
            error_stage,
        }
    }
}

/// One flat row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub test_id: String,
    pub repeat_idx: u32,
    pub mode: String,
    pub market: String,
    pub quality: String,
    pub seed: Option<u64>,
    pub p_off: Option<f64>,
    pub q_p: Option<f64>,
    pub m_d: Option<f64>,
    pub p_res_s: Option<f64>,
    pub p_res_b: Option<f64>,
    pub p_0_s: Option<f64>,
    pub p_0_b: Option<f64>,
    pub offchain_time: f64,
    pub gas_add_product: u64,
    pub gas_add_seller: u64,
    pub gas_add_buyer: u64,
    pub gas_matching: u64,
    pub total_gas: u64,
    pub match_time: f64,
    pub match_success: u8,
    pub failure_reason: String,
    pub p_on: Option<f64>,
    pub pdr: Option<f64>,
    pub sdf: Option<f64>,
    pub ece: Option<f64>,
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub error_stage: Option<String>,
}
