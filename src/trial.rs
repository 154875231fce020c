//! One trial: reset → seed → generate → submit → match → classify.

use std::time::Instant;

use rand::Rng;

use crate::ledger::fixed::to_fixed;
use crate::ledger::{BuyerRegistration, GasPolicy, Ledger, LedgerError, LedgerSession, ProductListing, SellerRegistration};
use crate::logging::{log_trial_outcome, log_trial_start};
use crate::metrics::PriceContext;
use crate::outcome::classify;
use crate::pricing::{calculate_offchain, PricingError};
use crate::quality::generate_quality;
use crate::record::{GasLog, GeneratedInputs, Timing, TrialId, TrialOutcome, TrialRecord, TrialStage};
use crate::scenario::{ExperimentPlan, Scenario};
use crate::seed::{trial_rng, trial_seed};
use crate::traders::{generate_buyer, generate_seller};

/// Listing limit passed with every seller registration.
pub const LISTING_LIMIT: u32 = 5;

/// Draw quality → offchain price → seller → buyer from `rng`, in that order.
/// Returns the inputs and the wall time spent in the pricing model.
pub fn generate_inputs<R: Rng + ?Sized>(
    plan: &ExperimentPlan,
    scenario: &Scenario,
    seed: u64,
    rng: &mut R,
) -> Result<(GeneratedInputs, f64), PricingError> {
    let quality = generate_quality(plan.quality(scenario.quality), rng);
    let started = Instant::now();
    let pricing = calculate_offchain(scenario.market, plan.market(scenario.market), &quality, rng)?;
    let offchain_secs = started.elapsed().as_secs_f64();
    let seller = generate_seller(scenario.market, pricing.reference_price, rng);
    let buyer = generate_buyer(scenario.market, pricing.reference_price, rng);
    Ok((
        GeneratedInputs {
            seed,
            quality,
            pricing,
            seller,
            buyer,
        },
        offchain_secs,
    ))
}

/// Seed from the trial identity and generate its inputs.
pub fn inputs_for(plan: &ExperimentPlan, id: &TrialId) -> Result<GeneratedInputs, PricingError> {
    let seed = trial_seed(&id.scenario_id, id.mode, id.repeat);
    let mut rng = trial_rng(&id.scenario_id, id.mode, id.repeat);
    generate_inputs(plan, &id.scenario, seed, &mut rng).map(|(inputs, _)| inputs)
}

impl GeneratedInputs {
    pub fn price_context(&self) -> PriceContext {
        PriceContext {
            reference_price: self.pricing.reference_price,
            seller_reserve: self.seller.reserve_price,
            buyer_reserve: self.buyer.reserve_price,
            seller_offer: self.seller.initial_offer,
            buyer_offer: self.buyer.initial_offer,
        }
    }
}

struct StepError {
    stage: TrialStage,
    message: String,
}

impl StepError {
    fn ledger(stage: TrialStage) -> impl FnOnce(LedgerError) -> StepError {
        move |e| StepError {
            stage,
            message: e.to_string(),
        }
    }
}

/// Measurements captured so far; survives an aborted trial.
#[derive(Default)]
struct Progress {
    inputs: Option<GeneratedInputs>,
    gas: GasLog,
    timing: Timing,
}

pub struct TrialRunner<'a, L: Ledger + ?Sized> {
    session: LedgerSession<'a, L>,
    plan: &'a ExperimentPlan,
}

impl<'a, L: Ledger + ?Sized> TrialRunner<'a, L> {
    pub fn new(ledger: &'a L, plan: &'a ExperimentPlan, gas: GasPolicy) -> Self {
        Self {
            session: LedgerSession::new(ledger, gas),
            plan,
        }
    }

    /// Run one trial to completion. Never fails: ledger and pricing errors
    /// become an `Error` outcome carrying whatever was measured.
    pub async fn run(&self, id: &TrialId) -> TrialRecord {
        log_trial_start(&id.scenario_id, id.mode.as_str(), id.repeat);
        let mut progress = Progress::default();
        let outcome = match self.drive(id, &mut progress).await {
            Ok(outcome) => outcome,
            Err(StepError { stage, message }) => TrialOutcome::Error { stage, message },
        };
        let record = TrialRecord {
            id: id.clone(),
            inputs: progress.inputs,
            gas: progress.gas,
            timing: progress.timing,
            outcome,
        };
        log_trial_outcome(&record);
        record
    }

    async fn drive(&self, id: &TrialId, progress: &mut Progress) -> Result<TrialOutcome, StepError> {
        // Reset: both must succeed before anything else touches the ledger.
        self.session.reset().await.map_err(|e| StepError {
            stage: TrialStage::Reset,
            message: format!("contract reset failed: {}", e),
        })?;
        self.session.reset_matching_state(None).await.map_err(|e| StepError {
            stage: TrialStage::Reset,
            message: format!("matching state reset failed: {}", e),
        })?;

        // Seed + GenerateInputs
        let seed = trial_seed(&id.scenario_id, id.mode, id.repeat);
        let mut rng = trial_rng(&id.scenario_id, id.mode, id.repeat);
        let (inputs, offchain_secs) =
            generate_inputs(self.plan, &id.scenario, seed, &mut rng).map_err(|e| StepError {
                stage: TrialStage::GenerateInputs,
                message: e.to_string(),
            })?;
        progress.timing.offchain_secs = offchain_secs;
        let ctx = inputs.price_context();
        let product = ProductListing {
            id: id.product_id(),
            reference_price: to_fixed(inputs.pricing.reference_price),
            quality_index: to_fixed(inputs.pricing.quality_index),
            period: id.scenario.market.period_code(),
        };
        let seller = SellerRegistration::new(&id.seller_id(), &inputs.seller, &product.id, LISTING_LIMIT);
        let buyer = BuyerRegistration::new(&id.buyer_id(), &inputs.buyer);
        progress.inputs = Some(inputs);

        self.session
            .set_pricing_mode(id.mode)
            .await
            .map_err(StepError::ledger(TrialStage::SetMode))?;

        let receipt = self
            .session
            .add_product(&product)
            .await
            .map_err(StepError::ledger(TrialStage::SubmitProduct))?;
        progress.gas.add_product = receipt.gas_used;

        let receipt = self
            .session
            .add_seller(&seller)
            .await
            .map_err(StepError::ledger(TrialStage::SubmitSeller))?;
        progress.gas.add_seller = receipt.gas_used;

        let receipt = self
            .session
            .add_buyer(&buyer)
            .await
            .map_err(StepError::ledger(TrialStage::SubmitBuyer))?;
        progress.gas.add_buyer = receipt.gas_used;

        let started = Instant::now();
        let matched = self.session.perform_matching().await;
        progress.timing.match_secs = started.elapsed().as_secs_f64();
        let receipt = matched.map_err(StepError::ledger(TrialStage::ExecuteMatching))?;
        progress.gas.matching = receipt.gas_used;

        Ok(classify(&receipt, &ctx))
    }
}
