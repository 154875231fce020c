//! Drives the whole scenario × mode × repeat matrix.
//!
//! Trials run strictly one after another: the ledger holds global mutable
//! state that every trial resets, and each trial owns its seeded stream.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use crate::ledger::fixed::{from_fixed, to_fixed};
use crate::ledger::{BuyerRegistration, GasPolicy, Ledger, LedgerSession, ProductListing, SellerRegistration};
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::record::{TrialId, TrialRecord};
use crate::report::{ReportSink, ScenarioSummary};
use crate::scenario::{ExperimentPlan, Market, PricingMode};
use crate::traders::{BuyerParams, SellerParams};
use crate::trial::TrialRunner;

/// What the smoke check observed.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeReport {
    pub block_number: u64,
    pub reset_gas: u64,
    pub product_gas: u64,
    pub seller_gas: u64,
    pub buyer_gas: u64,
    pub matching_gas: u64,
    /// Settled price if the matching receipt carried a summary event.
    pub matched_price: Option<f64>,
}

/// Fail fast if the ledger is unreachable.
pub async fn connectivity_check<L: Ledger + ?Sized>(ledger: &L) -> Result<u64> {
    let block = ledger
        .block_number()
        .await
        .map_err(|e| anyhow!("ledger unreachable: {}", e))?;
    log(
        Level::Info,
        Domain::Experiment,
        "connectivity.ok",
        obj(&[("block_number", json!(block))]),
    );
    Ok(block)
}

/// Walk every contract operation once with fixed, known-good parameters.
/// Any failure here is fatal for the run.
pub async fn smoke_test<L: Ledger + ?Sized>(ledger: &L, gas: GasPolicy) -> Result<SmokeReport> {
    let _scope = ProfileScope::new("smoke_test");
    let block_number = connectivity_check(ledger).await?;
    let session = LedgerSession::new(ledger, gas);

    let reset = session.reset().await.context("smoke: contract reset failed")?;
    session
        .reset_matching_state(None)
        .await
        .context("smoke: matching state reset failed")?;
    session
        .set_pricing_mode(PricingMode::Baseline)
        .await
        .context("smoke: set pricing mode failed")?;

    let product = ProductListing {
        id: "smoke_test".to_string(),
        reference_price: to_fixed(100.0),
        quality_index: to_fixed(0.75),
        period: Market::HighVolatility.period_code(),
    };
    let product_r = session.add_product(&product).await.context("smoke: add product failed")?;

    let seller = SellerParams {
        reserve_price: 80.0,
        initial_offer: 100.0,
        concession_rate: 0.5,
        flexibility: 0.7,
    };
    let seller_r = session
        .add_seller(&SellerRegistration::new("seller_smoke", &seller, &product.id, 5))
        .await
        .context("smoke: add seller failed")?;

    let buyer = BuyerParams {
        reserve_price: 120.0,
        initial_offer: 90.0,
        concession_rate: 0.6,
        flexibility: 0.8,
        quality_threshold: 0.0,
    };
    let buyer_r = session
        .add_buyer(&BuyerRegistration::new("buyer_smoke", &buyer))
        .await
        .context("smoke: add buyer failed")?;

    let matching = session.perform_matching().await.context("smoke: matching failed")?;
    let matched_price = matching.matched().map(|m| from_fixed(m.price));
    if matched_price.is_none() {
        log(
            Level::Warn,
            Domain::Experiment,
            "smoke.no_event",
            obj(&[("msg", v_str("matching receipt carried no Matched event"))]),
        );
    }

    let report = SmokeReport {
        block_number,
        reset_gas: reset.gas_used,
        product_gas: product_r.gas_used,
        seller_gas: seller_r.gas_used,
        buyer_gas: buyer_r.gas_used,
        matching_gas: matching.gas_used,
        matched_price,
    };
    log(
        Level::Info,
        Domain::Experiment,
        "smoke.ok",
        obj(&[
            ("product_gas", json!(report.product_gas)),
            ("seller_gas", json!(report.seller_gas)),
            ("buyer_gas", json!(report.buyer_gas)),
            ("matching_gas", json!(report.matching_gas)),
            ("matched_price", matched_price.map(v_num).unwrap_or(serde_json::Value::Null)),
        ]),
    );
    Ok(report)
}

pub struct Experiment<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    plan: &'a ExperimentPlan,
    gas: GasPolicy,
}

impl<'a, L: Ledger + ?Sized> Experiment<'a, L> {
    pub fn new(ledger: &'a L, plan: &'a ExperimentPlan, gas: GasPolicy) -> Self {
        Self { ledger, plan, gas }
    }

    pub fn trial_ids(&self) -> Vec<TrialId> {
        self.plan
            .cells()
            .into_iter()
            .filter_map(|(scenario_id, mode, repeat)| {
                let scenario = *self.plan.scenario(&scenario_id)?;
                Some(TrialId {
                    scenario_id,
                    scenario,
                    mode,
                    repeat,
                })
            })
            .collect()
    }

    /// Run every cell in order. A failed trial never stops the matrix; sink
    /// append errors are logged and skipped.
    pub async fn run_matrix<S: ReportSink + ?Sized>(&self, sink: &mut S) -> Vec<TrialRecord> {
        let ids = self.trial_ids();
        let runner = TrialRunner::new(self.ledger, self.plan, self.gas);
        log(
            Level::Info,
            Domain::Experiment,
            "matrix.start",
            obj(&[("trials", json!(ids.len()))]),
        );
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            let record = runner.run(id).await;
            if let Err(err) = sink.append(&record) {
                log(
                    Level::Warn,
                    Domain::Report,
                    "report.append_failed",
                    obj(&[("trial", v_str(&id.label())), ("error", v_str(&err.to_string()))]),
                );
            }
            records.push(record);
        }
        records
    }

    /// Matrix plus aggregate report.
    pub async fn run<S: ReportSink + ?Sized>(&self, sink: &mut S) -> Result<ExperimentOutcome> {
        let started = Instant::now();
        let records = self.run_matrix(sink).await;
        let summary = sink.finish(&records)?;
        let outcome = ExperimentOutcome {
            duration_secs: started.elapsed().as_secs_f64(),
            successes: records.iter().filter(|r| r.match_success() == 1).count(),
            errors: records.iter().filter(|r| r.is_error()).count(),
            records,
            summary,
        };
        log(
            Level::Info,
            Domain::Experiment,
            "matrix.done",
            obj(&[
                ("trials", json!(outcome.records.len())),
                ("successes", json!(outcome.successes)),
                ("errors", json!(outcome.errors)),
                ("duration_secs", v_num(outcome.duration_secs)),
            ]),
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub records: Vec<TrialRecord>,
    pub summary: Vec<ScenarioSummary>,
    pub successes: usize,
    pub errors: usize,
    pub duration_secs: f64,
}
