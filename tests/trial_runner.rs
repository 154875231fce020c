//! End-to-end trial behaviour against a scripted ledger.

mod common;

use serde_json::json;

use common::{receipt, ScriptedLedger};
use datamatch_lab::ledger::fixed::to_fixed;
use datamatch_lab::ledger::{GasPolicy, LedgerError, LedgerEvent, MatchedDetailEvent, MatchedEvent};
use datamatch_lab::metrics::DerivedMetrics;
use datamatch_lab::record::{EventSource, TrialId, TrialOutcome, TrialStage};
use datamatch_lab::scenario::{ExperimentPlan, Market, PricingMode, QualityLevel, Scenario};
use datamatch_lab::trial::{inputs_for, TrialRunner};

fn s1(mode: PricingMode, repeat: u32) -> TrialId {
    TrialId {
        scenario_id: "S1".to_string(),
        scenario: Scenario {
            market: Market::HighVolatility,
            quality: QualityLevel::Low,
        },
        mode,
        repeat,
    }
}

fn matched(price: u64) -> LedgerEvent {
    LedgerEvent::Matched(MatchedEvent {
        buyer_id: "buyer_S1_0".into(),
        seller_id: "seller_S1_0".into(),
        price,
    })
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
}

#[tokio::test]
async fn summary_event_yields_priced_success() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger.push("performMatching", Ok(receipt("performMatching", vec![matched(1_050_000)])));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let id = s1(PricingMode::Baseline, 0);

    let record = runner.run(&id).await;

    let inputs = record.inputs.as_ref().expect("inputs generated");
    assert_eq!(inputs.seed, 899_332_673);
    assert_close(inputs.pricing.reference_price, 93.63344650441478);
    assert_close(inputs.seller.reserve_price, 107.38955831237807);
    assert_close(inputs.seller.initial_offer, 124.19580483849889);
    assert_close(inputs.buyer.reserve_price, 120.26342656260609);
    assert_close(inputs.buyer.initial_offer, 81.31597503994395);

    assert_eq!(record.settled_price(), Some(105.0));
    assert_eq!(record.match_success(), 1);
    match &record.outcome {
        TrialOutcome::Success { metrics, source, buyer_id, .. } => {
            assert_close(metrics.pdr, 0.12139415903108185);
            assert_close(metrics.sdf, 0.3143869219466535);
            assert_close(metrics.ece, 0.0);
            assert_eq!(*source, EventSource::Summary);
            assert_eq!(buyer_id, "buyer_S1_0");
        }
        other => panic!("unexpected {:?}", other),
    }

    let calls = ledger.calls();
    assert_eq!(calls[3].args[1], json!(936_334));
    assert_eq!(calls[4].args[1], json!(1_073_895));
    assert_eq!(calls[4].args[2], json!(1_241_958));
    assert_eq!(calls[5].args[1], json!(1_202_634));
    assert_eq!(calls[5].args[2], json!(813_159));

    assert_eq!(record.gas.add_product, 120_000);
    assert_eq!(record.gas.add_seller, 150_000);
    assert_eq!(record.gas.add_buyer, 140_000);
    assert_eq!(record.gas.matching, 300_000);
    assert_eq!(record.gas.total(), 710_000);
}

#[tokio::test]
async fn pricing_domain_error_stops_before_ledger_writes() {
    let mut plan = ExperimentPlan::default();
    plan.high_volatility.base_demand = -1000.0;
    let ledger = ScriptedLedger::new();
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());

    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;

    assert_eq!(ledger.functions(), vec!["resetAll", "resetMatchingState"]);
    assert!(record.inputs.is_none());
    assert_eq!(record.gas.total(), 0);
    assert!(record.is_error());
    assert!(matches!(
        record.outcome,
        TrialOutcome::Error {
            stage: TrialStage::GenerateInputs,
            ..
        }
    ));
    assert!(record
        .failure_reason()
        .starts_with("input generation failed: scarcity log argument non-positive"));
    assert_eq!(record.to_row().error_stage.as_deref(), Some("generate_inputs"));
}

#[tokio::test]
async fn operations_follow_fixed_sequence_with_scaled_arguments() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let id = s1(PricingMode::Static, 0);
    runner.run(&id).await;

    assert_eq!(
        ledger.functions(),
        vec![
            "resetAll",
            "resetMatchingState",
            "setPricingMode",
            "addProduct",
            "addSeller",
            "addBuyer",
            "performMatching"
        ]
    );
    let inputs = inputs_for(&plan, &id).unwrap();
    let calls = ledger.calls();
    assert_eq!(calls[1].args, vec![json!("")]);
    assert_eq!(calls[2].args, vec![json!(1)]);
    assert_eq!(
        calls[3].args,
        vec![
            json!("S1_STATIC_0"),
            json!(to_fixed(inputs.pricing.reference_price)),
            json!(to_fixed(inputs.pricing.quality_index)),
            json!(0),
        ]
    );
    assert_eq!(calls[4].args[0], json!("seller_S1_0"));
    assert_eq!(calls[4].args[1], json!(to_fixed(inputs.seller.reserve_price)));
    assert_eq!(calls[4].args[5], json!("S1_STATIC_0"));
    assert_eq!(calls[4].args[6], json!(5));
    assert_eq!(calls[5].args[0], json!("buyer_S1_0"));
    assert_eq!(calls[5].args[5], json!(3_000));
    assert!(calls.iter().all(|c| c.gas_limit == 8_000_000));
}

#[tokio::test]
async fn no_event_classifies_as_failure() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 1)).await;

    assert_eq!(record.match_success(), 0);
    assert_eq!(record.settled_price(), None);
    assert_eq!(record.failure_reason(), "succeeded but no matching event found");
    assert!(record.metrics().is_none());
    assert!(record.inputs.is_some());
}

#[tokio::test]
async fn diagnostic_negotiation_failure() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    let detail = LedgerEvent::MatchedDetail(MatchedDetailEvent {
        buyer_id: "buyer_S1_0".into(),
        seller_id: "seller_S1_0".into(),
        quality_passed: true,
        reserve_price_valid: true,
        price_range: true,
        deal_success: false,
        deal_price: 0,
    });
    ledger.push("performMatching", Ok(receipt("performMatching", vec![detail])));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;
    assert_eq!(
        record.outcome,
        TrialOutcome::Failure {
            reason: "price negotiation failed".into()
        }
    );
}

#[tokio::test]
async fn diagnostic_deal_uses_deal_price() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    let detail = LedgerEvent::MatchedDetail(MatchedDetailEvent {
        buyer_id: "b".into(),
        seller_id: "s".into(),
        quality_passed: true,
        reserve_price_valid: true,
        price_range: true,
        deal_success: true,
        deal_price: 987_654,
    });
    ledger.push("performMatching", Ok(receipt("performMatching", vec![detail])));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let id = s1(PricingMode::BehaviorFactorOff, 0);
    let record = runner.run(&id).await;
    assert_eq!(record.settled_price(), Some(98.7654));
    let ctx = inputs_for(&plan, &id).unwrap().price_context();
    assert_eq!(record.metrics(), Some(&DerivedMetrics::compute(98.7654, &ctx)));
}

#[tokio::test]
async fn reset_failure_stops_before_generation() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger.push("resetAll", Err(LedgerError::Rpc { code: -32000, message: "revert".into() }));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;

    assert_eq!(ledger.functions(), vec!["resetAll"]);
    assert!(record.inputs.is_none());
    assert_eq!(record.gas.total(), 0);
    match &record.outcome {
        TrialOutcome::Error { stage, message } => {
            assert_eq!(*stage, TrialStage::Reset);
            assert!(message.starts_with("contract reset failed"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(record.failure_reason().starts_with("contract reset failed"));
}

#[tokio::test]
async fn matching_state_reset_failure_is_reported() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger.push("resetMatchingState", Err(LedgerError::Transport("eof".into())));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;
    assert_eq!(ledger.functions(), vec!["resetAll", "resetMatchingState"]);
    assert!(record.failure_reason().starts_with("matching state reset failed"));
}

#[tokio::test]
async fn mid_sequence_failure_keeps_partial_measurements() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger.push("addSeller", Err(LedgerError::Reverted { tx_hash: "0xbeef".into() }));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;

    assert_eq!(ledger.functions().last(), Some(&"addSeller"));
    assert_eq!(record.gas.add_product, 120_000);
    assert_eq!(record.gas.add_seller, 0);
    assert_eq!(record.gas.matching, 0);
    assert!(record.inputs.is_some());
    assert_eq!(record.timing.match_secs, 0.0);
    assert_eq!(record.failure_reason(), "transaction failed: transaction 0xbeef reverted");
    let row = record.to_row();
    assert_eq!(row.total_gas, 120_000);
    assert_eq!(row.error_stage.as_deref(), Some("submit_seller"));
}

#[tokio::test]
async fn oversized_matching_is_retried_with_reduced_gas() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger
        .push("performMatching", Err(LedgerError::ResourceExceeded("exceeds block gas limit".into())))
        .push("performMatching", Ok(receipt("performMatching", vec![matched(1_000_000)])));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;

    let matching: Vec<u64> = ledger
        .calls()
        .iter()
        .filter(|c| c.function == "performMatching")
        .map(|c| c.gas_limit)
        .collect();
    assert_eq!(matching, vec![8_000_000, 3_000_000]);
    assert_eq!(record.settled_price(), Some(100.0));
}

#[tokio::test]
async fn repeated_resource_exceeded_is_an_error_record() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    ledger
        .push("addProduct", Err(LedgerError::ResourceExceeded("too big".into())))
        .push("addProduct", Err(LedgerError::ResourceExceeded("still too big".into())));
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());
    let record = runner.run(&s1(PricingMode::Baseline, 0)).await;
    assert!(matches!(
        record.outcome,
        TrialOutcome::Error { stage: TrialStage::SubmitProduct, .. }
    ));
    assert!(!ledger.functions().contains(&"addSeller"));
}

#[tokio::test]
async fn same_identity_same_inputs_regardless_of_order() {
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    let runner = TrialRunner::new(&ledger, &plan, GasPolicy::default());

    let a = runner.run(&s1(PricingMode::Baseline, 0)).await;
    runner.run(&s1(PricingMode::Static, 0)).await;
    runner.run(&s1(PricingMode::Baseline, 1)).await;
    let b = runner.run(&s1(PricingMode::Baseline, 0)).await;

    assert_eq!(a.inputs, b.inputs);
    let encoded_a = serde_json::to_vec(&a.inputs).unwrap();
    let encoded_b = serde_json::to_vec(&b.inputs).unwrap();
    assert_eq!(encoded_a, encoded_b);
}

#[test]
fn generated_inputs_respect_invariants_across_matrix() {
    let plan = ExperimentPlan::default();
    for (scenario_id, mode, repeat) in plan.cells() {
        let scenario = *plan.scenario(&scenario_id).unwrap();
        let id = TrialId { scenario_id, scenario, mode, repeat };
        let inputs = inputs_for(&plan, &id).unwrap();
        assert!(inputs.quality.as_array().iter().all(|s| (0.1..=1.0).contains(s)));
        assert!(inputs.pricing.quality_index > 0.0 && inputs.pricing.quality_index <= 1.0);
        assert!(inputs.seller.initial_offer > inputs.seller.reserve_price);
        assert!(inputs.buyer.initial_offer < inputs.buyer.reserve_price);
        assert_eq!(inputs.buyer.quality_threshold, 0.3);
    }
}
