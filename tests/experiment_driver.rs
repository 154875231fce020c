//! Matrix driver, smoke check and reporting against a scripted ledger.

mod common;

use common::{receipt, ScriptedLedger};
use datamatch_lab::experiment::{connectivity_check, smoke_test, Experiment};
use datamatch_lab::ledger::{GasPolicy, LedgerError, LedgerEvent, MatchedEvent, NullLedger};
use datamatch_lab::report::{FileSink, MemorySink, RunManifest};
use datamatch_lab::scenario::{ExperimentPlan, PricingMode, RepeatCounts};
use datamatch_lab::storage::ResultStore;

fn matched(price: u64) -> LedgerEvent {
    LedgerEvent::Matched(MatchedEvent {
        buyer_id: "b".into(),
        seller_id: "s".into(),
        price,
    })
}

#[tokio::test]
async fn full_matrix_runs_every_cell_in_order() {
    let plan = ExperimentPlan::default();
    let ledger = NullLedger::new();
    let experiment = Experiment::new(&ledger, &plan, GasPolicy::default());
    let outcome = experiment.run(&mut MemorySink).await.unwrap();

    assert_eq!(outcome.records.len(), 24);
    assert_eq!(outcome.successes, 0);
    assert_eq!(outcome.errors, 0);
    assert_eq!(outcome.summary.len(), 18);
    let first = &outcome.records[0].id;
    assert_eq!((first.scenario_id.as_str(), first.mode, first.repeat), ("S1", PricingMode::Baseline, 0));
    let last = &outcome.records[23].id;
    assert_eq!((last.scenario_id.as_str(), last.mode), ("L2", PricingMode::BehaviorFactorOff));
    assert!(outcome
        .records
        .iter()
        .all(|r| r.failure_reason() == "succeeded but no matching event found"));
}

#[tokio::test]
async fn one_failed_trial_does_not_stop_the_matrix() {
    let plan = ExperimentPlan {
        repeats: RepeatCounts {
            baseline: 1,
            static_mode: 0,
            behavior_off: 0,
        },
        ..ExperimentPlan::default()
    };
    let ledger = ScriptedLedger::new();
    // Second trial's reset fails; the rest proceed.
    ledger
        .push("resetAll", Ok(receipt("resetAll", vec![])))
        .push("resetAll", Err(LedgerError::Transport("timeout".into())));
    ledger.push("performMatching", Ok(receipt("performMatching", vec![matched(1_050_000)])));

    let experiment = Experiment::new(&ledger, &plan, GasPolicy::default());
    let outcome = experiment.run(&mut MemorySink).await.unwrap();

    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.errors, 1);
    assert!(outcome.records[1].is_error());
    assert_eq!(outcome.records[0].settled_price(), Some(105.0));
    assert_eq!(outcome.successes, 1);
    // Each trial performs its own reset.
    let resets = ledger.functions().iter().filter(|f| **f == "resetAll").count();
    assert_eq!(resets, 6);
}

#[tokio::test]
async fn smoke_test_walks_every_operation() {
    let ledger = ScriptedLedger::new();
    ledger.push("performMatching", Ok(receipt("performMatching", vec![matched(1_000_000)])));
    let report = smoke_test(&ledger, GasPolicy::default()).await.unwrap();

    assert_eq!(report.block_number, 17);
    assert_eq!(report.matched_price, Some(100.0));
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
    let calls = ledger.calls();
    assert_eq!(calls[3].args[1], serde_json::json!(1_000_000));
    assert_eq!(calls[3].args[2], serde_json::json!(7_500));
    assert_eq!(calls[5].args[5], serde_json::json!(0));
}

#[tokio::test]
async fn smoke_failure_is_fatal() {
    let ledger = ScriptedLedger::new();
    ledger.push("addBuyer", Err(LedgerError::Reverted { tx_hash: "0x1".into() }));
    let err = smoke_test(&ledger, GasPolicy::default()).await.unwrap_err();
    assert!(err.to_string().contains("add buyer"));
}

#[tokio::test]
async fn unreachable_ledger_fails_connectivity() {
    let ledger = ScriptedLedger::unreachable();
    assert!(connectivity_check(&ledger).await.is_err());
    assert!(smoke_test(&ledger, GasPolicy::default()).await.is_err());
    assert!(ledger.functions().is_empty());
}

#[tokio::test]
async fn file_sink_and_store_agree_on_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let plan = ExperimentPlan::default();
    let ledger = ScriptedLedger::new();
    for price in [1_050_000, 990_000, 1_200_000] {
        ledger.push("performMatching", Ok(receipt("performMatching", vec![matched(price)])));
    }
    let mut store = ResultStore::new(dir.path().join("results.sqlite").to_str().unwrap()).unwrap();
    store.init().unwrap();
    let manifest = RunManifest {
        run_id: "run_test".into(),
        started_at: "2026-01-01T00:00:00Z".into(),
        ledger_kind: "scripted".into(),
        ledger_url: String::new(),
        block_number: Some(17),
        planned_trials: plan.total_trials(),
        plan_hash: "deadbeef".into(),
    };
    let mut sink = FileSink::create(dir.path(), &manifest, Some(store)).unwrap();
    let outcome = Experiment::new(&ledger, &plan, GasPolicy::default())
        .run(&mut sink)
        .await
        .unwrap();
    assert_eq!(outcome.successes, 3);

    let check = ResultStore::new(dir.path().join("results.sqlite").to_str().unwrap()).unwrap();
    assert_eq!(check.trial_count("run_test").unwrap(), 24);
    let from_sql = check.aggregate("run_test").unwrap();
    assert_eq!(from_sql.len(), outcome.summary.len());
    for (a, b) in from_sql.iter().zip(outcome.summary.iter()) {
        assert_eq!(a.scenario_id, b.scenario_id);
        assert_eq!(a.mode, b.mode);
        assert_eq!(a.trials, b.trials);
        assert!((a.success_rate - b.success_rate).abs() < 1e-12);
        assert_eq!(a.mean_pdr.is_some(), b.mean_pdr.is_some());
    }
    assert!(sink.results_path().exists());
    assert!(sink.summary_path().exists());
}
