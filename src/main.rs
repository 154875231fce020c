use anyhow::Result;
use serde_json::json;

use datamatch_lab::config::Config;
use datamatch_lab::experiment::{connectivity_check, smoke_test, Experiment};
use datamatch_lab::ledger::Ledger;
use datamatch_lab::logging::{self, log, obj, params_hash, v_str, Domain, Level};
use datamatch_lab::report::{render_summary, FileSink, RunManifest};
use datamatch_lab::storage::ResultStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    let plan = cfg.plan();
    let ledger: Box<dyn Ledger> = cfg.ledger_kind.build(&cfg)?;
    let ledger = ledger.as_ref();

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("ledger", v_str(cfg.ledger_kind.as_str())),
            ("url", v_str(cfg.ledger_url.as_str())),
            ("planned_trials", json!(plan.total_trials())),
        ]),
    );

    // Connectivity and smoke failures abort the whole run.
    let block_number = if cfg.skip_smoke {
        connectivity_check(ledger).await?
    } else {
        let smoke = smoke_test(ledger, cfg.gas_policy()).await?;
        println!("smoke test passed (block {}, matched price {:?})", smoke.block_number, smoke.matched_price);
        smoke.block_number
    };

    std::fs::create_dir_all(&cfg.output_dir)?;
    let mut store = ResultStore::new(&cfg.sqlite_path)?;
    store.init()?;

    let manifest = RunManifest {
        run_id: logging::run_id(),
        started_at: logging::ts_now(),
        ledger_kind: cfg.ledger_kind.as_str().to_string(),
        ledger_url: cfg.ledger_url.to_string(),
        block_number: Some(block_number),
        planned_trials: plan.total_trials(),
        plan_hash: params_hash(&serde_json::to_string(&plan)?),
    };
    let mut sink = FileSink::create(std::path::Path::new(&cfg.output_dir), &manifest, Some(store))?;

    println!("\nstarting experiment: {} trials", plan.total_trials());
    let outcome = Experiment::new(ledger, &plan, cfg.gas_policy()).run(&mut sink).await?;

    if outcome.summary.is_empty() {
        println!("experiment finished without results");
    } else {
        println!("\nscenario summary written to {}", sink.summary_path().display());
        println!("{}", render_summary(&outcome.summary));
    }
    println!(
        "{} trials, {} matched, {} errored, {:.2}s total",
        outcome.records.len(),
        outcome.successes,
        outcome.errors,
        outcome.duration_secs
    );
    Ok(())
}
