//! Result exports and per-cell aggregates.
//!
//! Output layout under `OUTPUT_DIR`:
//! ```text
//! <run_id>/manifest.json                 run metadata
//! <run_id>/trials.jsonl                  one record per line, append-only
//! experiment_results_<ts>.csv            flat rows
//! scenario_performance_<ts>.csv          grouped by (scenario, mode)
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::record::{TrialRecord, TrialRow};
use crate::storage::ResultStore;

/// Aggregate for one (scenario id, pricing mode) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: String,
    pub mode: String,
    pub success_rate: f64,
    pub trials: u32,
    /// Means skip trials without a settled price; `None` if none settled.
    pub mean_pdr: Option<f64>,
    pub mean_sdf: Option<f64>,
    pub mean_ece: Option<f64>,
    pub mean_total_gas: f64,
    pub mean_match_time: f64,
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values.flatten().fold((0.0, 0u32), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Group by (scenario id, mode), sorted by key.
pub fn summarize(records: &[TrialRecord]) -> Vec<ScenarioSummary> {
    let mut groups: BTreeMap<(String, String), Vec<TrialRow>> = BTreeMap::new();
    for r in records {
        let row = r.to_row();
        groups.entry((row.test_id.clone(), row.mode.clone())).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|((scenario_id, mode), rows)| {
            let n = rows.len() as f64;
            ScenarioSummary {
                scenario_id,
                mode,
                success_rate: rows.iter().map(|r| r.match_success as f64).sum::<f64>() / n,
                trials: rows.len() as u32,
                mean_pdr: mean_of(rows.iter().map(|r| r.pdr)),
                mean_sdf: mean_of(rows.iter().map(|r| r.sdf)),
                mean_ece: mean_of(rows.iter().map(|r| r.ece)),
                mean_total_gas: rows.iter().map(|r| r.total_gas as f64).sum::<f64>() / n,
                mean_match_time: rows.iter().map(|r| r.match_time).sum::<f64>() / n,
            }
        })
        .collect()
}

// =============================================================================
// CSV
// =============================================================================

pub const TRIAL_COLUMNS: [&str; 29] = [
    "test_id", "repeat_idx", "mode", "market", "quality", "seed", "P_off", "Q_p", "M_d",
    "P_res_s", "P_res_b", "p_0_s", "p_0_b", "offchain_time", "gas_add_product",
    "gas_add_seller", "gas_add_buyer", "gas_matching", "total_gas", "match_time",
    "match_success", "failure_reason", "P_on", "PDR", "SDF", "ECE", "buyer_id", "seller_id",
    "error_stage",
];

pub const SUMMARY_COLUMNS: [&str; 9] = [
    "scenario_id", "mode", "mean_success_rate", "trial_count", "mean_pdr", "mean_sdf",
    "mean_ece", "mean_total_gas", "mean_match_time",
];

/// Quote a field if it contains a delimiter, quote or newline.
pub fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn opt_f(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn opt_s(v: &Option<String>) -> String {
    v.as_deref().map(csv_field).unwrap_or_default()
}

pub fn trial_csv_line(r: &TrialRow) -> String {
    [
        csv_field(&r.test_id),
        r.repeat_idx.to_string(),
        r.mode.clone(),
        r.market.clone(),
        r.quality.clone(),
        r.seed.map(|s| s.to_string()).unwrap_or_default(),
        opt_f(r.p_off.map(|p| (p * 100.0).round() / 100.0)),
        opt_f(r.q_p),
        opt_f(r.m_d),
        opt_f(r.p_res_s),
        opt_f(r.p_res_b),
        opt_f(r.p_0_s),
        opt_f(r.p_0_b),
        format!("{:.4}", r.offchain_time),
        r.gas_add_product.to_string(),
        r.gas_add_seller.to_string(),
        r.gas_add_buyer.to_string(),
        r.gas_matching.to_string(),
        r.total_gas.to_string(),
        format!("{:.4}", r.match_time),
        r.match_success.to_string(),
        csv_field(&r.failure_reason),
        opt_f(r.p_on),
        opt_f(r.pdr),
        opt_f(r.sdf),
        opt_f(r.ece),
        opt_s(&r.buyer_id),
        opt_s(&r.seller_id),
        opt_s(&r.error_stage),
    ]
    .join(",")
}

pub fn summary_csv_line(s: &ScenarioSummary) -> String {
    [
        csv_field(&s.scenario_id),
        s.mode.clone(),
        s.success_rate.to_string(),
        s.trials.to_string(),
        opt_f(s.mean_pdr),
        opt_f(s.mean_sdf),
        opt_f(s.mean_ece),
        s.mean_total_gas.to_string(),
        s.mean_match_time.to_string(),
    ]
    .join(",")
}

pub fn write_trials_csv(path: &Path, records: &[TrialRecord]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", TRIAL_COLUMNS.join(","))?;
    for r in records {
        writeln!(w, "{}", trial_csv_line(&r.to_row()))?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, summary: &[ScenarioSummary]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", SUMMARY_COLUMNS.join(","))?;
    for s in summary {
        writeln!(w, "{}", summary_csv_line(s))?;
    }
    w.flush()?;
    Ok(())
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string())
}

/// Fixed-width summary table, two decimals.
pub fn render_summary(summary: &[ScenarioSummary]) -> String {
    let mut out = format!(
        "{:<6} {:<13} {:>8} {:>6} {:>8} {:>8} {:>8} {:>12} {:>10}\n",
        "scen", "mode", "success", "n", "PDR", "SDF", "ECE", "gas", "match_s"
    );
    for s in summary {
        out.push_str(&format!(
            "{:<6} {:<13} {:>8.2} {:>6} {:>8} {:>8} {:>8} {:>12.2} {:>10.2}\n",
            s.scenario_id,
            s.mode,
            s.success_rate,
            s.trials,
            fmt_opt(s.mean_pdr),
            fmt_opt(s.mean_sdf),
            fmt_opt(s.mean_ece),
            s.mean_total_gas,
            s.mean_match_time,
        ));
    }
    out
}

// =============================================================================
// Sink
// =============================================================================

/// Receives records as trials finish and the full collection at the end.
pub trait ReportSink {
    fn append(&mut self, record: &TrialRecord) -> Result<()>;
    fn finish(&mut self, records: &[TrialRecord]) -> Result<Vec<ScenarioSummary>>;
}

/// Collects nothing; returns the in-memory aggregate.
pub struct MemorySink;

impl ReportSink for MemorySink {
    fn append(&mut self, _record: &TrialRecord) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, records: &[TrialRecord]) -> Result<Vec<ScenarioSummary>> {
        Ok(summarize(records))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: String,
    pub ledger_kind: String,
    pub ledger_url: String,
    pub block_number: Option<u64>,
    pub planned_trials: u32,
    /// Fingerprint of the scenario/market/quality tables.
    pub plan_hash: String,
}

/// CSV + JSONL + SQLite.
pub struct FileSink {
    out_dir: PathBuf,
    run_id: String,
    timestamp: String,
    trials: BufWriter<File>,
    store: Option<ResultStore>,
}

impl FileSink {
    pub fn create(out_dir: &Path, manifest: &RunManifest, store: Option<ResultStore>) -> Result<Self> {
        let run_dir = out_dir.join(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;
        serde_json::to_writer_pretty(File::create(run_dir.join("manifest.json"))?, manifest)?;
        let trials = OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_dir.join("trials.jsonl"))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            run_id: manifest.run_id.clone(),
            timestamp: chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string(),
            trials: BufWriter::new(trials),
            store,
        })
    }

    pub fn results_path(&self) -> PathBuf {
        self.out_dir.join(format!("experiment_results_{}.csv", self.timestamp))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.out_dir.join(format!("scenario_performance_{}.csv", self.timestamp))
    }
}

impl ReportSink for FileSink {
    fn append(&mut self, record: &TrialRecord) -> Result<()> {
        writeln!(self.trials, "{}", serde_json::to_string(record)?)?;
        self.trials.flush()?;
        if let Some(store) = self.store.as_mut() {
            store.persist_trial(&self.run_id, &record.to_row())?;
        }
        Ok(())
    }

    fn finish(&mut self, records: &[TrialRecord]) -> Result<Vec<ScenarioSummary>> {
        self.trials.flush()?;
        let summary = summarize(records);
        let results = self.results_path();
        write_trials_csv(&results, records)?;
        let perf = self.summary_path();
        if !summary.is_empty() {
            write_summary_csv(&perf, &summary)?;
        }
        if let Some(store) = self.store.as_mut() {
            store.persist_summary(&self.run_id, &summary)?;
        }
        log(
            Level::Info,
            Domain::Report,
            "report.written",
            obj(&[
                ("results", v_str(&results.to_string_lossy())),
                ("summary", v_str(&perf.to_string_lossy())),
                ("cells", serde_json::json!(summary.len())),
            ]),
        );
        Ok(summary)
    }
}
