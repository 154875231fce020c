//! Structured JSON-lines logging for experiment runs.
//!
//! Every process gets a run directory (`$LOG_DIR/$RUN_ID`, default
//! `out/runs/r-<epoch_ms>-<pid>`) holding:
//! - `manifest.json`: run id, pid, start time
//! - `events.jsonl`: info and above
//! - `trace.jsonl`: trace/debug (ledger calls, profiling)
//!
//! Filtering: `LOG_LEVEL` (default info) and `LOG_DOMAINS` (comma list or
//! `all`). Warnings and above are mirrored to stdout; `LOG_STDOUT=1` mirrors
//! info as well, `LOG_STDOUT=0` silences the mirror.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::record::{TrialOutcome, TrialRecord};

// =============================================================================
// Levels and domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Experiment, // Matrix progress, smoke check
    Trial,      // Per-trial lifecycle and outcome
    Ledger,     // Submissions, receipts, retries
    Report,     // Exports and aggregates
    System,     // Startup, config
    Profile,    // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Experiment => "experiment",
            Domain::Trial => "trial",
            Domain::Ledger => "ledger",
            Domain::Report => "report",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

struct RunContext {
    run_id: String,
    /// Lowest level mirrored to stdout.
    stdout: Option<Level>,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let run_dir = PathBuf::from(base).join(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );
        RunContext {
            stdout: stdout_threshold(std::env::var("LOG_STDOUT").ok().as_deref()),
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn stdout_threshold(setting: Option<&str>) -> Option<Level> {
    match setting {
        None => Some(Level::Warn),
        Some("0") | Some("off") => None,
        Some(_) => Some(Level::Info),
    }
}

/// Id of this process's log run.
pub fn run_id() -> String {
    ensure_run_context().run_id.clone()
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(w) = writer {
        if let Ok(mut w) = w.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let ctx = ensure_run_context();
    let mut fields = fields;
    let msg = fields.remove("msg").unwrap_or(Value::String(String::new()));

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if ctx.stdout.map_or(false, |min| level >= min) {
        println!("{}", line);
    }
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_trial_start(scenario_id: &str, mode: &str, repeat: u32) {
    log(
        Level::Debug,
        Domain::Trial,
        "trial.start",
        obj(&[
            ("scenario_id", v_str(scenario_id)),
            ("mode", v_str(mode)),
            ("repeat", json!(repeat)),
        ]),
    );
}

/// Structured outcome plus the one-line human summary.
pub fn log_trial_outcome(record: &TrialRecord) {
    let label = format!("{}-{}", record.id.scenario_id, record.id.repeat);
    let (level, status) = match &record.outcome {
        TrialOutcome::Success { .. } => (Level::Info, "success"),
        TrialOutcome::Failure { .. } => (Level::Info, "failure"),
        TrialOutcome::Error { .. } => (Level::Warn, "error"),
    };
    log(
        level,
        Domain::Trial,
        "trial.done",
        obj(&[
            ("scenario_id", v_str(&record.id.scenario_id)),
            ("mode", v_str(record.id.mode.as_str())),
            ("repeat", json!(record.id.repeat)),
            ("status", v_str(status)),
            ("total_gas", json!(record.gas.total())),
            ("match_secs", v_num(record.timing.match_secs)),
            ("settled_price", record.settled_price().map(v_num).unwrap_or(Value::Null)),
            ("reason", v_str(&record.failure_reason())),
        ]),
    );
    match &record.outcome {
        TrialOutcome::Error { message, .. } => {
            println!("Test {} [{}] failed: {}", label, record.id.mode.as_str(), message)
        }
        _ => println!(
            "Test {} [{}] completed. Success: {}",
            label,
            record.id.mode.as_str(),
            record.match_success()
        ),
    }
}

pub fn log_ledger_op(function: &str, gas_used: Option<u64>, elapsed_ms: f64, error: Option<&str>) {
    let level = if error.is_some() { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Ledger,
        "ledger.submit",
        obj(&[
            ("function", v_str(function)),
            ("gas_used", gas_used.map(|g| json!(g)).unwrap_or(Value::Null)),
            ("elapsed_ms", v_num(elapsed_ms)),
            ("error", error.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_ledger_retry(function: &str, gas_limit: u64, fallback: u64, reason: &str) {
    log(
        Level::Warn,
        Domain::Ledger,
        "ledger.retry_reduced_gas",
        obj(&[
            ("function", v_str(function)),
            ("gas_limit", json!(gas_limit)),
            ("fallback", json!(fallback)),
            ("reason", v_str(reason)),
        ]),
    );
}

// =============================================================================
// Utilities
// =============================================================================

/// Short SHA-256 fingerprint, hex encoded.
pub fn params_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

/// Emits elapsed time on drop.
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        log(
            Level::Trace,
            Domain::Profile,
            "profile",
            obj(&[("label", v_str(self.label)), ("elapsed_ms", v_num(elapsed_ms))]),
        );
    }
}
