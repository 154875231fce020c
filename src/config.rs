use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::ledger::{GasPolicy, LedgerKind};
use crate::scenario::{ExperimentPlan, RepeatCounts};

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_kind: LedgerKind,
    pub ledger_url: Url,
    pub contract_address: String,
    pub account: String,
    pub gas_limit: u64,
    pub gas_fallback: u64,
    pub receipt_poll_ms: u64,
    pub receipt_timeout_secs: u64,
    pub output_dir: String,
    pub sqlite_path: String,
    pub skip_smoke: bool,
    pub repeats: RepeatCounts,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unknown ledger modes and malformed
    /// endpoints are rejected; unparsable numbers fall back to defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self> {
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        fn parsed<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
            raw.and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        let mode = or("LEDGER_MODE", "http");
        let ledger_kind =
            LedgerKind::parse(&mode).ok_or_else(|| anyhow!("LEDGER_MODE must be http or null, got {:?}", mode))?;
        let raw_url = or("LEDGER_URL", "http://127.0.0.1:7545");
        let ledger_url = Url::parse(&raw_url).with_context(|| format!("invalid LEDGER_URL {:?}", raw_url))?;

        let defaults = RepeatCounts::default();
        Ok(Self {
            ledger_kind,
            ledger_url,
            contract_address: or("LEDGER_CONTRACT", "0x9303001B46Fd74da139387A746e8bb798e812526"),
            account: or("LEDGER_ACCOUNT", ""),
            gas_limit: parsed(get("GAS_LIMIT"), 8_000_000),
            gas_fallback: parsed(get("GAS_FALLBACK"), 3_000_000),
            receipt_poll_ms: parsed(get("RECEIPT_POLL_MS"), 200),
            receipt_timeout_secs: parsed(get("RECEIPT_TIMEOUT_SECS"), 120),
            output_dir: or("OUTPUT_DIR", "output"),
            sqlite_path: or("SQLITE_PATH", "output/experiment.sqlite"),
            skip_smoke: parsed(get("SKIP_SMOKE"), false),
            repeats: RepeatCounts {
                baseline: parsed(get("REPEAT_BASELINE"), defaults.baseline),
                static_mode: parsed(get("REPEAT_STATIC"), defaults.static_mode),
                behavior_off: parsed(get("REPEAT_BEHAVIOR_OFF"), defaults.behavior_off),
            },
        })
    }

    pub fn gas_policy(&self) -> GasPolicy {
        GasPolicy {
            limit: self.gas_limit,
            fallback: self.gas_fallback,
        }
    }

    /// Default tables with the configured repeat counts.
    pub fn plan(&self) -> ExperimentPlan {
        ExperimentPlan {
            repeats: self.repeats,
            ..ExperimentPlan::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.ledger_kind, LedgerKind::Http);
        assert_eq!(cfg.ledger_url.as_str(), "http://127.0.0.1:7545/");
        assert_eq!(cfg.gas_policy(), GasPolicy::default());
        assert!(!cfg.skip_smoke);
    }

    #[test]
    fn unknown_ledger_mode_is_rejected() {
        let err = Config::from_lookup(lookup(&[("LEDGER_MODE", "nul")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_MODE"));
        let cfg = Config::from_lookup(lookup(&[("LEDGER_MODE", "null")])).unwrap();
        assert_eq!(cfg.ledger_kind, LedgerKind::Null);
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        let err = Config::from_lookup(lookup(&[("LEDGER_URL", "127.0.0.1 port 7545")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_URL"));
    }

    #[test]
    fn plan_uses_configured_repeats() {
        let cfg = Config::from_lookup(lookup(&[
            ("REPEAT_BASELINE", "3"),
            ("REPEAT_STATIC", "0"),
            ("REPEAT_BEHAVIOR_OFF", "1"),
        ]))
        .unwrap();
        let plan = cfg.plan();
        assert_eq!(plan.total_trials(), 6 * 4);
        assert_eq!(plan.scenarios.len(), 6);
    }

    #[test]
    fn gas_policy_mirrors_config() {
        let cfg = Config::from_lookup(lookup(&[("GAS_LIMIT", "100"), ("GAS_FALLBACK", "50")])).unwrap();
        assert_eq!(cfg.gas_policy(), GasPolicy { limit: 100, fallback: 50 });
    }
}
