//! JSON-RPC 2.0 client for a contract gateway node.
//!
//! The gateway owns the ABI: it accepts `contract_send` with a function
//! name and positional arguments, and serves receipts whose logs are already
//! decoded into `{event, args}` objects.
//!
//! Methods used:
//! - `eth_blockNumber` -> hex quantity
//! - `contract_send [{contract, from, function, args, gas}]` -> tx hash
//! - `contract_getReceipt [txHash]` -> receipt or null while pending

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use url::Url;

use crate::config::Config;
use crate::ledger::{Ledger, LedgerCall, LedgerError, LedgerEvent, Receipt};

/// Node error texts that mean "ask for less".
const RESOURCE_MARKERS: [&str; 3] = [
    "exceeds block gas limit",
    "gas limit reached",
    "intrinsic gas too high",
];

pub struct HttpLedger {
    client: Client,
    endpoint: Url,
    contract: String,
    account: String,
    poll: Duration,
    receipt_timeout: Duration,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    gas_used: Value,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    event: String,
    #[serde(default)]
    args: Value,
}

impl HttpLedger {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::new(),
            endpoint: cfg.ledger_url.clone(),
            contract: cfg.contract_address.clone(),
            account: cfg.account.clone(),
            poll: Duration::from_millis(cfg.receipt_poll_ms),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_secs),
            next_id: AtomicU64::new(1),
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("HTTP {}: {}", status, text)));
        }
        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
        if let Some(err) = parsed.error {
            return Err(classify_rpc_error(err.code, err.message));
        }
        Ok(parsed.result)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<RawReceipt, LedgerError> {
        let started = Instant::now();
        loop {
            let receipt: Option<RawReceipt> = self.rpc("contract_getReceipt", json!([tx_hash])).await?;
            if let Some(r) = receipt {
                return Ok(r);
            }
            if started.elapsed() >= self.receipt_timeout {
                return Err(LedgerError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            sleep(self.poll).await;
        }
    }
}

fn classify_rpc_error(code: i64, message: String) -> LedgerError {
    let lower = message.to_lowercase();
    if RESOURCE_MARKERS.iter().any(|m| lower.contains(m)) {
        LedgerError::ResourceExceeded(message)
    } else {
        LedgerError::Rpc { code, message }
    }
}

/// Accepts `"0x1a"`, `"26"` or `26`.
fn parse_quantity(v: &Value) -> Result<u64, LedgerError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| LedgerError::Decode(format!("not a u64 quantity: {}", n))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| LedgerError::Decode(format!("bad quantity {:?}: {}", s, e)))
        }
        other => Err(LedgerError::Decode(format!("unexpected quantity {}", other))),
    }
}

fn decode_receipt(raw: RawReceipt) -> Result<Receipt, LedgerError> {
    if let Some(status) = &raw.status {
        if parse_quantity(status)? == 0 {
            return Err(LedgerError::Reverted {
                tx_hash: raw.transaction_hash,
            });
        }
    }
    let mut events = Vec::new();
    for log in raw.logs {
        // Other contract events are not ours to interpret.
        if log.event != "Matched" && log.event != "MatchedDetail" {
            continue;
        }
        let tagged = json!({ "event": log.event, "args": log.args });
        events.push(serde_json::from_value::<LedgerEvent>(tagged)?);
    }
    Ok(Receipt {
        gas_used: parse_quantity(&raw.gas_used)?,
        tx_hash: raw.transaction_hash,
        events,
    })
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        let v: Option<Value> = self.rpc("eth_blockNumber", json!([])).await?;
        let v = v.ok_or_else(|| LedgerError::Decode("empty eth_blockNumber result".into()))?;
        parse_quantity(&v)
    }

    async fn submit(&self, call: &LedgerCall, gas_limit: u64) -> Result<Receipt, LedgerError> {
        let params = json!([{
            "contract": self.contract,
            "from": self.account,
            "function": call.function(),
            "args": call.args(),
            "gas": format!("0x{:x}", gas_limit),
        }]);
        let tx_hash: Option<String> = self.rpc("contract_send", params).await?;
        let tx_hash = tx_hash.ok_or_else(|| LedgerError::Decode("contract_send returned no hash".into()))?;
        let raw = self.wait_for_receipt(&tx_hash).await?;
        decode_receipt(raw)
    }
}
