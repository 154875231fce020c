use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::scenario::PricingMode;
use crate::traders::{BuyerParams, SellerParams};

pub mod fixed;
mod http;
mod null;
pub mod retry;

pub use http::HttpLedger;
pub use null::NullLedger;
pub use retry::{GasPolicy, LedgerSession};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The node refused the request because it asked for more gas (or
    /// another bounded resource) than a block allows.
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
    #[error("no receipt for {tx_hash} after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Decode(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    pub id: String,
    /// P_off, fixed-point
    pub reference_price: u64,
    /// Q_p, fixed-point
    pub quality_index: u64,
    pub period: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRegistration {
    pub id: String,
    pub reserve_price: u64,
    pub initial_offer: u64,
    pub concession_rate: u64,
    pub flexibility: u64,
    pub product_id: String,
    pub listing_limit: u32,
}

impl SellerRegistration {
    pub fn new(id: &str, params: &SellerParams, product_id: &str, listing_limit: u32) -> Self {
        Self {
            id: id.to_string(),
            reserve_price: fixed::to_fixed(params.reserve_price),
            initial_offer: fixed::to_fixed(params.initial_offer),
            concession_rate: fixed::to_fixed(params.concession_rate),
            flexibility: fixed::to_fixed(params.flexibility),
            product_id: product_id.to_string(),
            listing_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerRegistration {
    pub id: String,
    pub reserve_price: u64,
    pub initial_offer: u64,
    pub concession_rate: u64,
    pub flexibility: u64,
    pub quality_threshold: u64,
}

impl BuyerRegistration {
    pub fn new(id: &str, params: &BuyerParams) -> Self {
        Self {
            id: id.to_string(),
            reserve_price: fixed::to_fixed(params.reserve_price),
            initial_offer: fixed::to_fixed(params.initial_offer),
            concession_rate: fixed::to_fixed(params.concession_rate),
            flexibility: fixed::to_fixed(params.flexibility),
            quality_threshold: fixed::to_fixed(params.quality_threshold),
        }
    }
}

/// One state-changing contract operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    ResetAll,
    /// Empty filter resets every seller.
    ResetMatchingState { seller: String },
    SetPricingMode(PricingMode),
    AddProduct(ProductListing),
    AddSeller(SellerRegistration),
    AddBuyer(BuyerRegistration),
    PerformMatching,
}

impl LedgerCall {
    /// Contract function name.
    pub fn function(&self) -> &'static str {
        match self {
            LedgerCall::ResetAll => "resetAll",
            LedgerCall::ResetMatchingState { .. } => "resetMatchingState",
            LedgerCall::SetPricingMode(_) => "setPricingMode",
            LedgerCall::AddProduct(_) => "addProduct",
            LedgerCall::AddSeller(_) => "addSeller",
            LedgerCall::AddBuyer(_) => "addBuyer",
            LedgerCall::PerformMatching => "performMatching",
        }
    }

    /// Positional arguments in contract order.
    pub fn args(&self) -> Vec<Value> {
        match self {
            LedgerCall::ResetAll | LedgerCall::PerformMatching => vec![],
            LedgerCall::ResetMatchingState { seller } => vec![json!(seller)],
            LedgerCall::SetPricingMode(mode) => vec![json!(mode.code())],
            LedgerCall::AddProduct(p) => vec![
                json!(p.id),
                json!(p.reference_price),
                json!(p.quality_index),
                json!(p.period),
            ],
            LedgerCall::AddSeller(s) => vec![
                json!(s.id),
                json!(s.reserve_price),
                json!(s.initial_offer),
                json!(s.concession_rate),
                json!(s.flexibility),
                json!(s.product_id),
                json!(s.listing_limit),
            ],
            LedgerCall::AddBuyer(b) => vec![
                json!(b.id),
                json!(b.reserve_price),
                json!(b.initial_offer),
                json!(b.concession_rate),
                json!(b.flexibility),
                json!(b.quality_threshold),
            ],
        }
    }
}

/// Summary event: the ledger settled a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    pub buyer_id: String,
    pub seller_id: String,
    /// fixed-point
    pub price: u64,
}

/// Diagnostic event: per-check flags for the attempted match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedDetailEvent {
    pub buyer_id: String,
    pub seller_id: String,
    pub quality_passed: bool,
    pub reserve_price_valid: bool,
    pub price_range: bool,
    pub deal_success: bool,
    /// fixed-point
    pub deal_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "args")]
pub enum LedgerEvent {
    Matched(MatchedEvent),
    MatchedDetail(MatchedDetailEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub gas_used: u64,
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    pub fn matched(&self) -> Option<&MatchedEvent> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::Matched(m) => Some(m),
            _ => None,
        })
    }

    pub fn matched_detail(&self) -> Option<&MatchedDetailEvent> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::MatchedDetail(d) => Some(d),
            _ => None,
        })
    }
}

/// Narrow submit-and-await surface of the remote ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Submit one operation with the given gas budget and wait for its
    /// receipt.
    async fn submit(&self, call: &LedgerCall, gas_limit: u64) -> Result<Receipt, LedgerError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerKind {
    Http,
    Null,
}

impl LedgerKind {
    /// `None` for anything that is not a known mode name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(LedgerKind::Http),
            "null" | "dry" | "dry-run" => Some(LedgerKind::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Http => "http",
            LedgerKind::Null => "null",
        }
    }

    pub fn build(self, cfg: &crate::config::Config) -> anyhow::Result<Box<dyn Ledger>> {
        match self {
            LedgerKind::Http => Ok(Box::new(HttpLedger::new(cfg)?)),
            LedgerKind::Null => Ok(Box::new(NullLedger::new())),
        }
    }
}
