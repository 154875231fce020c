//! Scripted in-process ledger for driving trials without a node.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use datamatch_lab::ledger::{Ledger, LedgerCall, LedgerError, LedgerEvent, Receipt};

#[derive(Debug, Clone)]
pub struct Call {
    pub function: &'static str,
    pub args: Vec<Value>,
    pub gas_limit: u64,
}

/// Answers each contract function from a per-function queue; an empty
/// queue answers with a plain receipt using the default gas for that
/// function.
pub struct ScriptedLedger {
    queued: Mutex<HashMap<&'static str, VecDeque<Result<Receipt, LedgerError>>>>,
    calls: Mutex<Vec<Call>>,
    block: Result<u64, LedgerError>,
}

pub fn default_gas(function: &str) -> u64 {
    match function {
        "resetAll" => 30_000,
        "resetMatchingState" => 25_000,
        "setPricingMode" => 27_000,
        "addProduct" => 120_000,
        "addSeller" => 150_000,
        "addBuyer" => 140_000,
        "performMatching" => 300_000,
        _ => 21_000,
    }
}

pub fn receipt(function: &str, events: Vec<LedgerEvent>) -> Receipt {
    Receipt {
        tx_hash: format!("0x{}", function),
        gas_used: default_gas(function),
        events,
    }
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            block: Ok(17),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            block: Err(LedgerError::Transport("connection refused".into())),
            ..Self::new()
        }
    }

    pub fn push(&self, function: &'static str, response: Result<Receipt, LedgerError>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(function)
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn functions(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.function).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.block.clone()
    }

    async fn submit(&self, call: &LedgerCall, gas_limit: u64) -> Result<Receipt, LedgerError> {
        let function = call.function();
        self.calls.lock().unwrap().push(Call {
            function,
            args: call.args(),
            gas_limit,
        });
        let next = self
            .queued
            .lock()
            .unwrap()
            .get_mut(function)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| Ok(receipt(function, vec![])))
    }
}
