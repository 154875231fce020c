use std::time::Instant;

use crate::ledger::{
    BuyerRegistration, Ledger, LedgerCall, LedgerError, ProductListing, Receipt, SellerRegistration,
};
use crate::logging::{log_ledger_op, log_ledger_retry};
use crate::scenario::PricingMode;

/// Gas budgets for a submission and its single reduced-budget retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPolicy {
    pub limit: u64,
    pub fallback: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            limit: 8_000_000,
            fallback: 3_000_000,
        }
    }
}

/// Submit `call`; on `ResourceExceeded` retry exactly once with the
/// fallback budget. Every other error is returned untouched.
pub async fn submit_with_fallback<L: Ledger + ?Sized>(
    ledger: &L,
    policy: &GasPolicy,
    call: &LedgerCall,
) -> Result<Receipt, LedgerError> {
    match ledger.submit(call, policy.limit).await {
        Err(LedgerError::ResourceExceeded(msg)) => {
            log_ledger_retry(call.function(), policy.limit, policy.fallback, &msg);
            ledger.submit(call, policy.fallback).await
        }
        other => other,
    }
}

/// Named contract operations over a borrowed ledger client.
pub struct LedgerSession<'a, L: Ledger + ?Sized> {
    ledger: &'a L,
    policy: GasPolicy,
}

impl<'a, L: Ledger + ?Sized> LedgerSession<'a, L> {
    pub fn new(ledger: &'a L, policy: GasPolicy) -> Self {
        Self { ledger, policy }
    }

    async fn send(&self, call: LedgerCall) -> Result<Receipt, LedgerError> {
        let started = Instant::now();
        let result = submit_with_fallback(self.ledger, &self.policy, &call).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(r) => log_ledger_op(call.function(), Some(r.gas_used), elapsed_ms, None),
            Err(e) => log_ledger_op(call.function(), None, elapsed_ms, Some(&e.to_string())),
        }
        result
    }

    pub async fn reset(&self) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::ResetAll).await
    }

    /// `None` resets matching state for every seller.
    pub async fn reset_matching_state(&self, seller: Option<&str>) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::ResetMatchingState {
            seller: seller.unwrap_or_default().to_string(),
        })
        .await
    }

    pub async fn set_pricing_mode(&self, mode: PricingMode) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::SetPricingMode(mode)).await
    }

    pub async fn add_product(&self, product: &ProductListing) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::AddProduct(product.clone())).await
    }

    pub async fn add_seller(&self, seller: &SellerRegistration) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::AddSeller(seller.clone())).await
    }

    pub async fn add_buyer(&self, buyer: &BuyerRegistration) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::AddBuyer(buyer.clone())).await
    }

    pub async fn perform_matching(&self) -> Result<Receipt, LedgerError> {
        self.send(LedgerCall::PerformMatching).await
    }
}
