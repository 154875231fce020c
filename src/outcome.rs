//! Turn a matching receipt into a classified outcome.

use crate::ledger::fixed::from_fixed;
use crate::ledger::{MatchedDetailEvent, Receipt};
use crate::metrics::{DerivedMetrics, PriceContext};
use crate::record::{EventSource, TrialOutcome};

pub const REASON_QUALITY: &str = "quality requirement not met";
pub const REASON_RESERVE_ORDER: &str = "buyer reserve price below seller reserve price";
pub const REASON_PRICE_RANGE: &str = "price outside tolerance range";
pub const REASON_NEGOTIATION: &str = "price negotiation failed";
pub const REASON_UNKNOWN: &str = "unknown failure reason";
pub const REASON_NO_EVENT: &str = "succeeded but no matching event found";

/// Failure reasons reported by a diagnostic event, in check order.
/// Negotiation failure is only blamed when every precondition passed.
pub fn failure_reasons(detail: &MatchedDetailEvent) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    if !detail.quality_passed {
        reasons.push(REASON_QUALITY);
    }
    if !detail.reserve_price_valid {
        reasons.push(REASON_RESERVE_ORDER);
    }
    if !detail.price_range {
        reasons.push(REASON_PRICE_RANGE);
    }
    if reasons.is_empty() && !detail.deal_success {
        reasons.push(REASON_NEGOTIATION);
    }
    reasons
}

pub fn classify(receipt: &Receipt, ctx: &PriceContext) -> TrialOutcome {
    if let Some(m) = receipt.matched() {
        let settled = from_fixed(m.price);
        return TrialOutcome::Success {
            settled_price: settled,
            metrics: DerivedMetrics::compute(settled, ctx),
            buyer_id: m.buyer_id.clone(),
            seller_id: m.seller_id.clone(),
            source: EventSource::Summary,
            notes: None,
        };
    }

    if let Some(d) = receipt.matched_detail() {
        let reasons = failure_reasons(d);
        if d.deal_success {
            let settled = from_fixed(d.deal_price);
            return TrialOutcome::Success {
                settled_price: settled,
                metrics: DerivedMetrics::compute(settled, ctx),
                buyer_id: d.buyer_id.clone(),
                seller_id: d.seller_id.clone(),
                source: EventSource::Diagnostic,
                notes: (!reasons.is_empty()).then(|| reasons.join("; ")),
            };
        }
        let reason = if reasons.is_empty() {
            REASON_UNKNOWN.to_string()
        } else {
            reasons.join("; ")
        };
        return TrialOutcome::Failure { reason };
    }

    TrialOutcome::Failure {
        reason: REASON_NO_EVENT.to_string(),
    }
}
