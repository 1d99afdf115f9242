//! Scoring parsed payment facts against the orders awaiting payment. The rules are an
//! explicit, ordered list so each one is independently testable; the first satisfied rule
//! wins, and ambiguity is surfaced rather than resolved by guessing.

use chrono::{DateTime, Utc};
use log::debug;
use rve_common::MoneyAmount;

use crate::{
    config::VerifyConfig,
    types::{OrderId, ParsedFields, PendingOrder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBasis {
    /// The parsed transaction id equals the order's stored payment reference.
    Reference,
    /// The amount matched exactly one order inside its validity window.
    AmountAndRecency,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched { order: PendingOrder, basis: MatchBasis },
    /// An order matched on amount or reference, but the parsed currency contradicts it.
    CurrencyMismatch { order: PendingOrder, parsed: String },
    /// The amount fits more than one eligible order.
    Ambiguous { order_ids: Vec<OrderId> },
    NoMatch,
}

/// Matches parsed fields against a snapshot of candidate orders. Candidates that are no longer
/// awaiting payment, or whose expiry has passed at `now`, are never matched.
pub fn match_order(
    fields: &ParsedFields,
    candidates: &[PendingOrder],
    now: DateTime<Utc>,
    config: &VerifyConfig,
) -> MatchOutcome {
    let eligible: Vec<&PendingOrder> =
        candidates.iter().filter(|o| o.is_awaiting_payment() && !o.has_expired(now)).collect();

    // Rule 1: exact reference match.
    if let (Some(txid), Some(amount)) = (&fields.txid, &fields.amount) {
        if let Some(order) = eligible
            .iter()
            .find(|o| o.reference.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(&txid.value)))
        {
            if let Some(parsed) = currency_conflict(fields, order) {
                return MatchOutcome::CurrencyMismatch { order: (*order).clone(), parsed };
            }
            if within_tolerance(amount.value, order.amount, config) {
                debug!("🧾 Reference {} pins submission to order {}", txid.value, order.order_id);
                return MatchOutcome::Matched { order: (*order).clone(), basis: MatchBasis::Reference };
            }
            // Reference hit with a wrong amount falls through to the amount rules; the
            // reference may have been misread from another line.
        }
    }

    // Rule 2: amount + recency.
    let Some(amount) = &fields.amount else {
        return MatchOutcome::NoMatch;
    };
    let mut currency_clash: Option<(&PendingOrder, String)> = None;
    let mut hits: Vec<&PendingOrder> = Vec::new();
    for order in eligible.iter().copied() {
        if !within_tolerance(amount.value, order.amount, config) {
            continue;
        }
        if let Some(parsed) = currency_conflict(fields, order) {
            currency_clash.get_or_insert((order, parsed));
            continue;
        }
        if let Some(date) = &fields.paid_date {
            let window_start = order.created_at.date_naive();
            let window_end = (order.expires_at + config.date_grace).date_naive();
            if date.value < window_start || date.value > window_end {
                continue;
            }
        }
        hits.push(order);
    }

    match hits.len() {
        1 => MatchOutcome::Matched { order: hits[0].clone(), basis: MatchBasis::AmountAndRecency },
        0 => match currency_clash {
            Some((order, parsed)) => MatchOutcome::CurrencyMismatch { order: order.clone(), parsed },
            None => MatchOutcome::NoMatch,
        },
        n => {
            debug!("🧾 Amount {} is ambiguous across {n} orders", amount.value);
            MatchOutcome::Ambiguous { order_ids: hits.iter().map(|o| o.order_id.clone()).collect() }
        },
    }
}

/// The effective tolerance is the larger of the absolute and the percentage tolerance, so
/// small orders keep a one-kopeck guard while large ones absorb proportional OCR noise.
fn within_tolerance(parsed: MoneyAmount, expected: MoneyAmount, config: &VerifyConfig) -> bool {
    #[allow(clippy::cast_precision_loss)]
    let relative = (expected.value() as f64 * config.amount_tolerance_pct / 100.0).round() as i64;
    let tolerance = config.amount_tolerance_minor.max(relative);
    parsed.abs_diff(expected) <= tolerance
}

fn currency_conflict(fields: &ParsedFields, order: &PendingOrder) -> Option<String> {
    match &fields.currency {
        Some(parsed) if !parsed.eq_ignore_ascii_case(&order.currency) => Some(parsed.clone()),
        _ => None,
    }
}
