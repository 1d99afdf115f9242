use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    config::VerifyConfig,
    events::{EventProducers, FraudAlertEvent, OrderConfirmedEvent, VerdictEvent},
    pipeline::{match_order, normalizer, FieldParser, MatchOutcome, TextExtractor},
    rve_api::VerificationError,
    traits::{AuditSink, ClaimOutcome, FingerprintLedger, OcrEngine, OrderStore},
    types::{
        Fingerprint,
        NewPendingOrder,
        OrderId,
        OrderStatusType::{AwaitingPayment, Confirmed, Expired, Rejected, UnderReview},
        ParsedFields,
        PendingOrder,
        ReceiptSubmission,
        RejectionReason,
        ReviewReason,
        Verdict,
        VerdictRecord,
    },
};

/// `ReceiptFlowApi` is the primary API for turning receipt submissions into verdicts and
/// order-state transitions.
///
/// A submission flows through normalization, text extraction, field parsing and order
/// matching without touching any lock; the only coordination happens at the end, where the
/// fingerprint claim and the order transition are both single atomic conditional writes.
/// Whichever submission loses a race gets a deterministic rejection — never a silent drop,
/// and never two confirmations for one fingerprint.
pub struct ReceiptFlowApi<B, O> {
    db: B,
    extractor: TextExtractor<O>,
    parser: FieldParser,
    config: VerifyConfig,
    producers: EventProducers,
}

impl<B, O> Debug for ReceiptFlowApi<B, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceiptFlowApi")
    }
}

impl<B, O> ReceiptFlowApi<B, O>
where
    B: OrderStore + FingerprintLedger + AuditSink,
    O: OcrEngine,
{
    pub fn new(db: B, ocr: O, config: VerifyConfig, producers: EventProducers) -> Self {
        let extractor = TextExtractor::new(ocr, &config);
        let parser = FieldParser::new(&config);
        Self { db, extractor, parser, config, producers }
    }

    /// Runs one submission through the whole pipeline. Always terminates in exactly one
    /// verdict with an audit entry, even when the image is garbage, the recognizer is down,
    /// or the order expires mid-flight.
    pub async fn process_submission(
        &self,
        submission: ReceiptSubmission,
    ) -> Result<VerdictRecord, VerificationError> {
        debug!("🧾 Processing {submission:?}");

        let normalized = match normalizer::normalize(&submission.image, &self.config) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("🧾 Submission [{}] carries an unusable image: {e}", submission.id);
                return self
                    .settle(
                        &submission,
                        None,
                        submission.order_id.clone(),
                        ParsedFields::default(),
                        Verdict::Rejected(RejectionReason::InvalidImage),
                    )
                    .await;
            },
        };

        let text = match self.extractor.extract(&normalized).await {
            Ok(text) => text,
            Err(e) => {
                warn!("🧾 Submission [{}] could not be recognized: {e}", submission.id);
                return self
                    .settle(
                        &submission,
                        None,
                        submission.order_id.clone(),
                        ParsedFields::default(),
                        Verdict::NeedsReview(ReviewReason::OcrUnavailable),
                    )
                    .await;
            },
        };

        let fields = self.parser.parse(&text);
        let fingerprint = match &fields.txid {
            Some(txid) => Fingerprint::TxId(txid.value.clone()),
            None => Fingerprint::ImageHash(normalized.content_hash.clone()),
        };
        trace!("🧾 Submission [{}] fingerprint is {fingerprint}", submission.id);

        let (candidates, scoped) = self.candidate_orders(&submission).await?;

        // Resubmission of a proof that already settled a now-terminal order replays the
        // original verdict instead of reprocessing state.
        if let Some(order) = scoped.as_ref().filter(|o| !o.is_awaiting_payment()) {
            if let Some(original) = self.db.last_verdict_for_claim(&fingerprint, &order.order_id).await? {
                info!("🧾 Submission [{}] is an idempotent resubmission for order {}", submission.id, order.order_id);
                return Ok(original);
            }
        }

        // A fresh proof for an order that is already settled loses deterministically.
        if let Some(order) = scoped.as_ref() {
            let verdict = match order.status {
                Confirmed => Some(Verdict::Rejected(RejectionReason::AlreadyConfirmed)),
                Expired | Rejected => Some(Verdict::Rejected(RejectionReason::NoMatchingOrder)),
                _ => None,
            };
            if let Some(verdict) = verdict {
                return self
                    .settle(&submission, Some(&fingerprint), Some(order.order_id.clone()), fields, verdict)
                    .await;
            }
        }

        let now = Utc::now();
        match match_order(&fields, &candidates, now, &self.config) {
            MatchOutcome::Matched { order, .. } => {
                self.confirm(&submission, order, fields, &fingerprint).await
            },
            MatchOutcome::CurrencyMismatch { order, parsed } => {
                warn!(
                    "🧾 Submission [{}] parsed as {parsed} but order {} expects {}",
                    submission.id, order.order_id, order.currency
                );
                self.settle(
                    &submission,
                    Some(&fingerprint),
                    Some(order.order_id),
                    fields,
                    Verdict::Rejected(RejectionReason::CurrencyMismatch),
                )
                .await
            },
            MatchOutcome::Ambiguous { order_ids } => {
                info!(
                    "🧾 Submission [{}] is ambiguous across {} orders; escalating to review",
                    submission.id,
                    order_ids.len()
                );
                self.settle(
                    &submission,
                    Some(&fingerprint),
                    None,
                    fields,
                    Verdict::NeedsReview(ReviewReason::AmbiguousMatch),
                )
                .await
            },
            MatchOutcome::NoMatch => {
                let verdict = match scoped.as_ref() {
                    Some(order) if order.has_expired(now) => {
                        Verdict::Rejected(RejectionReason::NoMatchingOrder)
                    },
                    _ => Verdict::NeedsReview(ReviewReason::Unmatched),
                };
                self.settle(&submission, Some(&fingerprint), submission.order_id.clone(), fields, verdict).await
            },
        }
    }

    /// The snapshot the matcher scores against: the scoped order when the submission targets
    /// one; otherwise the buyer's awaiting orders, falling back to every awaiting order for
    /// out-of-band proofs.
    async fn candidate_orders(
        &self,
        submission: &ReceiptSubmission,
    ) -> Result<(Vec<PendingOrder>, Option<PendingOrder>), VerificationError> {
        match &submission.order_id {
            Some(order_id) => {
                let order = self
                    .db
                    .fetch_order_by_order_id(order_id)
                    .await?
                    .ok_or_else(|| VerificationError::UnknownOrder(order_id.clone()))?;
                let candidates =
                    if order.is_awaiting_payment() { vec![order.clone()] } else { Vec::new() };
                Ok((candidates, Some(order)))
            },
            None => {
                let mine = self.db.list_awaiting_payment(Some(&submission.buyer_id)).await?;
                let candidates =
                    if mine.is_empty() { self.db.list_awaiting_payment(None).await? } else { mine };
                Ok((candidates, None))
            },
        }
    }

    /// The commit path: claim the fingerprint, then transition the order. Both steps are
    /// atomic conditional writes; this function never holds one while waiting on the other
    /// submission's pipeline work.
    async fn confirm(
        &self,
        submission: &ReceiptSubmission,
        order: PendingOrder,
        fields: ParsedFields,
        fingerprint: &Fingerprint,
    ) -> Result<VerdictRecord, VerificationError> {
        match self.db.try_claim(fingerprint, &order.order_id).await? {
            ClaimOutcome::Claimed => {},
            ClaimOutcome::AlreadyClaimedBySelf => {
                if let Some(original) = self.db.last_verdict_for_claim(fingerprint, &order.order_id).await? {
                    info!(
                        "🧾 Submission [{}] repeats the claim on order {}; replaying the original verdict",
                        submission.id, order.order_id
                    );
                    return Ok(original);
                }
                // The claim is ours but never settled (a crash between claim and audit);
                // fall through and retry the transition.
            },
            ClaimOutcome::AlreadyClaimedByOther(holder) => {
                warn!(
                    "🕵️ Receipt reuse: fingerprint {fingerprint} is held by order {holder}, \
                     but submission [{}] presented it for order {}",
                    submission.id, order.order_id
                );
                for emitter in &self.producers.fraud_alert {
                    emitter
                        .emit(FraudAlertEvent {
                            fingerprint: fingerprint.clone(),
                            held_by: holder.clone(),
                            attempted: order.order_id.clone(),
                        })
                        .await;
                }
                return self
                    .settle(
                        submission,
                        Some(fingerprint),
                        Some(order.order_id),
                        fields,
                        Verdict::Rejected(RejectionReason::DuplicateReceipt),
                    )
                    .await;
            },
        }

        // Status is re-checked here, not only at matching time: the order may have expired or
        // been confirmed while OCR was running.
        if order.expires_at < Utc::now() {
            return self
                .settle(
                    submission,
                    Some(fingerprint),
                    Some(order.order_id),
                    fields,
                    Verdict::Rejected(RejectionReason::OrderExpired),
                )
                .await;
        }
        if self.db.try_transition(&order.order_id, AwaitingPayment, Confirmed).await? {
            info!("🧾✅️ Order {} confirmed by submission [{}]", order.order_id, submission.id);
            let confirmed = PendingOrder { status: Confirmed, ..order.clone() };
            for emitter in &self.producers.order_confirmed {
                emitter.emit(OrderConfirmedEvent::new(confirmed.clone())).await;
            }
            return self.settle(submission, Some(fingerprint), Some(order.order_id), fields, Verdict::Verified).await;
        }

        // Lost the race. Look at where the order actually went to report a precise reason.
        let current = self
            .db
            .fetch_order_by_order_id(&order.order_id)
            .await?
            .ok_or_else(|| VerificationError::UnknownOrder(order.order_id.clone()))?;
        let reason = match current.status {
            Expired => RejectionReason::OrderExpired,
            _ => RejectionReason::AlreadyConfirmed,
        };
        debug!(
            "🧾 Submission [{}] lost the confirmation race for order {} ({})",
            submission.id, order.order_id, current.status
        );
        self.settle(submission, Some(fingerprint), Some(order.order_id), fields, Verdict::Rejected(reason)).await
    }

    /// Records the verdict, applies the review transition when one order is in scope, and
    /// publishes the verdict event. Every submission path funnels through here exactly once.
    async fn settle(
        &self,
        submission: &ReceiptSubmission,
        fingerprint: Option<&Fingerprint>,
        order_id: Option<OrderId>,
        fields: ParsedFields,
        verdict: Verdict,
    ) -> Result<VerdictRecord, VerificationError> {
        if let (Verdict::NeedsReview(_), Some(oid)) = (&verdict, &order_id) {
            if self.db.try_transition(oid, AwaitingPayment, UnderReview).await? {
                debug!("🧾 Order {oid} moved to manual review");
            }
        }
        let record = VerdictRecord {
            submission_id: submission.id.clone(),
            order_id,
            fields,
            verdict,
            decided_at: Utc::now(),
        };
        self.db.record_verdict(fingerprint, &record).await?;
        for emitter in &self.producers.verdict {
            emitter.emit(VerdictEvent::new(record.clone())).await;
        }
        debug!("🧾 Submission [{}] settled: {}", submission.id, record.verdict);
        Ok(record)
    }

    /// Resolution hook for orders parked in manual review: `UnderReview → Confirmed` on
    /// approval, `UnderReview → Rejected` otherwise.
    pub async fn resolve_review(&self, order_id: &OrderId, approve: bool) -> Result<PendingOrder, VerificationError> {
        let to = if approve { Confirmed } else { Rejected };
        if !self.db.try_transition(order_id, UnderReview, to).await? {
            return Err(VerificationError::NotUnderReview(order_id.clone()));
        }
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| VerificationError::UnknownOrder(order_id.clone()))?;
        info!("🧾 Review for order {order_id} resolved: {}", order.status);
        if approve {
            for emitter in &self.producers.order_confirmed {
                emitter.emit(OrderConfirmedEvent::new(order.clone())).await;
            }
        }
        Ok(order)
    }

    /// Sweeps AwaitingPayment orders whose expiry timestamp has passed. Driven by an external
    /// timer; submissions racing the sweep still settle deterministically because the
    /// transition is conditional.
    pub async fn expire_old_orders(&self) -> Result<Vec<PendingOrder>, VerificationError> {
        let expired = self.db.expire_overdue_orders(Utc::now()).await?;
        for order in &expired {
            debug!("🧾⌛️ Order {} expired unpaid", order.order_id);
        }
        Ok(expired)
    }

    /// Registers a new order awaiting payment. Idempotent; the second element is `false` if
    /// the order already existed.
    pub async fn add_order(&self, order: NewPendingOrder) -> Result<(PendingOrder, bool), VerificationError> {
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("📝️ Order {} registered for {}", order.order_id, order.amount);
        }
        Ok((order, inserted))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
