use thiserror::Error;

use crate::types::{Fingerprint, OrderId};

/// The result of an atomic check-and-claim against the fingerprint ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The fingerprint was unclaimed and now belongs to the given order.
    Claimed,
    /// The fingerprint was already claimed by the same order: an idempotent resubmission.
    AlreadyClaimedBySelf,
    /// The fingerprint belongs to a different order. Receipt reuse.
    AlreadyClaimedByOther(OrderId),
}

/// Ledger of payment-proof fingerprints. A fingerprint maps to at most one confirmed order,
/// ever; `try_claim` must be a single atomic step with respect to concurrent submissions — a
/// check-then-set sequence here is a correctness bug.
#[allow(async_fn_in_trait)]
pub trait FingerprintLedger: Clone {
    async fn try_claim(&self, fingerprint: &Fingerprint, order_id: &OrderId) -> Result<ClaimOutcome, LedgerError>;

    /// The order currently holding the fingerprint, if any.
    async fn claimant(&self, fingerprint: &Fingerprint) -> Result<Option<OrderId>, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
