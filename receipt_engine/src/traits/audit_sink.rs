use thiserror::Error;

use crate::types::{Fingerprint, OrderId, VerdictRecord};

/// Immutable audit trail. Every submission ends in exactly one recorded verdict, whatever the
/// outcome; the records double as the source of truth for idempotent resubmissions.
#[allow(async_fn_in_trait)]
pub trait AuditSink: Clone {
    /// Appends a verdict record. Returns the record's storage id.
    async fn record_verdict(&self, fingerprint: Option<&Fingerprint>, record: &VerdictRecord)
        -> Result<i64, AuditError>;

    /// The most recent verdict recorded for this (fingerprint, order) pair, used to replay the
    /// original outcome when the same proof is submitted again.
    async fn last_verdict_for_claim(
        &self,
        fingerprint: &Fingerprint,
        order_id: &OrderId,
    ) -> Result<Option<VerdictRecord>, AuditError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Could not serialize audit payload: {0}")]
    Serialization(String),
    #[error("Stored audit entry is corrupt: {0}")]
    CorruptEntry(String),
}

impl From<sqlx::Error> for AuditError {
    fn from(e: sqlx::Error) -> Self {
        AuditError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        AuditError::Serialization(e.to_string())
    }
}
