use thiserror::Error;

use crate::{
    traits::{AuditError, LedgerError, OrderStoreError},
    types::OrderId,
};

/// Infrastructure failures while processing a submission. Pipeline outcomes — bad images,
/// unreachable OCR, unmatched or duplicate receipts — are verdicts, not errors.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error(transparent)]
    OrderStore(#[from] OrderStoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("The submission targets order {0}, which does not exist")]
    UnknownOrder(OrderId),
    #[error("Order {0} is not under review")]
    NotUnderReview(OrderId),
}
