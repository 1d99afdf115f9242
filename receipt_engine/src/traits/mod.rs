//! The contracts the engine consumes. Backends (SQLite here; anything else elsewhere) implement
//! the storage traits; the chat-interface side supplies an [`OcrEngine`].

mod audit_sink;
mod fingerprint_ledger;
mod ocr_engine;
mod order_store;

pub use audit_sink::{AuditError, AuditSink};
pub use fingerprint_ledger::{ClaimOutcome, FingerprintLedger, LedgerError};
pub use ocr_engine::{OcrEngine, OcrError};
pub use order_store::{OrderStore, OrderStoreError};
