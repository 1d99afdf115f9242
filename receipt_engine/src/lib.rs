//! Receipt Verification Engine
//!
//! The engine decides whether an uploaded payment-receipt image genuinely pays for a pending
//! order. Buyers pay off-platform and submit a photo of the receipt as proof; the pipeline
//! normalizes the image, extracts text through a pluggable OCR collaborator, parses payment
//! facts out of the noisy result, matches them against outstanding orders, guards against
//! receipt reuse, and drives the order state machine to a verdict.
//!
//! The library is divided into three main sections:
//! 1. The pipeline stages ([`mod@pipeline`]). These are pure and stateless: image
//!    normalization, text extraction (with retry policy around the OCR collaborator), field
//!    parsing and order matching. They can be tested in isolation with scripted inputs.
//! 2. The storage and OCR contracts ([`mod@traits`]). The engine never talks to a database or
//!    recognition engine directly; backends implement [`traits::OrderStore`],
//!    [`traits::FingerprintLedger`] and [`traits::AuditSink`]. A SQLite implementation is
//!    provided behind the `sqlite` feature.
//! 3. The verification API ([`ReceiptFlowApi`]). It orchestrates the pipeline, owns the
//!    per-order state machine, performs the atomic fingerprint claim, and records an audit
//!    entry for every verdict.
//!
//! The engine also emits events (verdict produced, order confirmed, fraud alert) through a
//! simple hook system so that notification collaborators can react without the engine ever
//! sending messages itself.

pub mod config;
pub mod events;
pub mod helpers;
pub mod pipeline;
mod rve_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;
pub mod types;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use config::VerifyConfig;
pub use rve_api::{ReceiptFlowApi, VerificationError};
