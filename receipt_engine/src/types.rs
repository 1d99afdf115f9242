use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::error;
use rve_common::MoneyAmount;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no acceptable proof of payment has been received.
    AwaitingPayment,
    /// A submission could not be decided automatically and is queued for a human.
    UnderReview,
    /// A receipt has been verified against this order. Terminal.
    Confirmed,
    /// The order was rejected during manual review. Terminal.
    Rejected,
    /// The order timed out before payment was confirmed.
    Expired,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::AwaitingPayment => write!(f, "AwaitingPayment"),
            OrderStatusType::UnderReview => write!(f, "UnderReview"),
            OrderStatusType::Confirmed => write!(f, "Confirmed"),
            OrderStatusType::Rejected => write!(f, "Rejected"),
            OrderStatusType::Expired => write!(f, "Expired"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to AwaitingPayment");
            OrderStatusType::AwaitingPayment
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AwaitingPayment" => Ok(Self::AwaitingPayment),
            "UnderReview" => Ok(Self::UnderReview),
            "Confirmed" => Ok(Self::Confirmed),
            "Rejected" => Ok(Self::Rejected),
            "Expired" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl OrderStatusType {
    /// Confirmed and Rejected never leave their state again; Expired only via an admin reset,
    /// which is outside this engine.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Confirmed | OrderStatusType::Rejected | OrderStatusType::Expired)
    }
}

//--------------------------------------     PendingOrder      -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct PendingOrder {
    pub id: i64,
    pub order_id: OrderId,
    /// The buyer as identified by the chat-interface collaborator.
    pub buyer_id: String,
    pub amount: MoneyAmount,
    pub currency: String,
    /// The payment reference the buyer was asked to include, if one was issued.
    pub reference: Option<String>,
    /// Merchant requisites expected to appear on the receipt.
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OrderStatusType,
}

impl PendingOrder {
    pub fn is_awaiting_payment(&self) -> bool {
        self.status == OrderStatusType::AwaitingPayment
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatusType::Expired || self.expires_at < now
    }
}

//--------------------------------------   NewPendingOrder     -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPendingOrder {
    pub order_id: OrderId,
    pub buyer_id: String,
    pub amount: MoneyAmount,
    pub currency: String,
    pub reference: Option<String>,
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewPendingOrder {
    pub fn new(order_id: OrderId, buyer_id: String, amount: MoneyAmount, expires_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            buyer_id,
            amount,
            currency: rve_common::RUB_CURRENCY_CODE.to_string(),
            reference: None,
            recipient: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

//--------------------------------------  ReceiptSubmission    -------------------------------------------------------
/// A buyer-provided proof of payment. Immutable once created; processed exactly once.
#[derive(Clone)]
pub struct ReceiptSubmission {
    pub id: String,
    /// Present when the buyer submitted the receipt in the context of a specific order.
    pub order_id: Option<OrderId>,
    pub buyer_id: String,
    pub image: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
}

impl ReceiptSubmission {
    pub fn new(id: impl Into<String>, buyer_id: impl Into<String>, image: Vec<u8>) -> Self {
        Self { id: id.into(), order_id: None, buyer_id: buyer_id.into(), image, submitted_at: Utc::now() }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

impl std::fmt::Debug for ReceiptSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ReceiptSubmission[{}] from {} ({} image bytes, order: {:?})",
            self.id,
            self.buyer_id,
            self.image.len(),
            self.order_id
        )
    }
}

//--------------------------------------    ExtractedText      -------------------------------------------------------
/// One recognized line with the confidence reported by the OCR collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
    /// Set when the confidence falls below the configured floor. Low-confidence lines are kept,
    /// since a partially misread line may still yield a usable field.
    pub low_confidence: bool,
}

impl TextLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self { text: text.into(), confidence, low_confidence: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub lines: Vec<TextLine>,
}

impl ExtractedText {
    pub fn new(lines: Vec<TextLine>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.text.trim().is_empty())
    }
}

//--------------------------------------     ParsedFields      -------------------------------------------------------
/// A parsed value together with the confidence of the parse: line confidence times
/// pattern-match strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field<T> {
    pub value: T,
    pub confidence: f32,
}

impl<T> Field<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

/// Payment facts recovered from the recognized text. Absent fields were not found — they are
/// never invented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub amount: Option<Field<MoneyAmount>>,
    /// Currency code detected next to the winning amount candidate, when a symbol or code was
    /// adjacent to it.
    pub currency: Option<String>,
    pub paid_date: Option<Field<NaiveDate>>,
    pub paid_time: Option<Field<NaiveTime>>,
    pub txid: Option<Field<String>>,
    pub recipient: Option<Field<String>>,
}

impl ParsedFields {
    pub fn has_amount(&self) -> bool {
        self.amount.is_some()
    }
}

//--------------------------------------     Fingerprint       -------------------------------------------------------
/// A stable identifier for one payment proof, used to detect reuse of the same receipt across
/// orders. The transaction id is preferred; the content hash of the normalized image is the
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
    TxId(String),
    ImageHash(String),
}

impl Fingerprint {
    /// The ledger key. Namespaced so a transaction id can never collide with a hex hash.
    pub fn key(&self) -> String {
        match self {
            Fingerprint::TxId(id) => format!("tx:{id}"),
            Fingerprint::ImageHash(hash) => format!("img:{hash}"),
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fingerprint::TxId(id) => write!(f, "tx:{id}"),
            Fingerprint::ImageHash(hash) => write!(f, "img:{}…", &hash[..hash.len().min(12)]),
        }
    }
}

//--------------------------------------       Verdict         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    InvalidImage,
    NoMatchingOrder,
    CurrencyMismatch,
    DuplicateReceipt,
    AlreadyConfirmed,
    OrderExpired,
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            RejectionReason::InvalidImage => "invalid_image",
            RejectionReason::NoMatchingOrder => "no_matching_order",
            RejectionReason::CurrencyMismatch => "currency_mismatch",
            RejectionReason::DuplicateReceipt => "duplicate_receipt",
            RejectionReason::AlreadyConfirmed => "already_confirmed",
            RejectionReason::OrderExpired => "order_expired",
        };
        write!(f, "{code}")
    }
}

impl FromStr for RejectionReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_image" => Ok(Self::InvalidImage),
            "no_matching_order" => Ok(Self::NoMatchingOrder),
            "currency_mismatch" => Ok(Self::CurrencyMismatch),
            "duplicate_receipt" => Ok(Self::DuplicateReceipt),
            "already_confirmed" => Ok(Self::AlreadyConfirmed),
            "order_expired" => Ok(Self::OrderExpired),
            s => Err(ConversionError(format!("Invalid rejection reason: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewReason {
    OcrUnavailable,
    AmbiguousMatch,
    Unmatched,
}

impl Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ReviewReason::OcrUnavailable => "ocr_unavailable",
            ReviewReason::AmbiguousMatch => "ambiguous_match",
            ReviewReason::Unmatched => "unmatched",
        };
        write!(f, "{code}")
    }
}

impl FromStr for ReviewReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocr_unavailable" => Ok(Self::OcrUnavailable),
            "ambiguous_match" => Ok(Self::AmbiguousMatch),
            "unmatched" => Ok(Self::Unmatched),
            s => Err(ConversionError(format!("Invalid review reason: {s}"))),
        }
    }
}

/// The pipeline's terminal decision for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Verified,
    Rejected(RejectionReason),
    NeedsReview(ReviewReason),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }

    /// Splits the verdict into the stable (outcome, reason) pair stored in the audit log.
    pub fn parts(&self) -> (&'static str, Option<String>) {
        match self {
            Verdict::Verified => ("verified", None),
            Verdict::Rejected(r) => ("rejected", Some(r.to_string())),
            Verdict::NeedsReview(r) => ("needs_review", Some(r.to_string())),
        }
    }

    /// Reassembles a verdict from its audit-log representation.
    pub fn from_parts(outcome: &str, reason: Option<&str>) -> Result<Self, ConversionError> {
        match (outcome, reason) {
            ("verified", _) => Ok(Verdict::Verified),
            ("rejected", Some(r)) => Ok(Verdict::Rejected(r.parse()?)),
            ("needs_review", Some(r)) => Ok(Verdict::NeedsReview(r.parse()?)),
            (o, r) => Err(ConversionError(format!("Invalid verdict: {o} / {r:?}"))),
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Verified => write!(f, "verified"),
            Verdict::Rejected(r) => write!(f, "rejected ({r})"),
            Verdict::NeedsReview(r) => write!(f, "needs_review ({r})"),
        }
    }
}

//--------------------------------------    VerdictRecord      -------------------------------------------------------
/// The engine's result for one submission; also the audit payload handed to the notification
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub submission_id: String,
    pub order_id: Option<OrderId>,
    pub fields: ParsedFields,
    pub verdict: Verdict,
    pub decided_at: DateTime<Utc>,
}
