use serde::{Deserialize, Serialize};

use crate::types::{Fingerprint, OrderId, PendingOrder, VerdictRecord};

/// Emitted for every processed submission, whatever the outcome. This is the feed the
/// notification collaborator and human review queues consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub record: VerdictRecord,
}

impl VerdictEvent {
    pub fn new(record: VerdictRecord) -> Self {
        Self { record }
    }
}

/// Emitted when an order reaches Confirmed, either through a verified receipt or through
/// manual review resolution.
#[derive(Debug, Clone)]
pub struct OrderConfirmedEvent {
    pub order: PendingOrder,
}

impl OrderConfirmedEvent {
    pub fn new(order: PendingOrder) -> Self {
        Self { order }
    }
}

/// Emitted when a fingerprint already claimed by one order is presented for another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlertEvent {
    pub fingerprint: Fingerprint,
    pub held_by: OrderId,
    pub attempted: OrderId,
}
