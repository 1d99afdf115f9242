use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{NewPendingOrder, OrderId, OrderStatusType, PendingOrder};

/// Read/write contract over the order records the engine needs. The engine reads snapshots and
/// writes status transitions; catalog management lives with the shop collaborator.
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// Fetches a single order by its public id.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<PendingOrder>, OrderStoreError>;

    /// Takes a new order and stores it. This call is idempotent.
    /// Returns `false` in the second element if the order already existed.
    async fn insert_order(&self, order: NewPendingOrder) -> Result<(PendingOrder, bool), OrderStoreError>;

    /// A snapshot of orders awaiting payment confirmation, optionally scoped to one buyer.
    /// The snapshot may be slightly stale with respect to concurrent confirmations; the atomic
    /// transition below is the arbiter, not this read.
    async fn list_awaiting_payment(&self, buyer_id: Option<&str>) -> Result<Vec<PendingOrder>, OrderStoreError>;

    /// Atomically moves the order from `from` to `to`. Returns `false` without changing
    /// anything if the order is no longer in the `from` state. This is the single
    /// race-arbitration point for order confirmation.
    async fn try_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<bool, OrderStoreError>;

    /// Marks every AwaitingPayment order whose expiry timestamp has passed as Expired, and
    /// returns the orders that were expired.
    async fn expire_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<PendingOrder>, OrderStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}
