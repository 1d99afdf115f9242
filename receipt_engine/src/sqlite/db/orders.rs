use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    traits::OrderStoreError,
    types::{NewPendingOrder, OrderId, OrderStatusType, PendingOrder},
};

/// Inserts the order, returning `false` in the second element if it already exists.
pub async fn idempotent_insert(
    order: NewPendingOrder,
    conn: &mut SqliteConnection,
) -> Result<(PendingOrder, bool), OrderStoreError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order {} inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewPendingOrder, conn: &mut SqliteConnection) -> Result<PendingOrder, OrderStoreError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                amount,
                currency,
                reference,
                recipient,
                created_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.buyer_id)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.reference)
    .bind(order.recipient)
    .bind(order.created_at)
    .bind(order.expires_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingOrder>, OrderStoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn list_awaiting_payment(
    buyer_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PendingOrder>, OrderStoreError> {
    let orders = match buyer_id {
        Some(buyer) => {
            sqlx::query_as(
                "SELECT * FROM orders WHERE status = 'AwaitingPayment' AND buyer_id = $1 ORDER BY created_at",
            )
            .bind(buyer)
            .fetch_all(conn)
            .await?
        },
        None => {
            sqlx::query_as("SELECT * FROM orders WHERE status = 'AwaitingPayment' ORDER BY created_at")
                .fetch_all(conn)
                .await?
        },
    };
    Ok(orders)
}

/// The conditional update that arbitrates every status race: exactly one caller sees a row
/// count of one for a given (order, from) pair.
pub async fn try_transition(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<bool, OrderStoreError> {
    let result =
        sqlx::query("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3")
            .bind(to)
            .bind(order_id.as_str())
            .bind(from)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn expire_overdue(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PendingOrder>, OrderStoreError> {
    let expired = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'AwaitingPayment' AND expires_at < $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(expired)
}
