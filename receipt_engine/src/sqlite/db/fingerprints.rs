use sqlx::SqliteConnection;

use crate::{
    traits::{ClaimOutcome, LedgerError},
    types::{Fingerprint, OrderId},
};

/// The atomic check-and-claim. The insert either takes the fingerprint or silently loses to
/// an existing row; losers then read the winner. There is no separate check step to race
/// against.
pub async fn try_claim(
    fingerprint: &Fingerprint,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<ClaimOutcome, LedgerError> {
    let key = fingerprint.key();
    let result = sqlx::query(
        "INSERT INTO fingerprint_claims (fingerprint, order_id) VALUES ($1, $2) ON CONFLICT (fingerprint) DO NOTHING",
    )
    .bind(&key)
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 1 {
        return Ok(ClaimOutcome::Claimed);
    }
    let (holder,): (String,) = sqlx::query_as("SELECT order_id FROM fingerprint_claims WHERE fingerprint = $1")
        .bind(&key)
        .fetch_one(conn)
        .await?;
    if holder == order_id.as_str() {
        Ok(ClaimOutcome::AlreadyClaimedBySelf)
    } else {
        Ok(ClaimOutcome::AlreadyClaimedByOther(OrderId(holder)))
    }
}

pub async fn claimant(fingerprint: &Fingerprint, conn: &mut SqliteConnection) -> Result<Option<OrderId>, LedgerError> {
    let holder: Option<(String,)> = sqlx::query_as("SELECT order_id FROM fingerprint_claims WHERE fingerprint = $1")
        .bind(fingerprint.key())
        .fetch_optional(conn)
        .await?;
    Ok(holder.map(|(id,)| OrderId(id)))
}
