use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    traits::AuditError,
    types::{Fingerprint, OrderId, Verdict, VerdictRecord},
};

pub async fn insert(
    fingerprint: Option<&Fingerprint>,
    record: &VerdictRecord,
    conn: &mut SqliteConnection,
) -> Result<i64, AuditError> {
    let fields = serde_json::to_string(&record.fields)?;
    let (outcome, reason) = record.verdict.parts();
    let result = sqlx::query(
        r#"
            INSERT INTO audit_log (submission_id, order_id, fingerprint, fields, verdict, reason, decided_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7);
        "#,
    )
    .bind(&record.submission_id)
    .bind(record.order_id.as_ref().map(|o| o.as_str().to_string()))
    .bind(fingerprint.map(Fingerprint::key))
    .bind(fields)
    .bind(outcome)
    .bind(reason)
    .bind(record.decided_at)
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn last_verdict_for_claim(
    fingerprint: &Fingerprint,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<VerdictRecord>, AuditError> {
    let row: Option<(String, Option<String>, String, String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
        r#"
            SELECT submission_id, order_id, fields, verdict, reason, decided_at
            FROM audit_log
            WHERE fingerprint = $1 AND order_id = $2
            ORDER BY id DESC
            LIMIT 1;
        "#,
    )
    .bind(fingerprint.key())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(|(submission_id, order_id, fields, outcome, reason, decided_at)| {
        let verdict = Verdict::from_parts(&outcome, reason.as_deref())
            .map_err(|e| AuditError::CorruptEntry(e.to_string()))?;
        Ok(VerdictRecord {
            submission_id,
            order_id: order_id.map(OrderId),
            fields: serde_json::from_str(&fields)?,
            verdict,
            decided_at,
        })
    })
    .transpose()
}
