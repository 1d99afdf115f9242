//! `SqliteDatabase` is a concrete backend for the receipt verification engine. It implements
//! the order store, the fingerprint ledger and the audit sink on a single SQLite database.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::db::{audit, fingerprints, new_pool, orders};
use crate::{
    traits::{AuditError, AuditSink, ClaimOutcome, FingerprintLedger, LedgerError, OrderStore, OrderStoreError},
    types::{Fingerprint, NewPendingOrder, OrderId, OrderStatusType, PendingOrder, VerdictRecord},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl OrderStore for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<PendingOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn insert_order(&self, order: NewPendingOrder) -> Result<(PendingOrder, bool), OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn list_awaiting_payment(&self, buyer_id: Option<&str>) -> Result<Vec<PendingOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_awaiting_payment(buyer_id, &mut conn).await
    }

    async fn try_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<bool, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::try_transition(order_id, from, to, &mut conn).await
    }

    async fn expire_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<PendingOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::expire_overdue(now, &mut conn).await
    }
}

impl FingerprintLedger for SqliteDatabase {
    async fn try_claim(&self, fingerprint: &Fingerprint, order_id: &OrderId) -> Result<ClaimOutcome, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        fingerprints::try_claim(fingerprint, order_id, &mut conn).await
    }

    async fn claimant(&self, fingerprint: &Fingerprint) -> Result<Option<OrderId>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        fingerprints::claimant(fingerprint, &mut conn).await
    }
}

impl AuditSink for SqliteDatabase {
    async fn record_verdict(
        &self,
        fingerprint: Option<&Fingerprint>,
        record: &VerdictRecord,
    ) -> Result<i64, AuditError> {
        let mut conn = self.pool.acquire().await?;
        audit::insert(fingerprint, record, &mut conn).await
    }

    async fn last_verdict_for_claim(
        &self,
        fingerprint: &Fingerprint,
        order_id: &OrderId,
    ) -> Result<Option<VerdictRecord>, AuditError> {
        let mut conn = self.pool.acquire().await?;
        audit::last_verdict_for_claim(fingerprint, order_id, &mut conn).await
    }
}
