//! # Tracker Repository
//!
//! Persistence for per-order tracker entries.
//!
//! ## Exactly-Once Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status change is a conditional UPDATE:                          │
//! │                                                                         │
//! │    UPDATE order_tracker SET status = 'confirmed', ...                  │
//! │    WHERE order_number = ?                                              │
//! │      AND status IN ('pending_payment', 'pending_confirmation')         │
//! │                                                                         │
//! │  rows_affected = 1  → this caller made the move (react to it)          │
//! │  rows_affected = 0  → someone already did, or the move is not forward  │
//! │                                                                         │
//! │  The poller, the confirmation bus and the staff actuator can all race │
//! │  to confirm the same order. Only one of them gets `true`.              │
//! │                                                                         │
//! │  Receipts use the same trick: claim_receipt() sets receipt_issued_at  │
//! │  only WHERE it IS NULL.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::{placeholders, IN_CHUNK};
use crate::error::{DbError, DbResult};
use vitrina_core::{
    Money, OrderLine, PaymentDetails, PaymentMethod, SaleRecord, StaffDecision, TrackerEntry,
    TrackerStatus,
};

const COLUMNS: &str = r#"
    order_number, sale_id, status, payment_method, customer_name, total_cents,
    lines, payment_details, created_at, updated_at, confirmed_at, rejected_at,
    receipt_issued_at
"#;

#[derive(Debug, FromRow)]
struct TrackerRow {
    order_number: String,
    sale_id: String,
    status: TrackerStatus,
    payment_method: PaymentMethod,
    customer_name: String,
    total_cents: i64,
    lines: String,
    payment_details: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    receipt_issued_at: Option<DateTime<Utc>>,
}

impl TryFrom<TrackerRow> for TrackerEntry {
    type Error = DbError;

    fn try_from(row: TrackerRow) -> DbResult<Self> {
        let lines: Vec<OrderLine> = serde_json::from_str(&row.lines)
            .map_err(|e| DbError::corrupt("order_tracker.lines", e))?;
        let payment_details = row
            .payment_details
            .as_deref()
            .map(serde_json::from_str::<PaymentDetails>)
            .transpose()
            .map_err(|e| DbError::corrupt("order_tracker.payment_details", e))?;

        Ok(TrackerEntry {
            order_number: row.order_number,
            sale_id: row.sale_id,
            status: row.status,
            payment_method: row.payment_method,
            customer_name: row.customer_name,
            total: Money::from_cents(row.total_cents),
            lines,
            payment_details,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            rejected_at: row.rejected_at,
            receipt_issued_at: row.receipt_issued_at,
        })
    }
}

/// Repository for the `order_tracker` table.
#[derive(Debug, Clone)]
pub struct TrackerRepository {
    pool: SqlitePool,
}

impl TrackerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TrackerRepository { pool }
    }

    /// Stores a new entry.
    ///
    /// ## Errors
    /// `UniqueViolation` if the order number or sale id is already tracked.
    pub async fn insert_new(&self, entry: &TrackerEntry) -> DbResult<()> {
        let lines = serde_json::to_string(&entry.lines)
            .map_err(|e| DbError::corrupt("order_tracker.lines", e))?;
        let payment_details = entry
            .payment_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::corrupt("order_tracker.payment_details", e))?;

        sqlx::query(
            r#"
            INSERT INTO order_tracker (
                order_number, sale_id, status, payment_method, customer_name,
                total_cents, lines, payment_details, created_at, updated_at,
                confirmed_at, rejected_at, receipt_issued_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&entry.order_number)
        .bind(&entry.sale_id)
        .bind(entry.status)
        .bind(entry.payment_method)
        .bind(&entry.customer_name)
        .bind(entry.total.cents())
        .bind(lines)
        .bind(payment_details)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.confirmed_at)
        .bind(entry.rejected_at)
        .bind(entry.receipt_issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: entry.order_number.clone(),
            },
            other => other,
        })?;

        info!(
            order_number = %entry.order_number,
            sale_id = %entry.sale_id,
            status = %entry.status,
            "Tracker entry created"
        );
        Ok(())
    }

    pub async fn get(&self, order_number: &str) -> DbResult<Option<TrackerEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM order_tracker WHERE order_number = ?1");
        let row: Option<TrackerRow> = sqlx::query_as(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TrackerEntry::try_from).transpose()
    }

    pub async fn get_by_sale(&self, sale_id: &str) -> DbResult<Option<TrackerEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM order_tracker WHERE sale_id = ?1");
        let row: Option<TrackerRow> = sqlx::query_as(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TrackerEntry::try_from).transpose()
    }

    /// Entries in `status`, oldest first.
    pub async fn list_by_status(&self, status: TrackerStatus) -> DbResult<Vec<TrackerEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM order_tracker WHERE status = ?1 ORDER BY created_at, order_number"
        );
        let rows: Vec<TrackerRow> = sqlx::query_as(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TrackerEntry::try_from).collect()
    }

    /// Moves an entry forward to `to`.
    ///
    /// Returns `true` only for the call that performed the move. A repeat,
    /// or any move that is not forward from the stored status, returns
    /// `false` and changes nothing.
    ///
    /// ## Errors
    /// `NotFound` if no entry has this order number.
    pub async fn transition(
        &self,
        order_number: &str,
        to: TrackerStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let from = to.predecessors();
        if from.is_empty() {
            return self.require(order_number).await.map(|_| false);
        }

        let sql = format!(
            r#"
            UPDATE order_tracker
            SET status = ?1,
                updated_at = ?2,
                confirmed_at = CASE WHEN ?1 = 'confirmed'
                                    THEN COALESCE(confirmed_at, ?2) ELSE confirmed_at END,
                rejected_at  = CASE WHEN ?1 = 'rejected'
                                    THEN COALESCE(rejected_at, ?2) ELSE rejected_at END
            WHERE order_number = ?3 AND status IN ({})
            "#,
            placeholders(4, from.len())
        );

        let mut query = sqlx::query(&sql).bind(to).bind(at).bind(order_number);
        for status in from {
            query = query.bind(*status);
        }
        let affected = query.execute(&self.pool).await?.rows_affected();

        if affected == 0 {
            self.require(order_number).await?;
            debug!(order_number = %order_number, to = %to, "Transition not applied");
            return Ok(false);
        }

        info!(order_number = %order_number, to = %to, "Tracker status changed");
        Ok(true)
    }

    /// Records how the customer paid. Does not change the status.
    pub async fn record_payment_details(
        &self,
        order_number: &str,
        details: &PaymentDetails,
    ) -> DbResult<()> {
        let json = serde_json::to_string(details)
            .map_err(|e| DbError::corrupt("order_tracker.payment_details", e))?;

        let affected = sqlx::query(
            "UPDATE order_tracker SET payment_details = ?1, updated_at = ?2 WHERE order_number = ?3",
        )
        .bind(json)
        .bind(Utc::now())
        .bind(order_number)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(DbError::not_found("TrackerEntry", order_number));
        }
        Ok(())
    }

    /// Marks the receipt of a confirmed order as issued.
    ///
    /// `true` exactly once per confirmed order; every later call, and any
    /// call for an order that is not confirmed, gets `false`.
    pub async fn claim_receipt(&self, order_number: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE order_tracker
            SET receipt_issued_at = ?1
            WHERE order_number = ?2
              AND status = 'confirmed'
              AND receipt_issued_at IS NULL
            "#,
        )
        .bind(at)
        .bind(order_number)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 1 {
            info!(order_number = %order_number, "Receipt claimed");
        }
        Ok(affected == 1)
    }

    /// Records a staff decision for a backend sale.
    ///
    /// If the sale is not tracked on this device yet, a mirror entry is
    /// created directly in the decided state. Otherwise the entry goes
    /// through `transition`. Returns whether this call changed anything.
    pub async fn upsert_staff_decision(
        &self,
        sale: &SaleRecord,
        decision: StaffDecision,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mirror = TrackerEntry::mirror_of(sale, decision, at);
        let lines = serde_json::to_string(&mirror.lines)
            .map_err(|e| DbError::corrupt("order_tracker.lines", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO order_tracker (
                order_number, sale_id, status, payment_method, customer_name,
                total_cents, lines, created_at, updated_at, confirmed_at, rejected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&mirror.order_number)
        .bind(&mirror.sale_id)
        .bind(mirror.status)
        .bind(mirror.payment_method)
        .bind(&mirror.customer_name)
        .bind(mirror.total.cents())
        .bind(lines)
        .bind(mirror.created_at)
        .bind(mirror.updated_at)
        .bind(mirror.confirmed_at)
        .bind(mirror.rejected_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            info!(
                order_number = %mirror.order_number,
                status = %mirror.status,
                "Staff decision recorded for untracked sale"
            );
            return Ok(true);
        }

        let existing = self
            .get_by_sale(&sale.id)
            .await?
            .ok_or_else(|| DbError::not_found("TrackerEntry", &sale.id))?;
        self.transition(&existing.order_number, decision.status(), at)
            .await
    }

    /// Local status per sale id, for the sales that are tracked.
    pub async fn statuses_for_sales(
        &self,
        sale_ids: &[String],
    ) -> DbResult<HashMap<String, TrackerStatus>> {
        let mut statuses = HashMap::with_capacity(sale_ids.len());

        for chunk in sale_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT sale_id, status FROM order_tracker WHERE sale_id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut query = sqlx::query_as::<_, (String, TrackerStatus)>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            statuses.extend(query.fetch_all(&self.pool).await?);
        }

        Ok(statuses)
    }

    async fn require(&self, order_number: &str) -> DbResult<()> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM order_tracker WHERE order_number = ?1")
                .bind(order_number)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Ok(()),
            None => Err(DbError::not_found("TrackerEntry", order_number)),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
