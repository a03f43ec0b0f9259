//! # Proof Outbox Repository
//!
//! Write-ahead cache for payment proofs.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  stash()  ─────────►  pending (uploaded_at IS NULL)                    │
//! │                          │                                              │
//! │            upload fails  │  upload succeeds                             │
//! │   mark_attempt_failed()  │  mark_uploaded()                             │
//! │          ┌───────────────┤                                              │
//! │          ▼               ▼                                              │
//! │   attempts += 1     uploaded (kept as a fallback copy)                  │
//! │   retried until          │                                              │
//! │   max_attempts           │  backend sale seen with its own proof        │
//! │                          ▼                                              │
//! │                      discard()                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stored data URL doubles as the staff-side fallback: if a sale's
//! backend record has no proof but this device holds one, the queue still
//! shows the sale.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use super::{placeholders, IN_CHUNK};
use crate::error::DbResult;
use vitrina_core::PaymentProof;

/// One stashed proof.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ProofOutboxEntry {
    pub sale_id: String,
    pub order_number: String,
    pub data_url: String,
    pub mime: String,
    pub size_bytes: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl ProofOutboxEntry {
    pub fn is_uploaded(&self) -> bool {
        self.uploaded_at.is_some()
    }
}

const COLUMNS: &str = r#"
    sale_id, order_number, data_url, mime, size_bytes, attempts, last_error,
    created_at, attempted_at, uploaded_at
"#;

/// Repository for the `proof_outbox` table.
#[derive(Debug, Clone)]
pub struct ProofOutboxRepository {
    pool: SqlitePool,
}

impl ProofOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProofOutboxRepository { pool }
    }

    /// Stores `proof` for `sale_id` before any upload is tried.
    ///
    /// A second stash for the same sale replaces the first and starts its
    /// attempt count over.
    pub async fn stash(
        &self,
        sale_id: &str,
        order_number: &str,
        proof: &PaymentProof,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO proof_outbox (
                sale_id, order_number, data_url, mime, size_bytes, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            ON CONFLICT (sale_id) DO UPDATE SET
                order_number = excluded.order_number,
                data_url     = excluded.data_url,
                mime         = excluded.mime,
                size_bytes   = excluded.size_bytes,
                attempts     = 0,
                last_error   = NULL,
                created_at   = excluded.created_at,
                attempted_at = NULL,
                uploaded_at  = NULL
            "#,
        )
        .bind(sale_id)
        .bind(order_number)
        .bind(proof.to_data_url())
        .bind(proof.mime())
        .bind(proof.size() as i64)
        .bind(at)
        .execute(&self.pool)
        .await?;

        debug!(
            sale_id = %sale_id,
            mime = %proof.mime(),
            size = proof.size(),
            "Proof stashed"
        );
        Ok(())
    }

    pub async fn get(&self, sale_id: &str) -> DbResult<Option<ProofOutboxEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM proof_outbox WHERE sale_id = ?1");
        let entry = sqlx::query_as(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// Proofs not yet uploaded with fewer than `max_attempts` tries, oldest
    /// first.
    pub async fn pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<ProofOutboxEntry>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM proof_outbox
            WHERE uploaded_at IS NULL AND attempts < ?1
            ORDER BY created_at, sale_id
            LIMIT ?2
            "#
        );
        let entries = sqlx::query_as(&sql)
            .bind(max_attempts as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn mark_attempt_failed(
        &self,
        sale_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE proof_outbox
            SET attempts = attempts + 1, last_error = ?1, attempted_at = ?2
            WHERE sale_id = ?3
            "#,
        )
        .bind(error)
        .bind(at)
        .bind(sale_id)
        .execute(&self.pool)
        .await?;

        warn!(sale_id = %sale_id, error = %error, "Proof upload attempt failed");
        Ok(())
    }

    pub async fn mark_uploaded(&self, sale_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE proof_outbox
            SET uploaded_at = ?1, attempted_at = ?1, last_error = NULL
            WHERE sale_id = ?2
            "#,
        )
        .bind(at)
        .bind(sale_id)
        .execute(&self.pool)
        .await?;

        debug!(sale_id = %sale_id, "Proof marked uploaded");
        Ok(())
    }

    /// Uploaded proofs still held locally, oldest first.
    pub async fn uploaded(&self, limit: u32) -> DbResult<Vec<ProofOutboxEntry>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM proof_outbox
            WHERE uploaded_at IS NOT NULL
            ORDER BY uploaded_at, sale_id
            LIMIT ?1
            "#
        );
        let entries = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Drops the stashed proof. Returns whether one existed.
    pub async fn discard(&self, sale_id: &str) -> DbResult<bool> {
        let affected = sqlx::query("DELETE FROM proof_outbox WHERE sale_id = ?1")
            .bind(sale_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Locally held data URLs for whichever of `sale_ids` have one.
    pub async fn fallback_for(&self, sale_ids: &[String]) -> DbResult<HashMap<String, String>> {
        let mut found = HashMap::new();

        for chunk in sale_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT sale_id, data_url FROM proof_outbox WHERE sale_id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut query = sqlx::query_as::<_, (String, String)>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            found.extend(query.fetch_all(&self.pool).await?);
        }

        Ok(found)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;
    use vitrina_core::DEFAULT_MAX_PROOF_BYTES;

    async fn repo() -> ProofOutboxRepository {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .proof_outbox()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 10, minute, 0).unwrap()
    }

    fn proof() -> PaymentProof {
        PaymentProof::from_bytes("image/png", vec![1, 2, 3, 4], DEFAULT_MAX_PROOF_BYTES).unwrap()
    }

    #[tokio::test]
    async fn test_stash_then_get() {
        let repo = repo().await;
        repo.stash("sale-1", "V-0001", &proof(), at(0)).await.unwrap();

        let entry = repo.get("sale-1").await.unwrap().unwrap();
        assert_eq!(entry.order_number, "V-0001");
        assert_eq!(entry.mime, "image/png");
        assert_eq!(entry.size_bytes, 4);
        assert_eq!(entry.data_url, proof().to_data_url());
        assert!(!entry.is_uploaded());
    }

    #[tokio::test]
    async fn test_pending_respects_attempt_limit() {
        let repo = repo().await;
        repo.stash("sale-1", "V-0001", &proof(), at(0)).await.unwrap();
        repo.stash("sale-2", "V-0002", &proof(), at(1)).await.unwrap();

        for minute in 2..5 {
            repo.mark_attempt_failed("sale-1", "timeout", at(minute))
                .await
                .unwrap();
        }

        let pending = repo.pending(10, 3).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sale_id, "sale-2");

        let entry = repo.get("sale-1").await.unwrap().unwrap();
        assert_eq!(entry.attempts, 3);
        assert_eq!(entry.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_restash_resets_attempts() {
        let repo = repo().await;
        repo.stash("sale-1", "V-0001", &proof(), at(0)).await.unwrap();
        repo.mark_attempt_failed("sale-1", "boom", at(1)).await.unwrap();
        repo.stash("sale-1", "V-0001", &proof(), at(2)).await.unwrap();

        let entry = repo.get("sale-1").await.unwrap().unwrap();
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.last_error, None);
    }

    #[tokio::test]
    async fn test_uploaded_proofs_leave_pending_but_stay_as_fallback() {
        let repo = repo().await;
        repo.stash("sale-1", "V-0001", &proof(), at(0)).await.unwrap();
        repo.mark_uploaded("sale-1", at(1)).await.unwrap();

        assert!(repo.pending(10, 10).await.unwrap().is_empty());
        assert_eq!(repo.uploaded(10).await.unwrap().len(), 1);

        let ids = vec!["sale-1".to_string(), "sale-9".to_string()];
        let fallback = repo.fallback_for(&ids).await.unwrap();
        assert_eq!(fallback.len(), 1);
        assert!(fallback["sale-1"].starts_with("data:image/png;base64,"));

        assert!(repo.discard("sale-1").await.unwrap());
        assert!(!repo.discard("sale-1").await.unwrap());
        assert!(repo.fallback_for(&ids).await.unwrap().is_empty());
    }
}
