//! # Pending-Payment Queue
//!
//! Staff-side view of online sales whose proof still needs validating.
//! Built fresh from the backend on every call; the local store only adds
//! decisions taken on this device and stashed proofs that never made it up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::SyncResult;
use crate::events::ShopEventEmitter;
use crate::task::{spawn_periodic, TaskHandle, TickControl};
use vitrina_core::queue::pending_payments;
use vitrina_core::PendingPayment;
use vitrina_db::Database;

#[derive(Clone)]
pub struct PendingPaymentQueue {
    backend: Arc<dyn Backend>,
    db: Database,
    offset: FixedOffset,
    emitter: Arc<dyn ShopEventEmitter>,
}

impl PendingPaymentQueue {
    /// `offset` defines the store's business day.
    pub fn new(
        backend: Arc<dyn Backend>,
        db: Database,
        offset: FixedOffset,
        emitter: Arc<dyn ShopEventEmitter>,
    ) -> Self {
        PendingPaymentQueue {
            backend,
            db,
            offset,
            emitter,
        }
    }

    /// Sales awaiting validation today, newest first.
    pub async fn list(&self) -> SyncResult<Vec<PendingPayment>> {
        self.list_at(Utc::now().with_timezone(&self.offset)).await
    }

    /// [`PendingPaymentQueue::list`] with an explicit "now".
    pub async fn list_at(&self, now: DateTime<FixedOffset>) -> SyncResult<Vec<PendingPayment>> {
        let (sales, orders) =
            tokio::try_join!(self.backend.list_sales(), self.backend.list_orders())?;

        let online: Vec<String> = sales
            .iter()
            .filter(|s| s.is_online())
            .map(|s| s.id.clone())
            .collect();
        let without_proof: Vec<String> = sales
            .iter()
            .filter(|s| s.is_online() && !s.has_proof())
            .map(|s| s.id.clone())
            .collect();

        let statuses = self.db.trackers().statuses_for_sales(&online).await?;
        let fallbacks = self.db.proof_outbox().fallback_for(&without_proof).await?;

        let pending = pending_payments(&sales, &orders, &statuses, &fallbacks, now);
        debug!(
            sales = sales.len(),
            orders = orders.len(),
            pending = pending.len(),
            "Pending-payment queue built"
        );
        Ok(pending)
    }

    /// Rebuilds the queue every `period` and emits it.
    pub fn spawn(&self, period: Duration) -> TaskHandle {
        let queue = self.clone();
        spawn_periodic("pending_payment_queue", period, move || {
            let queue = queue.clone();
            async move {
                match queue.list().await {
                    Ok(pending) => queue.emitter.queue_refreshed(&pending),
                    Err(e) => {
                        warn!(error = %e, "Queue refresh failed");
                        queue
                            .emitter
                            .background_error("pending_payment_queue", &e.to_string(), e.is_retryable());
                    }
                }
                TickControl::Continue
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEmitter;
    use crate::testing::FakeBackend;
    use vitrina_core::{Money, PaymentMethod, PaymentProof, SaleRecord};
    use vitrina_db::DbConfig;

    fn sale(id: &str, proof: Option<&str>, created_by: Option<&str>) -> SaleRecord {
        SaleRecord {
            id: id.into(),
            sale_number: format!("V-{id}"),
            customer_name: "Ana".into(),
            payment_method: PaymentMethod::BankTransfer,
            total: Money::from_cents(1000),
            created_at: Utc::now(),
            created_by_id: created_by.map(String::from),
            payment_proof: proof.map(String::from),
        }
    }

    async fn queue(backend: Arc<FakeBackend>) -> (PendingPaymentQueue, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let offset = FixedOffset::east_opt(0).unwrap();
        (
            PendingPaymentQueue::new(backend, db.clone(), offset, Arc::new(NoOpEmitter)),
            db,
        )
    }

    fn now() -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
    }

    #[tokio::test]
    async fn test_lists_online_sales_with_proof() {
        let backend = Arc::new(FakeBackend::new());
        backend.insert_sale(sale("1", Some("data:image/png;base64,AA=="), None));
        backend.insert_sale(sale("2", None, None));
        backend.insert_sale(sale("3", Some("data:image/png;base64,AA=="), Some("staff-7")));
        let (queue, _) = queue(backend).await;

        let pending = queue.list_at(now()).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|p| p.sale.id.as_str()).collect();
        assert_eq!(ids, ["1"]);
    }

    #[tokio::test]
    async fn test_stashed_proof_used_as_fallback() {
        let backend = Arc::new(FakeBackend::new());
        backend.insert_sale(sale("2", None, None));
        let (queue, db) = queue(backend).await;

        let proof = PaymentProof::from_bytes("image/png", vec![1, 2, 3], 1024).unwrap();
        db.proof_outbox()
            .stash("2", "V-2", &proof, Utc::now())
            .await
            .unwrap();

        let pending = queue.list_at(now()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].proof, proof.to_data_url());
    }
}
