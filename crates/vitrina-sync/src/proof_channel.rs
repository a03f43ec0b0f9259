//! # Payment Proof Channel
//!
//! Delivers the customer's proof image to the backend sale.
//!
//! ## Write-Ahead Outbox
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  submit(order, mime, bytes)                                            │
//! │       │                                                                 │
//! │       ├── validate (image, ≤ max bytes)  ──fail──► error, no request   │
//! │       ▼                                                                 │
//! │  stash in proof_outbox                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PATCH payment-proof ──ok──► mark uploaded                             │
//! │       │                                                                 │
//! │       └──fail──► logged, attempt counted (customer not told)           │
//! │                                                                         │
//! │  tracker → pending_confirmation either way                             │
//! │                                                                         │
//! │  ProofOutboxProcessor (timer)                                          │
//! │    • retries stashed proofs that never reached the backend             │
//! │    • discards local copies once the backend sale shows a proof         │
//! │                                                                         │
//! │  Until discarded, the stashed copy is what the staff queue shows when  │
//! │  the backend proof field is empty.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::{SyncError, SyncResult};
use crate::events::ShopEventEmitter;
use crate::task::{spawn_periodic, TaskHandle, TickControl};
use crate::tracker::OrderTracker;
use vitrina_core::{PaymentDetails, PaymentProof, TrackerEntry, TrackerStatus};
use vitrina_db::Database;

/// Upload attempts before a stashed proof is left alone.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const BATCH_SIZE: u32 = 50;

// =============================================================================
// Proof Channel
// =============================================================================

/// Result of a proof submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProofSubmission {
    pub entry: TrackerEntry,
    /// Whether the backend accepted the upload right away. When `false` the
    /// outbox processor keeps trying.
    pub uploaded: bool,
}

#[derive(Clone)]
pub struct ProofChannel {
    backend: Arc<dyn Backend>,
    db: Database,
    tracker: OrderTracker,
    max_bytes: usize,
}

impl ProofChannel {
    pub fn new(
        backend: Arc<dyn Backend>,
        db: Database,
        tracker: OrderTracker,
        max_bytes: usize,
    ) -> Self {
        ProofChannel {
            backend,
            db,
            tracker,
            max_bytes,
        }
    }

    /// Attaches a proof image to the order and moves it to
    /// `pending_confirmation`.
    ///
    /// ## Errors
    /// - `NotReady` if the order is not waiting for a proof
    /// - `Core(ProofTooLarge | ProofNotImage | ProofEmpty)` before any request
    ///
    /// A failed upload is not an error: the proof stays stashed locally.
    pub async fn submit(
        &self,
        order_number: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<ProofSubmission> {
        let entry = self.tracker.get(order_number).await?;
        if entry.status != TrackerStatus::PendingPayment {
            return Err(SyncError::NotReady {
                order_number: order_number.to_string(),
                status: entry.status,
                reason: "a proof can only be attached while payment is pending".to_string(),
            });
        }
        if !entry.payment_method.requires_proof() {
            return Err(SyncError::NotReady {
                order_number: order_number.to_string(),
                status: entry.status,
                reason: format!("{} payments do not take a proof", entry.payment_method),
            });
        }

        let proof = PaymentProof::from_bytes(mime, bytes, self.max_bytes)?;

        let outbox = self.db.proof_outbox();
        outbox
            .stash(&entry.sale_id, order_number, &proof, Utc::now())
            .await?;

        let uploaded = match self
            .backend
            .attach_payment_proof(&entry.sale_id, &proof.to_data_url())
            .await
        {
            Ok(()) => {
                outbox.mark_uploaded(&entry.sale_id, Utc::now()).await?;
                info!(
                    order_number = %order_number,
                    size = proof.size(),
                    "Payment proof uploaded"
                );
                true
            }
            Err(e) => {
                warn!(
                    order_number = %order_number,
                    error = %e,
                    "Payment proof upload failed; kept locally for retry"
                );
                outbox
                    .mark_attempt_failed(&entry.sale_id, &e.to_string(), Utc::now())
                    .await?;
                false
            }
        };

        let details = PaymentDetails {
            method: entry.payment_method,
            amount: entry.total,
            reference: None,
            proof_mime: Some(proof.mime().to_string()),
            submitted_at: Utc::now(),
        };
        self.db
            .trackers()
            .record_payment_details(order_number, &details)
            .await?;
        self.tracker
            .advance(order_number, TrackerStatus::PendingConfirmation)
            .await?;

        Ok(ProofSubmission {
            entry: self.tracker.get(order_number).await?,
            uploaded,
        })
    }
}

// =============================================================================
// Outbox Processor
// =============================================================================

/// What one outbox pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxPass {
    pub uploaded: usize,
    pub failed: usize,
    pub discarded: usize,
}

#[derive(Clone)]
pub struct ProofOutboxProcessor {
    backend: Arc<dyn Backend>,
    db: Database,
    emitter: Arc<dyn ShopEventEmitter>,
    max_attempts: u32,
}

impl ProofOutboxProcessor {
    pub fn new(backend: Arc<dyn Backend>, db: Database, emitter: Arc<dyn ShopEventEmitter>) -> Self {
        ProofOutboxProcessor {
            backend,
            db,
            emitter,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Retries pending uploads, then drops local copies the backend no
    /// longer needs.
    pub async fn run_once(&self) -> SyncResult<OutboxPass> {
        let outbox = self.db.proof_outbox();
        let mut pass = OutboxPass::default();

        for entry in outbox.pending(BATCH_SIZE, self.max_attempts).await? {
            match self
                .backend
                .attach_payment_proof(&entry.sale_id, &entry.data_url)
                .await
            {
                Ok(()) => {
                    outbox.mark_uploaded(&entry.sale_id, Utc::now()).await?;
                    info!(
                        order_number = %entry.order_number,
                        attempts = entry.attempts + 1,
                        "Stashed proof uploaded"
                    );
                    pass.uploaded += 1;
                }
                Err(e) => {
                    outbox
                        .mark_attempt_failed(&entry.sale_id, &e.to_string(), Utc::now())
                        .await?;
                    if entry.attempts + 1 >= i64::from(self.max_attempts) {
                        error!(
                            order_number = %entry.order_number,
                            attempts = entry.attempts + 1,
                            "Giving up on proof upload"
                        );
                    }
                    pass.failed += 1;
                }
            }
        }

        let held = outbox.uploaded(BATCH_SIZE).await?;
        if !held.is_empty() {
            let sales = self.backend.list_sales().await?;
            let carrying: HashMap<&str, bool> = sales
                .iter()
                .map(|s| (s.id.as_str(), s.has_proof()))
                .collect();

            for entry in held {
                if carrying.get(entry.sale_id.as_str()).copied().unwrap_or(false)
                    && outbox.discard(&entry.sale_id).await?
                {
                    debug!(order_number = %entry.order_number, "Local proof copy discarded");
                    pass.discarded += 1;
                }
            }
        }

        Ok(pass)
    }

    pub fn spawn(&self, period: Duration) -> TaskHandle {
        let processor = self.clone();
        spawn_periodic("proof_outbox", period, move || {
            let processor = processor.clone();
            async move {
                if let Err(e) = processor.run_once().await {
                    warn!(error = %e, "Proof outbox pass failed");
                    processor
                        .emitter
                        .background_error("proof_outbox", &e.to_string(), e.is_retryable());
                }
                TickControl::Continue
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;
    use crate::events::NoOpEmitter;
    use crate::testing::{FakeBackend, Op};
    use vitrina_core::{CoreError, CreatedSale, Money, PaymentMethod, SaleRecord};
    use vitrina_db::DbConfig;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 1, 2, 3];

    async fn setup(method: PaymentMethod) -> (ProofChannel, ProofOutboxProcessor, Arc<FakeBackend>, Database) {
        let backend = Arc::new(FakeBackend::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tracker = OrderTracker::new(db.clone(), Arc::new(NoOpEmitter));

        let now = Utc::now();
        backend.insert_sale(SaleRecord {
            id: "sale-1".into(),
            sale_number: "V-0001".into(),
            customer_name: "Ana".into(),
            payment_method: method,
            total: Money::from_cents(1500),
            created_at: now,
            created_by_id: None,
            payment_proof: None,
        });
        let created = CreatedSale {
            id: "sale-1".into(),
            sale_number: "V-0001".into(),
            created_at: now,
            total: Money::from_cents(1500),
        };
        tracker
            .record(&TrackerEntry::new_for_method(&created, "Ana", method, Vec::new()))
            .await
            .unwrap();

        let channel = ProofChannel::new(backend.clone(), db.clone(), tracker, 1024);
        let processor = ProofOutboxProcessor::new(backend.clone(), db.clone(), Arc::new(NoOpEmitter));
        (channel, processor, backend, db)
    }

    #[tokio::test]
    async fn test_oversized_proof_rejected_before_any_request() {
        let (channel, _, backend, db) = setup(PaymentMethod::BankTransfer).await;

        let err = channel
            .submit("V-0001", "image/png", vec![0u8; 2048])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Core(CoreError::ProofTooLarge { .. })));
        assert_eq!(backend.total_calls(), 0);
        assert!(db.proof_outbox().get("sale-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_still_advances_and_is_retried() {
        let (channel, processor, backend, db) = setup(PaymentMethod::Wallet).await;
        backend.fail_next(Op::AttachProof, BackendErrorKind::Network);

        let submission = channel.submit("V-0001", "image/png", PNG.to_vec()).await.unwrap();
        assert!(!submission.uploaded);
        assert_eq!(submission.entry.status, TrackerStatus::PendingConfirmation);
        assert_eq!(db.proof_outbox().get("sale-1").await.unwrap().unwrap().attempts, 1);

        let pass = processor.run_once().await.unwrap();
        assert_eq!(pass.uploaded, 1);
        assert_eq!(pass.discarded, 1);
        assert!(backend.sales()[0].has_proof());
        assert!(db.proof_outbox().get("sale-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_card_orders_take_no_proof() {
        let (channel, _, _, _) = setup(PaymentMethod::Card).await;
        let err = channel
            .submit("V-0001", "image/png", PNG.to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_second_submission_refused() {
        let (channel, _, _, _) = setup(PaymentMethod::BankTransfer).await;
        channel.submit("V-0001", "image/png", PNG.to_vec()).await.unwrap();

        let err = channel
            .submit("V-0001", "image/png", PNG.to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::NotReady {
                status: TrackerStatus::PendingConfirmation,
                ..
            }
        ));
    }
}
