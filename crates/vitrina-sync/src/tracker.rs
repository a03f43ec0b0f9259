//! # Order Tracker
//!
//! Service over the local tracker store. Every status change on this device
//! goes through [`OrderTracker::advance`] or
//! [`OrderTracker::record_staff_decision`], which is where the UI
//! notification and the one-time receipt are produced.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  pending_payment ──proof / card──► pending_confirmation                 │
//! │        │                               │            │                   │
//! │        │                        staff confirms   staff rejects          │
//! │        │                               ▼            ▼                   │
//! │        └──────────────────────────► confirmed    rejected               │
//! │                                        │                                │
//! │                                        └──► receipt (exactly once)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::ShopEventEmitter;
use vitrina_core::{
    Money, PaymentDetails, Receipt, SaleRecord, StaffDecision, TrackerEntry, TrackerStatus,
};
use vitrina_db::Database;

#[derive(Clone)]
pub struct OrderTracker {
    db: Database,
    emitter: Arc<dyn ShopEventEmitter>,
}

impl OrderTracker {
    pub fn new(db: Database, emitter: Arc<dyn ShopEventEmitter>) -> Self {
        OrderTracker { db, emitter }
    }

    /// Stores a fresh entry and announces it.
    pub async fn record(&self, entry: &TrackerEntry) -> SyncResult<()> {
        self.db.trackers().insert_new(entry).await?;
        self.emitter.order_status_changed(entry);
        Ok(())
    }

    pub async fn get(&self, order_number: &str) -> SyncResult<TrackerEntry> {
        self.db
            .trackers()
            .get(order_number)
            .await?
            .ok_or_else(|| SyncError::OrderNotFound(order_number.to_string()))
    }

    pub async fn find(&self, order_number: &str) -> SyncResult<Option<TrackerEntry>> {
        Ok(self.db.trackers().get(order_number).await?)
    }

    pub async fn find_by_sale(&self, sale_id: &str) -> SyncResult<Option<TrackerEntry>> {
        Ok(self.db.trackers().get_by_sale(sale_id).await?)
    }

    /// Moves the order forward to `to`.
    ///
    /// Returns `true` for the one call that made the change; that call also
    /// emits the status event and, for `confirmed`, the receipt. Any other
    /// call (repeat, stale, backwards) returns `false` and does nothing.
    pub async fn advance(&self, order_number: &str, to: TrackerStatus) -> SyncResult<bool> {
        let changed = self
            .db
            .trackers()
            .transition(order_number, to, Utc::now())
            .await?;

        if changed {
            self.after_change(order_number).await?;
        }
        Ok(changed)
    }

    /// Records a staff decision for a backend sale, mirroring it locally if
    /// the sale was never tracked here. Same exactly-once contract as
    /// [`OrderTracker::advance`].
    pub async fn record_staff_decision(
        &self,
        sale: &SaleRecord,
        decision: StaffDecision,
    ) -> SyncResult<bool> {
        let changed = self
            .db
            .trackers()
            .upsert_staff_decision(sale, decision, Utc::now())
            .await?;

        if changed {
            self.after_change(&sale.sale_number).await?;
        }
        Ok(changed)
    }

    /// Completes a simulated card charge and moves the order to
    /// `pending_confirmation`.
    ///
    /// The amount is checked before anything is written.
    pub async fn simulate_card_payment(
        &self,
        order_number: &str,
        amount: Money,
        reference: Option<String>,
    ) -> SyncResult<TrackerEntry> {
        let entry = self.get(order_number).await?;
        entry.check_card_payment(amount)?;

        let details = PaymentDetails {
            method: entry.payment_method,
            amount,
            reference,
            proof_mime: None,
            submitted_at: Utc::now(),
        };
        self.db
            .trackers()
            .record_payment_details(order_number, &details)
            .await?;

        if !self
            .advance(order_number, TrackerStatus::PendingConfirmation)
            .await?
        {
            warn!(order_number = %order_number, "Card payment recorded but order already moved on");
        }

        self.get(order_number).await
    }

    /// Orders waiting for staff, oldest first. Used to resume pollers.
    pub async fn awaiting_confirmation(&self) -> SyncResult<Vec<TrackerEntry>> {
        Ok(self
            .db
            .trackers()
            .list_by_status(TrackerStatus::PendingConfirmation)
            .await?)
    }

    /// Issues the receipt if this is the first call to do so.
    pub async fn issue_receipt(&self, order_number: &str) -> SyncResult<Option<Receipt>> {
        if !self
            .db
            .trackers()
            .claim_receipt(order_number, Utc::now())
            .await?
        {
            return Ok(None);
        }

        let entry = self.get(order_number).await?;
        let receipt = Receipt::for_entry(&entry)?;
        info!(
            order_number = %order_number,
            total = %receipt.total,
            "Receipt issued"
        );
        self.emitter.receipt_ready(&receipt);
        Ok(Some(receipt))
    }

    async fn after_change(&self, order_number: &str) -> SyncResult<()> {
        let entry = self.get(order_number).await?;
        self.emitter.order_status_changed(&entry);

        if entry.status == TrackerStatus::Confirmed {
            self.issue_receipt(order_number).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEmitter;
    use crate::events::ShopEvent;
    use vitrina_core::{CoreError, CreatedSale, PaymentMethod};
    use vitrina_db::DbConfig;

    async fn tracker() -> (OrderTracker, Arc<RecordingEmitter>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let emitter = Arc::new(RecordingEmitter::default());
        (OrderTracker::new(db, emitter.clone()), emitter)
    }

    fn entry(method: PaymentMethod) -> TrackerEntry {
        let created = CreatedSale {
            id: "sale-1".into(),
            sale_number: "V-0001".into(),
            created_at: Utc::now(),
            total: Money::from_cents(4200),
        };
        TrackerEntry::new_for_method(&created, "Ana", method, Vec::new())
    }

    #[tokio::test]
    async fn test_card_payment_moves_to_pending_confirmation() {
        let (tracker, _) = tracker().await;
        tracker.record(&entry(PaymentMethod::Card)).await.unwrap();

        let updated = tracker
            .simulate_card_payment("V-0001", Money::from_cents(4200), Some("AUTH-9".into()))
            .await
            .unwrap();

        assert_eq!(updated.status, TrackerStatus::PendingConfirmation);
        assert_eq!(
            updated.payment_details.unwrap().reference.as_deref(),
            Some("AUTH-9")
        );
    }

    #[tokio::test]
    async fn test_card_payment_rejects_wrong_amount_without_writing() {
        let (tracker, _) = tracker().await;
        tracker.record(&entry(PaymentMethod::Card)).await.unwrap();

        let err = tracker
            .simulate_card_payment("V-0001", Money::from_cents(100), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Core(CoreError::InvalidPaymentAmount { .. })
        ));

        let stored = tracker.get("V-0001").await.unwrap();
        assert_eq!(stored.status, TrackerStatus::PendingPayment);
        assert!(stored.payment_details.is_none());
    }

    #[tokio::test]
    async fn test_card_payment_refused_for_proof_methods() {
        let (tracker, _) = tracker().await;
        tracker.record(&entry(PaymentMethod::BankTransfer)).await.unwrap();

        let err = tracker
            .simulate_card_payment("V-0001", Money::from_cents(4200), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::MethodNotInstant { .. })));
    }

    #[tokio::test]
    async fn test_confirm_issues_one_receipt() {
        let (tracker, emitter) = tracker().await;
        tracker.record(&entry(PaymentMethod::Wallet)).await.unwrap();

        assert!(tracker.advance("V-0001", TrackerStatus::Confirmed).await.unwrap());
        assert!(!tracker.advance("V-0001", TrackerStatus::Confirmed).await.unwrap());
        assert_eq!(tracker.issue_receipt("V-0001").await.unwrap(), None);

        let receipts = emitter
            .events()
            .into_iter()
            .filter(|e| matches!(e, ShopEvent::ReceiptReady { .. }))
            .count();
        assert_eq!(receipts, 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (tracker, _) = tracker().await;
        assert!(matches!(
            tracker.get("V-404").await.unwrap_err(),
            SyncError::OrderNotFound(_)
        ));
    }
}
