//! # Checkout
//!
//! Turns the customer's cart into a backend sale.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. refresh stock (best effort)      cart reconciled against backend   │
//! │  2. lock cart                        no refresh or edit interleaves    │
//! │  3. build_sale_draft                 form errors → nothing sent        │
//! │  4. POST /public/sales               failure → cart left intact        │
//! │  5. tracker entry (pending_payment)                                    │
//! │  6. clear cart                       only after step 4 succeeded       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::error::{SyncError, SyncResult};
use crate::stock_sync::StockSync;
use crate::tracker::OrderTracker;
use std::sync::Arc;
use vitrina_core::checkout::build_sale_draft;
use vitrina_core::{ContactFields, OrderLine, PaymentMethod, TrackerEntry};

#[derive(Clone)]
pub struct Checkout {
    backend: Arc<dyn Backend>,
    stock: StockSync,
    tracker: OrderTracker,
}

impl Checkout {
    pub fn new(backend: Arc<dyn Backend>, stock: StockSync, tracker: OrderTracker) -> Self {
        Checkout {
            backend,
            stock,
            tracker,
        }
    }

    /// Submits the current cart as an online sale.
    ///
    /// Returns the new tracker entry, always in `pending_payment`: proof
    /// methods continue with [`crate::ProofChannel::submit`], card with
    /// [`OrderTracker::simulate_card_payment`].
    ///
    /// ## Errors
    /// - `Core(EmptyCart)` / `Core(Form(..))`: rejected locally, cart intact
    /// - `Backend(..)`: the sale was not created, cart intact
    /// - `UntrackedSale`: the sale exists on the backend, cart cleared
    pub async fn submit(
        &self,
        contact: &ContactFields,
        payment_method: PaymentMethod,
    ) -> SyncResult<TrackerEntry> {
        if let Some(changes) = self.stock.refresh().await {
            if changes.affects_selection() {
                info!(
                    removed = changes.removed.len(),
                    adjusted = changes.adjusted.len(),
                    "Cart adjusted before checkout"
                );
            }
        }

        let _guard = self.stock.lock_cart().await;
        let cart = self.stock.load().await?;
        let draft = build_sale_draft(&cart, contact, payment_method)?;

        let created = match self.backend.create_sale(&draft).await {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, lines = draft.details.len(), "Sale submission failed");
                return Err(e.into());
            }
        };
        info!(
            sale_id = %created.id,
            order_number = %created.sale_number,
            total = %created.total,
            method = %payment_method,
            "Sale created"
        );

        let entry = TrackerEntry::new_for_method(
            &created,
            draft.customer_name.as_str(),
            payment_method,
            OrderLine::from_cart(&cart),
        );

        // The sale exists on the backend now; the cart goes regardless.
        let recorded = self.tracker.record(&entry).await;
        self.stock.clear_locked().await?;

        if let Err(e) = recorded {
            error!(
                order_number = %entry.order_number,
                sale_id = %entry.sale_id,
                error = %e,
                "Sale created but tracker entry could not be stored"
            );
            return Err(SyncError::UntrackedSale {
                order_number: entry.order_number,
                sale_id: entry.sale_id,
                reason: e.to_string(),
            });
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;
    use crate::events::NoOpEmitter;
    use crate::testing::{FakeBackend, Op};
    use rust_decimal::Decimal;
    use vitrina_core::{CoreError, CreatedSale, Money, ProductSnapshot, TrackerStatus};
    use vitrina_db::{Database, DbConfig};

    async fn setup() -> (Checkout, StockSync, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new());
        backend.set_products(vec![ProductSnapshot::new("A", "Mate", 900, Decimal::from(5))]);
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stock = StockSync::new(backend.clone(), db.clone(), "s1", Arc::new(NoOpEmitter));
        let tracker = OrderTracker::new(db, Arc::new(NoOpEmitter));
        stock.refresh().await.unwrap();
        (
            Checkout::new(backend.clone(), stock.clone(), tracker),
            stock,
            backend,
        )
    }

    fn contact() -> ContactFields {
        ContactFields {
            name: "Ana".into(),
            phone: "555-0101".into(),
            address: "Calle 1".into(),
            document_id: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_submit_clears_cart_and_tracks_order() {
        let (checkout, stock, backend) = setup().await;
        stock.add_to_cart("A").await.unwrap();

        let entry = checkout
            .submit(&contact(), PaymentMethod::BankTransfer)
            .await
            .unwrap();

        assert_eq!(entry.status, TrackerStatus::PendingPayment);
        assert_eq!(entry.lines.len(), 1);
        assert_eq!(backend.sales().len(), 1);
        assert!(stock.cart().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_form_sends_nothing() {
        let (checkout, stock, backend) = setup().await;
        stock.add_to_cart("A").await.unwrap();

        let err = checkout
            .submit(&ContactFields::default(), PaymentMethod::Wallet)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Core(CoreError::Form(_))));
        assert_eq!(backend.calls(Op::CreateSale), 0);
        assert_eq!(stock.cart().await.unwrap().item_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_cart() {
        let (checkout, stock, backend) = setup().await;
        stock.add_to_cart("A").await.unwrap();
        let before = stock.cart().await.unwrap();

        backend.fail_next(Op::CreateSale, BackendErrorKind::Network);
        assert!(checkout.submit(&contact(), PaymentMethod::Card).await.is_err());

        assert_eq!(stock.cart().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_untracked_sale_reports_order_number() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_products(vec![ProductSnapshot::new("A", "Mate", 900, Decimal::from(5))]);
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stock = StockSync::new(backend.clone(), db.clone(), "s1", Arc::new(NoOpEmitter));
        let tracker = OrderTracker::new(db, Arc::new(NoOpEmitter));
        stock.refresh().await.unwrap();

        // Occupy the number the backend hands out next.
        let stale = CreatedSale {
            id: "old".into(),
            sale_number: "V-0001".into(),
            created_at: chrono::Utc::now(),
            total: Money::from_cents(100),
        };
        tracker
            .record(&TrackerEntry::new_for_method(&stale, "Old", PaymentMethod::Wallet, Vec::new()))
            .await
            .unwrap();

        let checkout = Checkout::new(backend.clone(), stock.clone(), tracker);
        stock.add_to_cart("A").await.unwrap();
        let err = checkout
            .submit(&contact(), PaymentMethod::BankTransfer)
            .await
            .unwrap_err();

        match err {
            SyncError::UntrackedSale {
                order_number,
                sale_id,
                ..
            } => {
                assert_eq!(order_number, "V-0001");
                assert_eq!(sale_id, backend.sales()[0].id);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(stock.cart().await.unwrap().is_empty());
    }
}
