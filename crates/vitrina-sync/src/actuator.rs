//! # Confirmation Actuator
//!
//! Staff decisions on pending online sales.
//!
//! ## Confirm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  rejected on this desk          → AlreadyRejected (no request sent)    │
//! │                                                                         │
//! │  PATCH /sales/{id}/confirm-online                                      │
//! │       │                                                                 │
//! │       ├── ok                    → Confirmed                            │
//! │       ├── AlreadyConfirmed      → AlreadyConfirmed (success, no error) │
//! │       ├── SaleNotOnline         → NotOnline (no-op, nothing recorded)  │
//! │       └── anything else         → error, sale stays in the queue       │
//! │                                                                         │
//! │  Confirmed / AlreadyConfirmed:                                         │
//! │       tracker → confirmed (exactly once) + ConfirmationBus event       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reject
//! Local only: there is no backend reject verb. The rejection is recorded
//! in the tracker, which hides the sale from this device's queue, and
//! published on the bus.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::bus::{ConfirmationBus, ConfirmationEvent};
use crate::error::{BackendErrorKind, SyncError, SyncResult};
use crate::tracker::OrderTracker;
use vitrina_core::{OrderRecord, SaleRecord, StaffDecision, TrackerStatus};

/// What a confirm call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call created the backend order.
    Confirmed { order: OrderRecord },
    /// Someone else had already confirmed; the local record caught up.
    AlreadyConfirmed,
    /// The sale was rung in store. Nothing to confirm.
    NotOnline,
    /// This desk already rejected the sale. The decision stands.
    AlreadyRejected,
}

impl ConfirmOutcome {
    /// Whether the sale is now confirmed on the backend.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ConfirmOutcome::Confirmed { .. } | ConfirmOutcome::AlreadyConfirmed
        )
    }
}

/// Result of a reject call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RejectOutcome {
    /// `false` when the sale was already decided locally.
    pub recorded: bool,
}

#[derive(Clone)]
pub struct ConfirmationActuator {
    backend: Arc<dyn Backend>,
    tracker: OrderTracker,
    bus: ConfirmationBus,
}

impl ConfirmationActuator {
    pub fn new(backend: Arc<dyn Backend>, tracker: OrderTracker, bus: ConfirmationBus) -> Self {
        ConfirmationActuator {
            backend,
            tracker,
            bus,
        }
    }

    /// Confirms an online sale. Safe to repeat.
    ///
    /// A sale this desk already rejected is never sent to the backend.
    pub async fn confirm(&self, sale: &SaleRecord) -> SyncResult<ConfirmOutcome> {
        if let Some(entry) = self.tracker.find_by_sale(&sale.id).await? {
            if entry.status == TrackerStatus::Rejected {
                warn!(
                    sale_id = %sale.id,
                    order_number = %sale.sale_number,
                    "Sale already rejected; confirmation not sent"
                );
                return Ok(ConfirmOutcome::AlreadyRejected);
            }
        }

        let outcome = match self.backend.confirm_online(&sale.id).await {
            Ok(order) => {
                info!(
                    sale_id = %sale.id,
                    order_number = %sale.sale_number,
                    order_id = %order.id,
                    "Sale confirmed"
                );
                ConfirmOutcome::Confirmed { order }
            }
            Err(e) if e.kind == BackendErrorKind::AlreadyConfirmed => {
                info!(
                    sale_id = %sale.id,
                    order_number = %sale.sale_number,
                    "Sale was already confirmed"
                );
                ConfirmOutcome::AlreadyConfirmed
            }
            Err(e) if e.kind == BackendErrorKind::SaleNotOnline => {
                info!(sale_id = %sale.id, "Sale is not an online sale; nothing to confirm");
                return Ok(ConfirmOutcome::NotOnline);
            }
            Err(e) => {
                warn!(sale_id = %sale.id, error = %e, "Confirmation failed");
                return Err(e.into());
            }
        };

        self.record(sale, StaffDecision::Confirmed).await?;
        Ok(outcome)
    }

    /// Records a rejection on this device.
    pub async fn reject(&self, sale: &SaleRecord) -> SyncResult<RejectOutcome> {
        let recorded = self.record(sale, StaffDecision::Rejected).await?;
        if recorded {
            info!(sale_id = %sale.id, order_number = %sale.sale_number, "Sale rejected");
        } else {
            warn!(
                sale_id = %sale.id,
                order_number = %sale.sale_number,
                "Sale already decided; rejection not recorded"
            );
        }
        Ok(RejectOutcome { recorded })
    }

    pub async fn confirm_by_id(&self, sale_id: &str) -> SyncResult<ConfirmOutcome> {
        let sale = self.lookup(sale_id).await?;
        self.confirm(&sale).await
    }

    pub async fn reject_by_id(&self, sale_id: &str) -> SyncResult<RejectOutcome> {
        let sale = self.lookup(sale_id).await?;
        self.reject(&sale).await
    }

    async fn lookup(&self, sale_id: &str) -> SyncResult<SaleRecord> {
        self.backend
            .find_sale(sale_id)
            .await?
            .ok_or_else(|| SyncError::SaleNotFound(sale_id.to_string()))
    }

    async fn record(&self, sale: &SaleRecord, decision: StaffDecision) -> SyncResult<bool> {
        let changed = self.tracker.record_staff_decision(sale, decision).await?;

        // Published even when unchanged: a poller may have subscribed after
        // the first event.
        self.bus.publish(ConfirmationEvent {
            sale_id: sale.id.clone(),
            order_number: sale.sale_number.clone(),
            outcome: decision,
            at: Utc::now(),
        });
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;
    use crate::events::NoOpEmitter;
    use crate::testing::{FakeBackend, Op};
    use vitrina_core::{Money, PaymentMethod};
    use vitrina_db::{Database, DbConfig};

    fn sale(id: &str, created_by: Option<&str>) -> SaleRecord {
        SaleRecord {
            id: id.into(),
            sale_number: format!("V-{id}"),
            customer_name: "Ana".into(),
            payment_method: PaymentMethod::BankTransfer,
            total: Money::from_cents(2500),
            created_at: Utc::now(),
            created_by_id: created_by.map(String::from),
            payment_proof: Some("data:image/png;base64,AA==".into()),
        }
    }

    async fn setup() -> (ConfirmationActuator, OrderTracker, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tracker = OrderTracker::new(db, Arc::new(NoOpEmitter));
        let actuator =
            ConfirmationActuator::new(backend.clone(), tracker.clone(), ConfirmationBus::default());
        (actuator, tracker, backend)
    }

    #[tokio::test]
    async fn test_not_online_is_a_no_op() {
        let (actuator, tracker, backend) = setup().await;
        let s = sale("1", Some("staff-2"));
        backend.insert_sale(s.clone());

        assert_eq!(actuator.confirm(&s).await.unwrap(), ConfirmOutcome::NotOnline);
        assert!(tracker.find_by_sale("1").await.unwrap().is_none());
        assert!(backend.orders().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces() {
        let (actuator, tracker, backend) = setup().await;
        let s = sale("1", None);
        backend.insert_sale(s.clone());
        backend.fail_next(Op::ConfirmOnline, BackendErrorKind::Timeout);

        let err = actuator.confirm(&s).await.unwrap_err();
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::Timeout));
        assert!(tracker.find_by_sale("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_is_local_and_final() {
        let (actuator, tracker, backend) = setup().await;
        let s = sale("1", None);
        backend.insert_sale(s.clone());

        assert!(actuator.reject(&s).await.unwrap().recorded);
        assert_eq!(backend.calls(Op::ConfirmOnline), 0);
        assert_eq!(
            tracker.find_by_sale("1").await.unwrap().unwrap().status,
            TrackerStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_confirm_after_reject_sends_nothing() {
        let (actuator, tracker, backend) = setup().await;
        let s = sale("1", None);
        backend.insert_sale(s.clone());
        actuator.reject(&s).await.unwrap();

        let outcome = actuator.confirm_by_id("1").await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::AlreadyRejected);
        assert!(!outcome.is_confirmed());
        assert_eq!(backend.calls(Op::ConfirmOnline), 0);
        assert!(backend.orders().is_empty());
        assert_eq!(
            tracker.find_by_sale("1").await.unwrap().unwrap().status,
            TrackerStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_unknown_sale_id() {
        let (actuator, _, _) = setup().await;
        assert!(matches!(
            actuator.confirm_by_id("nope").await.unwrap_err(),
            SyncError::SaleNotFound(_)
        ));
    }
}
