//! # Confirmation Poller
//!
//! Watches one order in `pending_confirmation` until staff decide.
//!
//! ## Signals, Checked In Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tick                                                                   │
//! │   │                                                                     │
//! │   ├─ (a) local tracker already terminal?       ──yes──► stop           │
//! │   │      (a staff action on this device got there first)               │
//! │   │                                                                     │
//! │   ├─ (b) ConfirmationBus event for this sale?  ──yes──► advance, stop  │
//! │   │                                                                     │
//! │   └─ (c) backend order references the sale?    ──yes──► confirm, stop  │
//! │          (failure = still pending, next tick retries)                  │
//! │                                                                         │
//! │  Once terminal the poller makes no further requests.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Several signals can fire for the same decision. Only the first
//! [`OrderTracker::advance`] wins, so the success event and the receipt are
//! produced once however many ticks or events observe it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::bus::{ConfirmationBus, ConfirmationEvent};
use crate::error::{SyncError, SyncResult};
use crate::task::{spawn_periodic, TaskHandle, TickControl};
use crate::tracker::OrderTracker;
use vitrina_core::{StaffDecision, TrackerStatus};

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Pending,
    Terminal(TrackerStatus),
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollOutcome::Terminal(_))
    }
}

pub struct ConfirmationPoller {
    backend: Arc<dyn Backend>,
    tracker: OrderTracker,
    events: broadcast::Receiver<ConfirmationEvent>,
    order_number: String,
    sale_id: String,
    finished: Option<TrackerStatus>,
}

impl ConfirmationPoller {
    /// Starts watching `order_number`.
    ///
    /// ## Errors
    /// `NotReady` unless the order is in `pending_confirmation`; an order
    /// still waiting for its proof or card payment is not polled.
    pub async fn start(
        backend: Arc<dyn Backend>,
        tracker: OrderTracker,
        bus: &ConfirmationBus,
        order_number: &str,
    ) -> SyncResult<Self> {
        // Subscribe before reading so no event published in between is lost.
        let events = bus.subscribe();
        let entry = tracker.get(order_number).await?;

        if !entry.awaits_confirmation() {
            return Err(SyncError::NotReady {
                order_number: order_number.to_string(),
                status: entry.status,
                reason: "only orders awaiting confirmation are polled".to_string(),
            });
        }

        debug!(order_number = %order_number, sale_id = %entry.sale_id, "Poller started");
        Ok(ConfirmationPoller {
            backend,
            tracker,
            events,
            order_number: entry.order_number,
            sale_id: entry.sale_id,
            finished: None,
        })
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Checks every signal once.
    pub async fn tick(&mut self) -> SyncResult<PollOutcome> {
        if let Some(status) = self.finished {
            return Ok(PollOutcome::Terminal(status));
        }

        // (a) local tracker
        if let Some(outcome) = self.check_local().await? {
            return Ok(outcome);
        }

        // (b) staff decisions published on this device
        if let Some(decision) = self.drain_bus() {
            self.tracker
                .advance(&self.order_number, decision.status())
                .await?;
            if let Some(outcome) = self.check_local().await? {
                return Ok(outcome);
            }
        }

        // (c) backend order
        match self.backend.find_order_for_sale(&self.sale_id).await {
            Ok(Some(order)) => {
                info!(
                    order_number = %self.order_number,
                    order_id = %order.id,
                    "Backend order found"
                );
                self.tracker
                    .advance(&self.order_number, TrackerStatus::Confirmed)
                    .await?;
                Ok(self.check_local().await?.unwrap_or(PollOutcome::Pending))
            }
            Ok(None) => Ok(PollOutcome::Pending),
            Err(e) => {
                debug!(order_number = %self.order_number, error = %e, "Order lookup failed");
                Ok(PollOutcome::Pending)
            }
        }
    }

    async fn check_local(&mut self) -> SyncResult<Option<PollOutcome>> {
        let entry = self.tracker.get(&self.order_number).await?;
        if entry.status.is_terminal() {
            info!(order_number = %self.order_number, status = %entry.status, "Polling finished");
            self.finished = Some(entry.status);
            return Ok(Some(PollOutcome::Terminal(entry.status)));
        }
        Ok(None)
    }

    /// Latest decision for this sale among the queued bus events.
    fn drain_bus(&mut self) -> Option<StaffDecision> {
        let mut decision = None;
        loop {
            match self.events.try_recv() {
                Ok(event) if event.sale_id == self.sale_id => decision = Some(event.outcome),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    debug!(order_number = %self.order_number, missed, "Poller lagged on bus");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        decision
    }

    /// Ticks every `period` until the order is terminal or the handle is
    /// dropped.
    pub fn spawn(self, period: Duration) -> TaskHandle {
        let poller = Arc::new(Mutex::new(self));
        spawn_periodic("confirmation_poller", period, move || {
            let poller = poller.clone();
            async move {
                let mut poller = poller.lock().await;
                match poller.tick().await {
                    Ok(PollOutcome::Terminal(_)) => TickControl::Stop,
                    Ok(PollOutcome::Pending) => TickControl::Continue,
                    Err(e) => {
                        warn!(order_number = %poller.order_number, error = %e, "Poll failed");
                        TickControl::Continue
                    }
                }
            }
        })
    }
}

/// Starts a poller for every order still awaiting confirmation, e.g. after
/// an app restart.
pub async fn resume_pending(
    backend: Arc<dyn Backend>,
    tracker: OrderTracker,
    bus: &ConfirmationBus,
    period: Duration,
) -> SyncResult<Vec<TaskHandle>> {
    let mut handles = Vec::new();
    for entry in tracker.awaiting_confirmation().await? {
        let poller =
            ConfirmationPoller::start(backend.clone(), tracker.clone(), bus, &entry.order_number)
                .await?;
        handles.push(poller.spawn(period));
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;
    use crate::events::NoOpEmitter;
    use crate::testing::{FakeBackend, Op};
    use chrono::Utc;
    use vitrina_core::{CreatedSale, Money, PaymentMethod, SaleRecord, TrackerEntry};
    use vitrina_db::{Database, DbConfig};

    async fn setup() -> (Arc<FakeBackend>, OrderTracker, ConfirmationBus) {
        let backend = Arc::new(FakeBackend::new());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tracker = OrderTracker::new(db, Arc::new(NoOpEmitter));

        let now = Utc::now();
        backend.insert_sale(SaleRecord {
            id: "sale-1".into(),
            sale_number: "V-0001".into(),
            customer_name: "Ana".into(),
            payment_method: PaymentMethod::Wallet,
            total: Money::from_cents(700),
            created_at: now,
            created_by_id: None,
            payment_proof: Some("data:image/png;base64,AA==".into()),
        });
        let created = CreatedSale {
            id: "sale-1".into(),
            sale_number: "V-0001".into(),
            created_at: now,
            total: Money::from_cents(700),
        };
        tracker
            .record(&TrackerEntry::new_for_method(
                &created,
                "Ana",
                PaymentMethod::Wallet,
                Vec::new(),
            ))
            .await
            .unwrap();

        (backend, tracker, ConfirmationBus::default())
    }

    #[tokio::test]
    async fn test_not_started_while_payment_pending() {
        let (backend, tracker, bus) = setup().await;
        let err = ConfirmationPoller::start(backend, tracker, &bus, "V-0001")
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SyncError::NotReady {
                status: TrackerStatus::PendingPayment,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_order_confirms_once() {
        let (backend, tracker, bus) = setup().await;
        tracker
            .advance("V-0001", TrackerStatus::PendingConfirmation)
            .await
            .unwrap();
        let mut poller = ConfirmationPoller::start(backend.clone(), tracker.clone(), &bus, "V-0001")
            .await
            .unwrap();

        assert_eq!(poller.tick().await.unwrap(), PollOutcome::Pending);

        backend.confirm_online("sale-1").await.unwrap();
        assert_eq!(
            poller.tick().await.unwrap(),
            PollOutcome::Terminal(TrackerStatus::Confirmed)
        );

        let calls = backend.calls(Op::ListOrders);
        poller.tick().await.unwrap();
        assert_eq!(backend.calls(Op::ListOrders), calls);
    }

    #[tokio::test]
    async fn test_bus_rejection_is_picked_up() {
        let (backend, tracker, bus) = setup().await;
        tracker
            .advance("V-0001", TrackerStatus::PendingConfirmation)
            .await
            .unwrap();
        let mut poller = ConfirmationPoller::start(backend.clone(), tracker, &bus, "V-0001")
            .await
            .unwrap();

        bus.publish(ConfirmationEvent {
            sale_id: "sale-1".into(),
            order_number: "V-0001".into(),
            outcome: StaffDecision::Rejected,
            at: Utc::now(),
        });

        assert_eq!(
            poller.tick().await.unwrap(),
            PollOutcome::Terminal(TrackerStatus::Rejected)
        );
        assert_eq!(backend.calls(Op::ListOrders), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_polling() {
        let (backend, tracker, bus) = setup().await;
        tracker
            .advance("V-0001", TrackerStatus::PendingConfirmation)
            .await
            .unwrap();
        let mut poller = ConfirmationPoller::start(backend.clone(), tracker, &bus, "V-0001")
            .await
            .unwrap();

        backend.fail_next(Op::ListOrders, BackendErrorKind::Network);
        assert_eq!(poller.tick().await.unwrap(), PollOutcome::Pending);
        assert!(!poller.is_finished());
    }
}
