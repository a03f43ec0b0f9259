//! # Confirmation Bus
//!
//! In-process topic for staff decisions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ConfirmationActuator ──publish──► ConfirmationBus (broadcast)         │
//! │                                        │                                │
//! │                                        ├──► ConfirmationPoller V-0041  │
//! │                                        └──► ConfirmationPoller V-0042  │
//! │                                                                         │
//! │  Each poller keeps the events for its own sale id. Delivery is best    │
//! │  effort: a lagging receiver may miss events, which is fine because     │
//! │  the poller's backend check still finds the order on a later tick.     │
//! │  Duplicate deliveries are absorbed by the tracker's exactly-once       │
//! │  transition.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use vitrina_core::StaffDecision;

const DEFAULT_CAPACITY: usize = 256;

/// A staff decision on one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationEvent {
    pub sale_id: String,
    pub order_number: String,
    pub outcome: StaffDecision,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConfirmationBus {
    tx: broadcast::Sender<ConfirmationEvent>,
}

impl Default for ConfirmationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConfirmationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ConfirmationBus { tx }
    }

    /// Publishes `event`. Returns how many subscribers received it; zero
    /// subscribers is not an error.
    pub fn publish(&self, event: ConfirmationEvent) -> usize {
        let sale_id = event.sale_id.clone();
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(sale_id = %sale_id, delivered, "Confirmation event published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
