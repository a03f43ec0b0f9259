//! # Shop Events
//!
//! UI-facing notifications. The services call a [`ShopEventEmitter`]; the
//! app decides where the events go (frontend bridge, log, test recorder).

use serde::Serialize;
use tracing::{info, warn};

use vitrina_core::{Cart, CartChanges, PendingPayment, Receipt, TrackerEntry};

/// A notification, in serialisable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShopEvent {
    CartChanged {
        session_id: String,
        cart: Cart,
        changes: CartChanges,
    },
    OrderStatusChanged {
        entry: TrackerEntry,
    },
    ReceiptReady {
        receipt: Receipt,
    },
    QueueRefreshed {
        pending: Vec<PendingPayment>,
    },
    BackgroundError {
        task: String,
        message: String,
        retryable: bool,
    },
}

/// Receives notifications from the services.
pub trait ShopEventEmitter: Send + Sync {
    /// The stored cart changed. `changes` is empty for a user mutation and
    /// describes removals and clamps for a stock refresh.
    fn cart_changed(&self, session_id: &str, cart: &Cart, changes: &CartChanges);

    fn order_status_changed(&self, entry: &TrackerEntry);

    /// Fired once per confirmed order.
    fn receipt_ready(&self, receipt: &Receipt);

    fn queue_refreshed(&self, pending: &[PendingPayment]);

    /// A background task failed and will retry on its next tick.
    fn background_error(&self, task: &str, message: &str, retryable: bool);
}

/// No-op emitter.
pub struct NoOpEmitter;

impl ShopEventEmitter for NoOpEmitter {
    fn cart_changed(&self, _session_id: &str, _cart: &Cart, _changes: &CartChanges) {}
    fn order_status_changed(&self, _entry: &TrackerEntry) {}
    fn receipt_ready(&self, _receipt: &Receipt) {}
    fn queue_refreshed(&self, _pending: &[PendingPayment]) {}
    fn background_error(&self, _task: &str, _message: &str, _retryable: bool) {}
}

/// Writes every event to the log. Used by the CLI's `watch` mode.
pub struct TracingEmitter;

impl ShopEventEmitter for TracingEmitter {
    fn cart_changed(&self, session_id: &str, cart: &Cart, changes: &CartChanges) {
        info!(
            session_id = %session_id,
            items = cart.item_count(),
            total = %cart.total(),
            removed = changes.removed.len(),
            adjusted = changes.adjusted.len(),
            "Cart changed"
        );
    }

    fn order_status_changed(&self, entry: &TrackerEntry) {
        info!(
            order_number = %entry.order_number,
            status = %entry.status,
            "Order status changed"
        );
    }

    fn receipt_ready(&self, receipt: &Receipt) {
        info!(
            order_number = %receipt.order_number,
            total = %receipt.total,
            "Receipt ready"
        );
    }

    fn queue_refreshed(&self, pending: &[PendingPayment]) {
        info!(pending = pending.len(), "Pending-payment queue refreshed");
    }

    fn background_error(&self, task: &str, message: &str, retryable: bool) {
        warn!(task = %task, retryable, "{}", message);
    }
}
