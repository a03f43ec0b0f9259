//! # Test Doubles
//!
//! An in-memory [`Backend`] and a recording [`ShopEventEmitter`], shared by
//! the unit tests, the integration tests and the desk's command tests.
//! Compiled only for tests or with the `testing` feature.
//!
//! `FakeBackend` behaves like the real API where the protocol depends on it:
//! sales are checked against stock on creation, and `confirm_online` creates
//! at most one order per sale.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{BackendError, BackendErrorKind, BackendResult};
use crate::events::{ShopEvent, ShopEventEmitter};
use vitrina_core::{
    Cart, CartChanges, CreatedSale, OrderRecord, PendingPayment, ProductSnapshot, Receipt,
    SaleDraft, SaleRecord, TrackerEntry,
};
use vitrina_core::checkout::SaleDraftLine;

/// Backend operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListProducts,
    CreateSale,
    AttachProof,
    ListSales,
    ListOrders,
    ConfirmOnline,
}

#[derive(Default)]
struct FakeState {
    products: Vec<ProductSnapshot>,
    sales: Vec<SaleRecord>,
    orders: Vec<OrderRecord>,
    sale_lines: HashMap<String, Vec<SaleDraftLine>>,
    next_number: u32,
    failures: HashMap<Op, Vec<BackendErrorKind>>,
    calls: HashMap<Op, usize>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    /// Counts the call and pops an injected failure, if any.
    fn enter(&self, op: Op) -> BackendResult<()> {
        self.with_state(|s| {
            *s.calls.entry(op).or_default() += 1;
            match s.failures.get_mut(&op) {
                Some(queue) if !queue.is_empty() => {
                    let kind = queue.remove(0);
                    Err(BackendError::new(kind, format!("injected failure for {op:?}")))
                }
                _ => Ok(()),
            }
        })
    }

    // =========================================================================
    // Setup
    // =========================================================================

    pub fn set_products(&self, products: Vec<ProductSnapshot>) {
        self.with_state(|s| s.products = products);
    }

    pub fn set_stock(&self, product_id: &str, stock: Decimal) {
        self.with_state(|s| {
            if let Some(p) = s.products.iter_mut().find(|p| p.id == product_id) {
                p.stock = stock;
            }
        });
    }

    pub fn deactivate(&self, product_id: &str) {
        self.with_state(|s| {
            if let Some(p) = s.products.iter_mut().find(|p| p.id == product_id) {
                p.is_active = false;
            }
        });
    }

    /// Adds a sale directly, e.g. an in-store sale with `created_by_id` set.
    pub fn insert_sale(&self, sale: SaleRecord) {
        self.with_state(|s| s.sales.push(sale));
    }

    /// Queues `kind` as the result of the next call to `op`.
    pub fn fail_next(&self, op: Op, kind: BackendErrorKind) {
        self.with_state(|s| s.failures.entry(op).or_default().push(kind));
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn products(&self) -> Vec<ProductSnapshot> {
        self.with_state(|s| s.products.clone())
    }

    pub fn sales(&self) -> Vec<SaleRecord> {
        self.with_state(|s| s.sales.clone())
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.with_state(|s| s.orders.clone())
    }

    pub fn calls(&self, op: Op) -> usize {
        self.with_state(|s| s.calls.get(&op).copied().unwrap_or(0))
    }

    pub fn total_calls(&self) -> usize {
        self.with_state(|s| s.calls.values().sum())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_products(&self) -> BackendResult<Vec<ProductSnapshot>> {
        self.enter(Op::ListProducts)?;
        Ok(self.products())
    }

    async fn create_sale(&self, draft: &SaleDraft) -> BackendResult<CreatedSale> {
        self.enter(Op::CreateSale)?;
        self.with_state(|s| {
            for line in &draft.details {
                let available = s
                    .products
                    .iter()
                    .find(|p| p.id == line.product_id && p.is_active)
                    .map(|p| p.available_units())
                    .unwrap_or(0);
                if line.quantity > available {
                    return Err(BackendError::new(
                        BackendErrorKind::Rejected { status: 422 },
                        format!("insufficient stock for {}", line.product_id),
                    ));
                }
            }

            s.next_number += 1;
            let created = CreatedSale {
                id: Uuid::new_v4().to_string(),
                sale_number: format!("V-{:04}", s.next_number),
                created_at: Utc::now(),
                total: draft.total(),
            };
            s.sales.push(SaleRecord {
                id: created.id.clone(),
                sale_number: created.sale_number.clone(),
                customer_name: draft.customer_name.clone(),
                payment_method: draft.payment_method,
                total: created.total,
                created_at: created.created_at,
                created_by_id: None,
                payment_proof: None,
            });
            s.sale_lines
                .insert(created.id.clone(), draft.details.clone());
            Ok(created)
        })
    }

    async fn attach_payment_proof(&self, sale_id: &str, data_url: &str) -> BackendResult<()> {
        self.enter(Op::AttachProof)?;
        self.with_state(|s| match s.sales.iter_mut().find(|x| x.id == sale_id) {
            Some(sale) => {
                sale.payment_proof = Some(data_url.to_string());
                Ok(())
            }
            None => Err(BackendError::not_found(format!("sale {sale_id}"))),
        })
    }

    async fn list_sales(&self) -> BackendResult<Vec<SaleRecord>> {
        self.enter(Op::ListSales)?;
        Ok(self.sales())
    }

    async fn list_orders(&self) -> BackendResult<Vec<OrderRecord>> {
        self.enter(Op::ListOrders)?;
        Ok(self.orders())
    }

    async fn confirm_online(&self, sale_id: &str) -> BackendResult<OrderRecord> {
        self.enter(Op::ConfirmOnline)?;
        self.with_state(|s| {
            let sale = s
                .sales
                .iter()
                .find(|x| x.id == sale_id)
                .ok_or_else(|| BackendError::not_found(format!("sale {sale_id}")))?;
            if !sale.is_online() {
                return Err(BackendError::new(
                    BackendErrorKind::SaleNotOnline,
                    format!("sale {sale_id} was not placed online"),
                ));
            }
            if s.orders.iter().any(|o| o.sale_id == sale_id) {
                return Err(BackendError::new(
                    BackendErrorKind::AlreadyConfirmed,
                    format!("sale {sale_id} already has an order"),
                ));
            }

            let order = OrderRecord {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.to_string(),
            };
            s.orders.push(order.clone());

            let lines = s.sale_lines.get(sale_id).cloned().unwrap_or_default();
            for line in lines {
                if let Some(p) = s.products.iter_mut().find(|p| p.id == line.product_id) {
                    p.stock -= Decimal::from(line.quantity);
                }
            }
            Ok(order)
        })
    }
}

// =============================================================================
// Recording Emitter
// =============================================================================

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<ShopEvent>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<ShopEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn push(&self, event: ShopEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl ShopEventEmitter for RecordingEmitter {
    fn cart_changed(&self, session_id: &str, cart: &Cart, changes: &CartChanges) {
        self.push(ShopEvent::CartChanged {
            session_id: session_id.to_string(),
            cart: cart.clone(),
            changes: changes.clone(),
        });
    }

    fn order_status_changed(&self, entry: &TrackerEntry) {
        self.push(ShopEvent::OrderStatusChanged {
            entry: entry.clone(),
        });
    }

    fn receipt_ready(&self, receipt: &Receipt) {
        self.push(ShopEvent::ReceiptReady {
            receipt: receipt.clone(),
        });
    }

    fn queue_refreshed(&self, pending: &[PendingPayment]) {
        self.push(ShopEvent::QueueRefreshed {
            pending: pending.to_vec(),
        });
    }

    fn background_error(&self, task: &str, message: &str, retryable: bool) {
        self.push(ShopEvent::BackgroundError {
            task: task.to_string(),
            message: message.to_string(),
            retryable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrina_core::{Money, PaymentMethod};

    fn draft(quantity: i64) -> SaleDraft {
        SaleDraft {
            customer_name: "Ana".into(),
            customer_identifier: "Ana - 555".into(),
            payment_method: PaymentMethod::Wallet,
            notes: String::new(),
            discount: Money::zero(),
            details: vec![SaleDraftLine {
                product_id: "A".into(),
                quantity,
                unit_price: Money::from_cents(100),
            }],
        }
    }

    #[tokio::test]
    async fn test_confirm_creates_one_order_and_decrements_stock() {
        let backend = FakeBackend::new();
        backend.set_products(vec![ProductSnapshot::new("A", "Tea", 100, Decimal::from(5))]);
        let sale = backend.create_sale(&draft(2)).await.unwrap();

        backend.confirm_online(&sale.id).await.unwrap();
        let err = backend.confirm_online(&sale.id).await.unwrap_err();

        assert_eq!(err.kind, BackendErrorKind::AlreadyConfirmed);
        assert_eq!(backend.orders().len(), 1);
        assert_eq!(backend.products()[0].stock, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_create_sale_checks_stock() {
        let backend = FakeBackend::new();
        backend.set_products(vec![ProductSnapshot::new("A", "Tea", 100, Decimal::from(1))]);

        let err = backend.create_sale(&draft(2)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Rejected { status: 422 });
        assert!(backend.sales().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_is_used_once() {
        let backend = FakeBackend::new();
        backend.fail_next(Op::ListOrders, BackendErrorKind::Timeout);

        assert!(backend.list_orders().await.is_err());
        assert!(backend.list_orders().await.is_ok());
        assert_eq!(backend.calls(Op::ListOrders), 2);
    }
}
