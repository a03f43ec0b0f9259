//! # Customer Commands
//!
//! Storefront side: browse stock, fill the cart, check out, pay, follow the
//! order.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  get_products / add_to_cart / set_quantity ...                          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  submit_order ────────────► pending_payment                             │
//! │         │                        │                                      │
//! │         │  bank transfer/wallet  │  card                                │
//! │         ▼                        ▼                                      │
//! │  upload_proof            complete_card_payment                          │
//! │         │                        │                                      │
//! │         └──────────┬─────────────┘                                      │
//! │                    ▼                                                    │
//! │         pending_confirmation ──► watch_order (poller)                   │
//! │                    │                                                    │
//! │                    ▼                                                    │
//! │         confirmed (receipt) | rejected                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;
use vitrina_core::tracker::CustomerAction;
use vitrina_core::{
    Cart, CartChanges, CartLine, CartTotals, ContactFields, Money, PaymentMethod,
    ProductSnapshot, Receipt, TrackerEntry,
};

// =============================================================================
// Response DTOs
// =============================================================================

/// A product as shown in the storefront grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price: Money,
    /// Price after the promotion, if any.
    pub effective_price: Money,
    /// Whole units the cart may hold, from the last refresh.
    pub available: i64,
    pub promotion_label: Option<String>,
}

impl From<&ProductSnapshot> for ProductResponse {
    fn from(p: &ProductSnapshot) -> Self {
        ProductResponse {
            id: p.id.clone(),
            name: p.name.clone(),
            price: p.price,
            effective_price: p.effective_price(),
            available: p.available_units(),
            promotion_label: p.promotion.as_ref().map(|promo| promo.label.clone()),
        }
    }
}

/// Cart response including lines, totals and what the last refresh changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub lines: Vec<CartLine>,
    pub totals: CartTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<CartChanges>,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        CartResponse {
            lines: cart.lines().to_vec(),
            totals: CartTotals::from(cart),
            changes: None,
        }
    }
}

/// An order as the customer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub entry: TrackerEntry,
    pub next_action: CustomerAction,
    /// Present once the order is confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

impl From<TrackerEntry> for OrderStatusResponse {
    fn from(entry: TrackerEntry) -> Self {
        let receipt = Receipt::for_entry(&entry).ok();
        OrderStatusResponse {
            next_action: entry.next_action(),
            receipt,
            entry,
        }
    }
}

/// Result of a proof upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResponse {
    pub order: OrderStatusResponse,
    /// False when the upload failed and the proof waits in the local outbox.
    pub uploaded: bool,
}

// =============================================================================
// Stock
// =============================================================================

/// Sellable products from the stock cache.
pub async fn get_products(state: &AppState) -> Result<Vec<ProductResponse>, ApiError> {
    debug!("get_products command");
    let products = state.stock.sellable().await;
    Ok(products.iter().map(ProductResponse::from).collect())
}

/// Fetches stock now and reconciles the cart.
///
/// Unlike the background refresh, a failure here is reported.
pub async fn refresh_stock(state: &AppState) -> Result<CartResponse, ApiError> {
    debug!("refresh_stock command");
    let changes = state.stock.try_refresh().await?;
    let cart = state.stock.cart().await?;

    let mut response = CartResponse::from(&cart);
    response.changes = Some(changes);
    Ok(response)
}

// =============================================================================
// Cart
// =============================================================================

pub async fn get_cart(state: &AppState) -> Result<CartResponse, ApiError> {
    debug!("get_cart command");
    let cart = state.stock.cart().await?;
    Ok(CartResponse::from(&cart))
}

/// Adds one unit of a product.
///
/// ## Behavior
/// - Price is frozen at add time (promotional price when one applies)
/// - Refused with `INSUFFICIENT_STOCK` past the cached stock figure
pub async fn add_to_cart(state: &AppState, product_id: &str) -> Result<CartResponse, ApiError> {
    debug!(product_id = %product_id, "add_to_cart command");
    let cart = state.stock.add_to_cart(product_id).await?;
    Ok(CartResponse::from(&cart))
}

pub async fn increase_quantity(
    state: &AppState,
    product_id: &str,
) -> Result<CartResponse, ApiError> {
    debug!(product_id = %product_id, "increase_quantity command");
    let cart = state.stock.increase(product_id).await?;
    Ok(CartResponse::from(&cart))
}

pub async fn decrease_quantity(
    state: &AppState,
    product_id: &str,
) -> Result<CartResponse, ApiError> {
    debug!(product_id = %product_id, "decrease_quantity command");
    let cart = state.stock.decrease(product_id).await?;
    Ok(CartResponse::from(&cart))
}

/// Sets a line's quantity; `0` removes it.
pub async fn set_quantity(
    state: &AppState,
    product_id: &str,
    quantity: i64,
) -> Result<CartResponse, ApiError> {
    debug!(product_id = %product_id, quantity, "set_quantity command");
    let cart = state.stock.set_quantity(product_id, quantity).await?;
    Ok(CartResponse::from(&cart))
}

pub async fn remove_from_cart(
    state: &AppState,
    product_id: &str,
) -> Result<CartResponse, ApiError> {
    debug!(product_id = %product_id, "remove_from_cart command");
    let cart = state.stock.remove(product_id).await?;
    Ok(CartResponse::from(&cart))
}

pub async fn clear_cart(state: &AppState) -> Result<CartResponse, ApiError> {
    debug!("clear_cart command");
    state.stock.clear().await?;
    Ok(CartResponse::from(&Cart::new()))
}

// =============================================================================
// Checkout & Payment
// =============================================================================

/// Places the order.
///
/// ## Flow
/// 1. Stock refresh and cart reconciliation
/// 2. Contact form validation (every failing field reported at once)
/// 3. Sale created on the backend
/// 4. Tracker entry recorded as `pending_payment`, cart cleared
///
/// Any failure before step 4 leaves the cart as it was.
pub async fn submit_order(
    state: &AppState,
    contact: &ContactFields,
    method: PaymentMethod,
) -> Result<OrderStatusResponse, ApiError> {
    debug!(method = %method, "submit_order command");
    let entry = state.checkout.submit(contact, method).await?;
    Ok(OrderStatusResponse::from(entry))
}

/// Attaches a transfer receipt or wallet screenshot to the order and starts
/// waiting for staff.
pub async fn upload_proof(
    state: &AppState,
    order_number: &str,
    mime: &str,
    bytes: Vec<u8>,
) -> Result<ProofResponse, ApiError> {
    debug!(order_number = %order_number, mime = %mime, size = bytes.len(), "upload_proof command");
    let submission = state.proofs.submit(order_number, mime, bytes).await?;
    state.watch_order(order_number).await?;

    Ok(ProofResponse {
        order: OrderStatusResponse::from(submission.entry),
        uploaded: submission.uploaded,
    })
}

/// Completes a card order with the simulated charge and starts waiting for
/// staff.
pub async fn complete_card_payment(
    state: &AppState,
    order_number: &str,
    amount: Money,
    reference: Option<String>,
) -> Result<OrderStatusResponse, ApiError> {
    debug!(order_number = %order_number, amount = %amount, "complete_card_payment command");
    let entry = state
        .tracker
        .simulate_card_payment(order_number, amount, reference)
        .await?;
    state.watch_order(order_number).await?;
    Ok(OrderStatusResponse::from(entry))
}

// =============================================================================
// Tracking
// =============================================================================

pub async fn get_order(
    state: &AppState,
    order_number: &str,
) -> Result<OrderStatusResponse, ApiError> {
    debug!(order_number = %order_number, "get_order command");
    let entry = state.tracker.get(order_number).await?;
    Ok(OrderStatusResponse::from(entry))
}

/// Orders of this device still waiting for a staff decision.
pub async fn get_open_orders(state: &AppState) -> Result<Vec<OrderStatusResponse>, ApiError> {
    debug!("get_open_orders command");
    let entries = state.tracker.awaiting_confirmation().await?;
    Ok(entries.into_iter().map(OrderStatusResponse::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::state::testing::{contact, customer_state, PNG};
    use vitrina_core::TrackerStatus;
    use vitrina_sync::testing::Op;
    use vitrina_sync::BackendErrorKind;

    #[tokio::test]
    async fn test_get_products_lists_sellable_only() {
        let (state, backend) = customer_state(&[("A", 3), ("B", 0)]).await;
        refresh_stock(&state).await.unwrap();

        let products = get_products(&state).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, "A");
        assert_eq!(products[0].available, 3);
        assert_eq!(backend.calls(Op::ListProducts), 1);
    }

    #[tokio::test]
    async fn test_add_past_stock_reports_insufficient_stock() {
        let (state, _) = customer_state(&[("A", 1)]).await;
        refresh_stock(&state).await.unwrap();

        add_to_cart(&state, "A").await.unwrap();
        let err = add_to_cart(&state, "A").await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(get_cart(&state).await.unwrap().totals.total_quantity, 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_reported() {
        let (state, backend) = customer_state(&[("A", 1)]).await;
        backend.fail_next(Op::ListProducts, BackendErrorKind::Timeout);

        let err = refresh_stock(&state).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_invalid_contact_reports_every_field() {
        let (state, backend) = customer_state(&[("A", 5)]).await;
        refresh_stock(&state).await.unwrap();
        add_to_cart(&state, "A").await.unwrap();

        let blank = ContactFields {
            name: String::new(),
            phone: String::new(),
            address: String::new(),
            document_id: None,
            notes: None,
        };
        let err = submit_order(&state, &blank, PaymentMethod::Wallet)
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("; "));
        assert_eq!(backend.calls(Op::CreateSale), 0);
        assert_eq!(get_cart(&state).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_order_waits_for_proof_then_staff() {
        let (state, _) = customer_state(&[("A", 5)]).await;
        refresh_stock(&state).await.unwrap();
        add_to_cart(&state, "A").await.unwrap();

        let order = submit_order(&state, &contact(), PaymentMethod::Wallet)
            .await
            .unwrap();
        assert_eq!(order.next_action, CustomerAction::UploadProof);
        assert!(order.receipt.is_none());

        let number = order.entry.order_number.clone();
        let proof = upload_proof(&state, &number, "image/png", PNG.to_vec())
            .await
            .unwrap();

        assert!(proof.uploaded);
        assert_eq!(proof.order.entry.status, TrackerStatus::PendingConfirmation);
        assert_eq!(proof.order.next_action, CustomerAction::WaitForConfirmation);
        assert_eq!(get_open_orders(&state).await.unwrap().len(), 1);
        assert!(state.status().await.running_tasks.contains(&"confirmation_poller"));

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_card_payment_with_wrong_amount() {
        let (state, _) = customer_state(&[("A", 5)]).await;
        refresh_stock(&state).await.unwrap();
        add_to_cart(&state, "A").await.unwrap();
        let order = submit_order(&state, &contact(), PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(order.next_action, CustomerAction::CompleteCardPayment);

        let err = complete_card_payment(
            &state,
            &order.entry.order_number,
            Money::from_cents(1),
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::PaymentError);
        let current = get_order(&state, &order.entry.order_number).await.unwrap();
        assert_eq!(current.entry.status, TrackerStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (state, _) = customer_state(&[]).await;
        let err = get_order(&state, "V-9999").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
