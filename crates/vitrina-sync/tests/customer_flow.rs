//! Customer-side protocol: stock reconciliation, checkout, proof upload and
//! confirmation polling.

mod common;

use rust_decimal::Decimal;

use common::{backend_with, contact, device, PNG};
use vitrina_core::cart::RemovalReason;
use vitrina_core::{CoreError, Money, PaymentMethod, TrackerStatus};
use vitrina_sync::testing::Op;
use vitrina_sync::{
    Backend, BackendErrorKind, ConfirmationPoller, DeviceRole, PollOutcome, ShopEvent, SyncError,
};

// =============================================================================
// Stock Reconciliation
// =============================================================================

#[tokio::test]
async fn test_refresh_clamps_line_to_lower_stock() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    let stock = customer.agent.stock();

    stock.refresh().await.unwrap();
    stock.add_to_cart("A").await.unwrap();
    stock.set_quantity("A", 3).await.unwrap();

    backend.set_stock("A", Decimal::from(2));
    let changes = stock.refresh().await.unwrap();

    let cart = stock.cart().await.unwrap();
    let line = cart.line("A").unwrap();
    assert_eq!((line.quantity, line.stock), (2, 2));
    assert!(changes.removed.is_empty());
    assert_eq!(changes.adjusted.len(), 1);
    assert_eq!((changes.adjusted[0].from, changes.adjusted[0].to), (3, 2));

    let reported = customer.events.events().into_iter().any(|e| {
        matches!(e, ShopEvent::CartChanged { changes, .. } if changes.adjusted.len() == 1)
    });
    assert!(reported);
}

#[tokio::test]
async fn test_refresh_never_leaves_lines_above_stock_or_unsellable() {
    let backend = backend_with(&[("A", 10), ("B", 10), ("C", 10), ("D", 10)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    let stock = customer.agent.stock();
    stock.refresh().await.unwrap();

    for id in ["A", "B", "C", "D"] {
        stock.add_to_cart(id).await.unwrap();
        stock.set_quantity(id, 6).await.unwrap();
    }

    backend.set_stock("A", Decimal::from(4));
    backend.set_stock("B", Decimal::ZERO);
    backend.deactivate("C");
    backend.set_stock("D", Decimal::from(20));
    let changes = stock.refresh().await.unwrap();

    let cart = stock.cart().await.unwrap();
    let ids: Vec<_> = cart.lines().iter().map(|l| l.product_id.as_str()).collect();
    assert_eq!(ids, ["A", "D"]);
    for line in cart.lines() {
        assert!(line.quantity <= line.stock);
    }
    assert_eq!(cart.line("D").unwrap().quantity, 6);
    assert_eq!(cart.line("D").unwrap().stock, 20);

    let reasons: Vec<_> = changes.removed.iter().map(|r| r.reason).collect();
    assert_eq!(reasons, [RemovalReason::OutOfStock, RemovalReason::Inactive]);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_failed_submit_leaves_cart_intact() {
    let backend = backend_with(&[("A", 5), ("B", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    let stock = customer.agent.stock();
    stock.refresh().await.unwrap();
    stock.add_to_cart("A").await.unwrap();
    stock.add_to_cart("B").await.unwrap();
    stock.set_quantity("B", 3).await.unwrap();
    let before = stock.cart().await.unwrap();

    backend.fail_next(Op::CreateSale, BackendErrorKind::Network);
    let err = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::BankTransfer)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(stock.cart().await.unwrap(), before);
    assert!(customer.agent.tracker().awaiting_confirmation().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_stock_rejection_keeps_cart() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    let stock = customer.agent.stock();
    stock.refresh().await.unwrap();
    stock.add_to_cart("A").await.unwrap();
    stock.set_quantity("A", 4).await.unwrap();

    // Stock drops between the pre-checkout refresh and the sale.
    backend.fail_next(Op::ListProducts, BackendErrorKind::Timeout);
    backend.set_stock("A", Decimal::from(1));

    let err = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::Wallet)
        .await
        .unwrap_err();

    assert_eq!(err.backend_kind(), Some(BackendErrorKind::Rejected { status: 422 }));
    assert_eq!(stock.cart().await.unwrap().line("A").unwrap().quantity, 4);
}

#[tokio::test]
async fn test_checkout_uses_reconciled_cart() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    let stock = customer.agent.stock();
    stock.refresh().await.unwrap();
    stock.add_to_cart("A").await.unwrap();
    stock.set_quantity("A", 5).await.unwrap();

    backend.set_stock("A", Decimal::from(3));
    let entry = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::Wallet)
        .await
        .unwrap();

    assert_eq!(entry.lines[0].quantity, 3);
    assert_eq!(entry.total, Money::from_cents(3000));
    assert!(stock.cart().await.unwrap().is_empty());
}

// =============================================================================
// Proof and Polling
// =============================================================================

#[tokio::test]
async fn test_poller_not_started_before_proof() {
    let backend = backend_with(&[("A", 5)]);
    let mut customer = device(&backend, DeviceRole::Customer).await;
    customer.agent.stock().refresh().await.unwrap();
    customer.agent.stock().add_to_cart("A").await.unwrap();

    let entry = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::BankTransfer)
        .await
        .unwrap();

    let err = customer.agent.watch_order(&entry.order_number).await.unwrap_err();
    assert!(matches!(err, SyncError::NotReady { .. }));
    assert!(customer.agent.status().running_tasks.is_empty());

    let stored = customer.agent.tracker().get(&entry.order_number).await.unwrap();
    assert_eq!(stored.status, TrackerStatus::PendingPayment);
}

#[tokio::test]
async fn test_oversized_png_rejected_before_network() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    customer.agent.stock().refresh().await.unwrap();
    customer.agent.stock().add_to_cart("A").await.unwrap();
    let entry = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::BankTransfer)
        .await
        .unwrap();

    let calls = backend.total_calls();
    let six_mb = vec![0u8; 6 * 1024 * 1024];
    let err = customer
        .agent
        .proofs()
        .submit(&entry.order_number, "image/png", six_mb)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Core(CoreError::ProofTooLarge { .. })));
    assert!(err.to_string().contains("too large"));
    assert_eq!(backend.total_calls(), calls);
}

#[tokio::test]
async fn test_poller_stops_requesting_after_terminal_state() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    customer.agent.stock().refresh().await.unwrap();
    customer.agent.stock().add_to_cart("A").await.unwrap();
    let entry = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::Wallet)
        .await
        .unwrap();
    customer
        .agent
        .proofs()
        .submit(&entry.order_number, "image/png", PNG.to_vec())
        .await
        .unwrap();

    let mut poller = ConfirmationPoller::start(
        backend.clone(),
        customer.agent.tracker().clone(),
        customer.agent.bus(),
        &entry.order_number,
    )
    .await
    .unwrap();
    assert_eq!(poller.tick().await.unwrap(), PollOutcome::Pending);

    backend.confirm_online(&entry.sale_id).await.unwrap();
    assert_eq!(
        poller.tick().await.unwrap(),
        PollOutcome::Terminal(TrackerStatus::Confirmed)
    );

    let calls = backend.total_calls();
    for _ in 0..5 {
        poller.tick().await.unwrap();
    }
    assert_eq!(backend.total_calls(), calls);
}

#[tokio::test]
async fn test_card_order_confirmed_with_single_receipt() {
    let backend = backend_with(&[("A", 5)]);
    let customer = device(&backend, DeviceRole::Customer).await;
    customer.agent.stock().refresh().await.unwrap();
    customer.agent.stock().add_to_cart("A").await.unwrap();
    let entry = customer
        .agent
        .checkout()
        .submit(&contact(), PaymentMethod::Card)
        .await
        .unwrap();

    customer
        .agent
        .tracker()
        .simulate_card_payment(&entry.order_number, entry.total, Some("AUTH-1".into()))
        .await
        .unwrap();

    let mut poller = ConfirmationPoller::start(
        backend.clone(),
        customer.agent.tracker().clone(),
        customer.agent.bus(),
        &entry.order_number,
    )
    .await
    .unwrap();
    backend.confirm_online(&entry.sale_id).await.unwrap();

    for _ in 0..3 {
        poller.tick().await.unwrap();
    }

    let receipts: Vec<_> = customer
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ShopEvent::ReceiptReady { receipt } => Some(receipt),
            _ => None,
        })
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].order_number, entry.order_number);
    assert_eq!(receipts[0].total, entry.total);
}
