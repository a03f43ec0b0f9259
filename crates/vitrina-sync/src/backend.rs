//! # Backend Interface
//!
//! The REST collaborator every service talks to, behind a trait so the
//! protocol can run against the real API ([`crate::http::HttpBackend`]) or
//! an in-memory one (`testing::FakeBackend`, behind the `testing` feature).
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list_products         GET   /products                                 │
//! │  create_sale           POST  /public/sales                             │
//! │  attach_payment_proof  PATCH /public/sales/{id}/payment-proof          │
//! │  list_sales            GET   /public/sales                             │
//! │  list_orders           GET   /public/orders                            │
//! │  confirm_online        PATCH /sales/{id}/confirm-online                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `confirm_online` must be atomic and idempotent per sale on the backend:
//! a second call fails with [`BackendErrorKind::AlreadyConfirmed`] instead
//! of creating a second order.
//!
//! [`BackendErrorKind::AlreadyConfirmed`]: crate::error::BackendErrorKind::AlreadyConfirmed

use async_trait::async_trait;

use crate::error::BackendResult;
use vitrina_core::{CreatedSale, OrderRecord, ProductSnapshot, SaleDraft, SaleRecord};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Current product list with stock, active flag and promotion.
    async fn list_products(&self) -> BackendResult<Vec<ProductSnapshot>>;

    /// Creates a sale from a checkout draft.
    async fn create_sale(&self, draft: &SaleDraft) -> BackendResult<CreatedSale>;

    /// Attaches a proof, as a data URL, to an existing sale.
    async fn attach_payment_proof(&self, sale_id: &str, data_url: &str) -> BackendResult<()>;

    async fn list_sales(&self) -> BackendResult<Vec<SaleRecord>>;

    async fn list_orders(&self) -> BackendResult<Vec<OrderRecord>>;

    /// Creates the order for an online sale and decrements its stock.
    async fn confirm_online(&self, sale_id: &str) -> BackendResult<OrderRecord>;

    /// The order referencing `sale_id`, if one exists.
    async fn find_order_for_sale(&self, sale_id: &str) -> BackendResult<Option<OrderRecord>> {
        let orders = self.list_orders().await?;
        Ok(orders.into_iter().find(|o| o.sale_id == sale_id))
    }

    async fn find_sale(&self, sale_id: &str) -> BackendResult<Option<SaleRecord>> {
        let sales = self.list_sales().await?;
        Ok(sales.into_iter().find(|s| s.id == sale_id))
    }
}
