//! # vitrina-core: Pure Rules for the Online-Order Flow
//!
//! Everything that decides *what* should happen to a cart, an order draft, a
//! payment proof or a tracker entry lives here as plain functions over owned
//! values. The async services in `vitrina-sync` only fetch, persist and call
//! into this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vitrina Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          apps/desk (storefront + operations commands)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     vitrina-sync: stock refresher, checkout, proof channel,     │   │
//! │  │     confirmation poller, pending queue, actuator                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vitrina-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ ┌────────┐ │   │
//! │  │   │  cart   │ │checkout │ │  proof   │ │ tracker │ │ queue  │ │   │
//! │  │   │reconcile│ │ draft   │ │MIME/size │ │ states  │ │ filter │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └─────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            vitrina-db (client-local SQLite store)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Backend records as the client sees them (products, sales, orders)
//! - [`money`] - Integer-cent money with decimal conversion at the wire boundary
//! - [`stock`] - Last-known product list
//! - [`cart`] - Cart snapshots, stock guard and reconciliation
//! - [`checkout`] - Contact form validation and sale draft building
//! - [`proof`] - Payment proof attachment rules
//! - [`tracker`] - Order lifecycle state machine
//! - [`queue`] - Staff-side pending-payment filter
//! - [`receipt`] - Receipt produced on confirmation
//! - [`error`] / [`validation`] - Typed errors and field validators
//!
//! ## Example Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use vitrina_core::cart::Cart;
//! use vitrina_core::types::ProductSnapshot;
//!
//! let coffee = ProductSnapshot::new("A", "Coffee beans", 1250, Decimal::from(5));
//! let cart = Cart::new().add(&coffee).unwrap().increase("A").unwrap();
//! assert_eq!(cart.total().cents(), 2500);
//!
//! // The backend now reports only 1 unit left.
//! let refreshed = ProductSnapshot::new("A", "Coffee beans", 1250, Decimal::from(1));
//! let outcome = cart.reconcile(&[refreshed]);
//! assert_eq!(outcome.cart.lines()[0].quantity, 1);
//! assert_eq!(outcome.changes.adjusted.len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod checkout;
pub mod error;
pub mod money;
pub mod proof;
pub mod queue;
pub mod receipt;
pub mod stock;
pub mod tracker;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartChanges, CartLine, CartTotals, Reconciliation};
pub use checkout::{ContactFields, SaleDraft};
pub use error::{CartError, CoreError, ValidationError, ValidationErrors};
pub use money::Money;
pub use proof::PaymentProof;
pub use queue::PendingPayment;
pub use receipt::Receipt;
pub use stock::StockCache;
pub use tracker::{OrderLine, PaymentDetails, StaffDecision, TrackerEntry, TrackerStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Applies on top of the stock guard so a typo (1000 instead of 10) is
/// caught even for products with large stock.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest payment proof accepted before any upload is attempted (5 MiB).
pub const DEFAULT_MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;
