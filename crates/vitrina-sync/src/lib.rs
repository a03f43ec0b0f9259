//! # vitrina-sync: Order Reconciliation Protocol
//!
//! The customer storefront and the staff desk never talk to each other.
//! Both talk to the backend's Sale and Order records; this crate is the
//! protocol each side runs against them.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CUSTOMER DEVICE                BACKEND              STAFF DEVICE       │
//! │  ───────────────                ───────              ────────────       │
//! │                                                                         │
//! │  StockSync ◄──── GET products ── Products                               │
//! │    (timer, reconciles cart)                                             │
//! │                                                                         │
//! │  Checkout ─────── POST sale ───► Sales ──── GET ───► PendingPaymentQueue│
//! │    tracker: pending_payment        ▲                    │               │
//! │                                    │                    │               │
//! │  ProofChannel ─── PATCH proof ─────┘                    ▼               │
//! │    tracker: pending_confirmation          ConfirmationActuator          │
//! │                                                  │                      │
//! │  ConfirmationPoller ◄── GET orders ── Orders ◄───┘ confirm-online       │
//! │    tracker: confirmed → Receipt                                         │
//! │                                                                         │
//! │  Same device only: ConfirmationBus carries staff decisions straight     │
//! │  to the pollers.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Plumbing
//! - [`backend`] - `Backend` trait over the REST API
//! - [`http`] - reqwest implementation of `Backend`
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Backend and sync error types
//! - [`events`] - UI notifications
//! - [`bus`] - In-process confirmation topic
//! - [`task`] - Background task handles
//!
//! ### Customer Side
//! - [`stock_sync`] - Stock cache refresh and cart operations
//! - [`checkout`] - Cart to backend sale
//! - [`proof_channel`] - Proof upload with local outbox
//! - [`tracker`] - Order lifecycle and receipts
//! - [`poller`] - Confirmation polling
//!
//! ### Staff Side
//! - [`queue`] - Pending-payment queue
//! - [`actuator`] - Confirm and reject
//!
//! ### Wiring
//! - [`agent`] - `ShopAgent` orchestrator
//! - `testing` - In-memory backend and event recorder (`testing` feature)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vitrina_sync::{ShopAgentBuilder, ShopConfig};
//! use vitrina_db::{Database, DbConfig};
//!
//! let config = ShopConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let mut agent = ShopAgentBuilder::new(config).with_database(db).build()?;
//! agent.start().await?;
//!
//! agent.stock().add_to_cart("prod-42").await?;
//! let entry = agent.checkout().submit(&contact, PaymentMethod::Wallet).await?;
//! agent.proofs().submit(&entry.order_number, "image/png", bytes).await?;
//! agent.watch_order(&entry.order_number).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod task;

pub mod checkout;
pub mod poller;
pub mod proof_channel;
pub mod stock_sync;
pub mod tracker;

pub mod actuator;
pub mod queue;

pub mod agent;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentStatus, ShopAgent, ShopAgentBuilder};
pub use backend::Backend;
pub use bus::{ConfirmationBus, ConfirmationEvent};
pub use config::{DeviceRole, ShopConfig};
pub use error::{BackendError, BackendErrorKind, BackendResult, SyncError, SyncResult};
pub use events::{NoOpEmitter, ShopEvent, ShopEventEmitter, TracingEmitter};
pub use http::HttpBackend;
pub use task::TaskHandle;

pub use checkout::Checkout;
pub use poller::{ConfirmationPoller, PollOutcome};
pub use proof_channel::{OutboxPass, ProofChannel, ProofOutboxProcessor, ProofSubmission};
pub use stock_sync::StockSync;
pub use tracker::OrderTracker;

pub use actuator::{ConfirmOutcome, ConfirmationActuator, RejectOutcome};
pub use queue::PendingPaymentQueue;
