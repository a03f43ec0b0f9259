//! # Desk Commands Module
//!
//! Every user-initiated operation, as a plain async function over
//! [`AppState`](crate::state::AppState).
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (exports)
//! ├── customer.rs  ◄─── Stock, cart, checkout, proof, order tracking
//! ├── staff.rs     ◄─── Pending-payment queue, confirm, reject
//! └── config.rs    ◄─── Configuration and agent status
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CLI subcommand / frontend bridge                                      │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  async fn add_to_cart(state: &AppState, product_id: &str)              │
//! │      -> Result<CartResponse, ApiError>                                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  vitrina-sync service (StockSync, Checkout, ...)                       │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  camelCase JSON DTO  or  { code, message }                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod customer;
pub mod staff;

pub use config::*;
pub use customer::*;
pub use staff::*;
