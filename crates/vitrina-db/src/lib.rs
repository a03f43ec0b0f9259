//! # vitrina-db: Client-Local Store
//!
//! SQLite persistence for the three things a client keeps between restarts:
//! the customer's cart, one tracker entry per order, and payment proofs that
//! have not yet reached the backend.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  vitrina-sync services / desk commands                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    vitrina-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌──────────────────┐  ┌────────────────┐  │   │
//! │  │   │   Database   │  │   Repositories   │  │   Migrations   │  │   │
//! │  │   │  (pool.rs)   │◄─│ CartRepository   │  │ 001_local_     │  │   │
//! │  │   │  SqlitePool  │  │ TrackerRepository│  │    store.sql   │  │   │
//! │  │   │              │  │ ProofOutboxRepo  │  │                │  │   │
//! │  │   └──────────────┘  └──────────────────┘  └────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  vitrina.db (platform data dir) or :memory: in tests                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of this is a source of truth. The backend's sales and orders are;
//! these tables are caches, records of intent, and exactly-once guards.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vitrina_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vitrina.db")).await?;
//! let cart = db.carts().load("session-1").await?;
//! let changed = db.trackers().transition("V-0042", TrackerStatus::Confirmed, Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cart::CartRepository;
pub use repository::proof_outbox::{ProofOutboxEntry, ProofOutboxRepository};
pub use repository::tracker::TrackerRepository;
