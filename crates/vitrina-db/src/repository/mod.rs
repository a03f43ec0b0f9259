//! # Repository Module
//!
//! One repository per table, each a thin handle over the shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.carts()        → CartRepository        cart_lines                  │
//! │  db.trackers()     → TrackerRepository     order_tracker               │
//! │  db.proof_outbox() → ProofOutboxRepository proof_outbox                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queries are plain `sqlx::query`/`query_as` with `FromRow` row types, so
//! the crate builds without a live database.

pub mod cart;
pub mod proof_outbox;
pub mod tracker;

/// `?4, ?5, ?6` for an IN list of `n` values whose first bind is `?start`.
///
/// Numbered throughout: sqlx counts bare `?` from 1 regardless of any
/// numbered parameters earlier in the statement.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQLite's default bound-parameter limit is 999; stay well below it.
pub(crate) const IN_CHUNK: usize = 400;
