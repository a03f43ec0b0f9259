//! # Domain Types
//!
//! The backend records the client reads, as seen from the client.
//!
//! ## Three Lives of an Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Client draft            Backend sale               Backend order       │
//! │  ────────────            ────────────               ─────────────       │
//! │  Cart + contact   ──►    SaleRecord          ──►    OrderRecord         │
//! │  (never stored)          id, sale_number            sale_id             │
//! │                          created_by_id = None       (exists only once   │
//! │                          payment_proof?              staff confirmed)   │
//! │                                                                         │
//! │  An OrderRecord existing for a sale id is the system-wide "already     │
//! │  confirmed" signal. Nothing else carries that status.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are strings: the backend issues them and the client never
//! interprets them.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Promotion
// =============================================================================

/// A percentage promotion attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    pub label: String,
    /// Discount in basis points (1500 = 15%).
    pub discount_bps: u32,
}

impl Promotion {
    /// Price after this promotion.
    pub fn apply(&self, price: Money) -> Money {
        price.apply_percentage_discount(self.discount_bps)
    }
}

// =============================================================================
// Product Snapshot
// =============================================================================

/// A product as last reported by the backend.
///
/// `stock` is whatever the backend said on the last refresh. It can be
/// stale in either direction until the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    /// List price before promotions.
    pub price: Money,
    /// Units on hand. Decimal because the backend stores it that way.
    #[ts(as = "String")]
    pub stock: Decimal,
    pub is_active: bool,
    pub promotion: Option<Promotion>,
}

impl ProductSnapshot {
    /// An active product without promotion.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price_cents: i64,
        stock: Decimal,
    ) -> Self {
        ProductSnapshot {
            id: id.into(),
            name: name.into(),
            price: Money::from_cents(price_cents),
            stock,
            is_active: true,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = Some(promotion);
        self
    }

    /// Price a new cart line would be charged.
    pub fn effective_price(&self) -> Money {
        match &self.promotion {
            Some(promo) => promo.apply(self.price),
            None => self.price,
        }
    }

    /// Whole units that can go into a cart.
    ///
    /// Fractional stock is floored (2.7 kg in stock allows 2 units) and
    /// negative stock counts as none.
    pub fn available_units(&self) -> i64 {
        if self.stock <= Decimal::ZERO {
            return 0;
        }
        self.stock.floor().to_i64().unwrap_or(i64::MAX)
    }

    /// Active and with at least one unit.
    pub fn is_sellable(&self) -> bool {
        self.is_active && self.available_units() > 0
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer intends to pay an online order.
///
/// ```text
/// BankTransfer ─┐
///               ├─► proof upload ─► pending_payment ─► pending_confirmation
/// Wallet ───────┘
/// Card ──────────► simulated charge ────────────────► pending_confirmation
/// ```
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank transfer, customer uploads the transfer receipt.
    BankTransfer,
    /// Mobile wallet transfer, customer uploads a screenshot.
    Wallet,
    /// Card payment, completed by a simulated instant charge.
    Card,
    /// Any method the backend reports that the online flow does not handle
    /// (in-store cash sales, for instance).
    #[serde(other)]
    Other,
}

impl PaymentMethod {
    /// Methods whose order waits for an uploaded proof.
    pub fn requires_proof(&self) -> bool {
        matches!(self, PaymentMethod::BankTransfer | PaymentMethod::Wallet)
    }

    /// Methods completed by the simulated confirmation step.
    pub fn is_instant(&self) -> bool {
        matches!(self, PaymentMethod::Card)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Backend Sale
// =============================================================================

/// A sale record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRecord {
    pub id: String,
    /// Human-readable order number.
    pub sale_number: String,
    pub customer_name: String,
    pub payment_method: PaymentMethod,
    pub total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Staff user that rang the sale. `None` for online sales.
    pub created_by_id: Option<String>,
    /// Proof attachment as a data URL, if one reached the backend.
    pub payment_proof: Option<String>,
}

impl SaleRecord {
    /// Placed through the storefront rather than by a staff member.
    pub fn is_online(&self) -> bool {
        self.created_by_id.is_none()
    }

    /// Carries a non-empty proof on the backend side.
    pub fn has_proof(&self) -> bool {
        self.payment_proof
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }
}

/// What the backend returns after accepting a sale draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreatedSale {
    pub id: String,
    pub sale_number: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub total: Money,
}

// =============================================================================
// Backend Order
// =============================================================================

/// A backend order, created once per confirmed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderRecord {
    pub id: String,
    pub sale_id: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_units_floors_fractional_stock() {
        let p = ProductSnapshot::new("A", "Flour", 300, Decimal::new(27, 1));
        assert_eq!(p.available_units(), 2);
    }

    #[test]
    fn test_negative_stock_is_not_sellable() {
        let p = ProductSnapshot::new("A", "Flour", 300, Decimal::from(-3));
        assert_eq!(p.available_units(), 0);
        assert!(!p.is_sellable());
    }

    #[test]
    fn test_inactive_product_is_not_sellable() {
        let mut p = ProductSnapshot::new("A", "Flour", 300, Decimal::from(10));
        p.is_active = false;
        assert!(!p.is_sellable());
    }

    #[test]
    fn test_effective_price_applies_promotion() {
        let p = ProductSnapshot::new("A", "Flour", 1000, Decimal::from(1)).with_promotion(
            Promotion {
                id: "p1".to_string(),
                label: "Summer".to_string(),
                discount_bps: 2000,
            },
        );
        assert_eq!(p.effective_price().cents(), 800);
    }

    #[test]
    fn test_payment_method_routes() {
        assert!(PaymentMethod::BankTransfer.requires_proof());
        assert!(PaymentMethod::Wallet.requires_proof());
        assert!(!PaymentMethod::Card.requires_proof());
        assert!(PaymentMethod::Card.is_instant());
        assert!(!PaymentMethod::Other.is_instant());
    }

    #[test]
    fn test_unknown_payment_method_deserializes_as_other() {
        let m: PaymentMethod = serde_json::from_str("\"cash\"").unwrap();
        assert_eq!(m, PaymentMethod::Other);
        let m: PaymentMethod = serde_json::from_str("\"bank_transfer\"").unwrap();
        assert_eq!(m, PaymentMethod::BankTransfer);
    }

    #[test]
    fn test_blank_proof_does_not_count() {
        let sale = SaleRecord {
            id: "1".to_string(),
            sale_number: "V-1".to_string(),
            customer_name: "Ana".to_string(),
            payment_method: PaymentMethod::Wallet,
            total: Money::from_cents(100),
            created_at: Utc::now(),
            created_by_id: None,
            payment_proof: Some("   ".to_string()),
        };
        assert!(sale.is_online());
        assert!(!sale.has_proof());
    }
}
