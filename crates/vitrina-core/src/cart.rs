//! # Cart
//!
//! A customer's cart as an immutable snapshot. Every mutation returns a new
//! `Cart` or an error, leaving the original untouched, so a rejected action
//! never half-applies and the reconciliation rules can be tested on plain
//! values.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Storefront action        Operation            Guard                    │
//! │  ─────────────────        ─────────            ─────                    │
//! │  "Add to cart"     ──────► add(&product)  ───► active, stock, limits    │
//! │  "+"               ──────► increase(id)   ───► line.stock, 999 cap      │
//! │  "-"               ──────► decrease(id)   ───► at 1 the line goes       │
//! │  Type a quantity   ──────► set_quantity() ───► 0 removes                │
//! │  "Remove"          ──────► remove(id)                                   │
//! │  Checkout success  ──────► clear()                                      │
//! │                                                                         │
//! │  Stock refresh     ──────► reconcile(&products)                         │
//! │                             ├── missing / inactive / 0 → drop line      │
//! │                             ├── stock < quantity       → clamp down     │
//! │                             └── otherwise              → refresh figure │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line prices are frozen when the line is created. Reconciliation only
//! touches quantities and stock figures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CartError;
use crate::money::Money;
use crate::types::{ProductSnapshot, Promotion};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    /// Product name when the line was created.
    pub name: String,
    /// Price per unit when the line was created, promotion included.
    pub unit_price: Money,
    pub quantity: i64,
    /// Whole units in stock as of the last add or refresh. Advisory.
    pub stock: i64,
    /// Promotion in effect when the line was created.
    pub promotion: Option<Promotion>,
}

impl CartLine {
    fn from_product(product: &ProductSnapshot) -> Self {
        CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.effective_price(),
            quantity: 1,
            stock: product.available_units(),
            promotion: product.promotion.clone(),
        }
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Reconciliation Report
// =============================================================================

/// Why a line was dropped during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The product is marked inactive.
    Inactive,
    /// The product has no whole unit left.
    OutOfStock,
    /// The product is no longer listed at all.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RemovedLine {
    pub product_id: String,
    pub name: String,
    pub reason: RemovalReason,
}

/// A line whose quantity was clamped down to the refreshed stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustedLine {
    pub product_id: String,
    pub name: String,
    pub from: i64,
    pub to: i64,
}

/// A line whose stock figure went up. Quantity is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockedLine {
    pub product_id: String,
    pub from: i64,
    pub to: i64,
}

/// Everything a refresh changed in the cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartChanges {
    pub removed: Vec<RemovedLine>,
    pub adjusted: Vec<AdjustedLine>,
    pub restocked: Vec<RestockedLine>,
}

impl CartChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.adjusted.is_empty() && self.restocked.is_empty()
    }

    /// Removals or clamps, i.e. something the customer should be told about.
    pub fn affects_selection(&self) -> bool {
        !self.removed.is_empty() || !self.adjusted.is_empty()
    }
}

/// Result of [`Cart::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub cart: Cart,
    pub changes: CartChanges,
}

// =============================================================================
// Cart
// =============================================================================

/// An ordered list of cart lines, unique by product id.
///
/// ## Invariants
/// - Lines are unique by `product_id` and keep insertion order
/// - Every line has `1 <= quantity <= MAX_ITEM_QUANTITY`
/// - At most `MAX_CART_ITEMS` lines
/// - `quantity <= stock` after every mutation and every reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Cart { lines: Vec::new() }
    }

    /// Rebuilds a cart from stored lines.
    ///
    /// Lines with a non-positive quantity and repeated product ids are
    /// dropped, first occurrence wins.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let lines = lines
            .into_iter()
            .filter(|l| l.quantity > 0 && seen.insert(l.product_id.clone()))
            .take(MAX_CART_ITEMS)
            .collect();
        Cart { lines }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    // -------------------------------------------------------------------------
    // Mutations (each returns a new snapshot)
    // -------------------------------------------------------------------------

    /// Adds one unit of `product`, creating the line if needed.
    ///
    /// For an existing line the stock figure is refreshed from `product`
    /// before the guard runs; the frozen price is kept.
    pub fn add(&self, product: &ProductSnapshot) -> Result<Cart, CartError> {
        if !product.is_active {
            return Err(CartError::ProductInactive {
                product_id: product.id.clone(),
            });
        }

        let available = product.available_units();
        let mut next = self.clone();

        match next.position(&product.id) {
            Some(i) => {
                let line = &mut next.lines[i];
                line.stock = available;
                let requested = line.quantity + 1;
                check_quantity(&line.product_id, requested, available)?;
                line.quantity = requested;
            }
            None => {
                if next.lines.len() >= MAX_CART_ITEMS {
                    return Err(CartError::CartFull {
                        max: MAX_CART_ITEMS,
                    });
                }
                check_quantity(&product.id, 1, available)?;
                next.lines.push(CartLine::from_product(product));
            }
        }

        Ok(next)
    }

    /// Adds one unit to an existing line, bounded by its cached stock.
    pub fn increase(&self, product_id: &str) -> Result<Cart, CartError> {
        let mut next = self.clone();
        let i = next.require(product_id)?;
        let line = &mut next.lines[i];
        let requested = line.quantity + 1;
        check_quantity(product_id, requested, line.stock)?;
        line.quantity = requested;
        Ok(next)
    }

    /// Removes one unit. A line at quantity 1 is removed entirely.
    pub fn decrease(&self, product_id: &str) -> Result<Cart, CartError> {
        let mut next = self.clone();
        let i = next.require(product_id)?;
        if next.lines[i].quantity <= 1 {
            next.lines.remove(i);
        } else {
            next.lines[i].quantity -= 1;
        }
        Ok(next)
    }

    /// Sets a line's quantity directly. Zero removes the line.
    pub fn set_quantity(&self, product_id: &str, quantity: i64) -> Result<Cart, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity {
                requested: quantity,
            });
        }
        if quantity == 0 {
            return self.remove(product_id);
        }

        let mut next = self.clone();
        let i = next.require(product_id)?;
        let line = &mut next.lines[i];
        check_quantity(product_id, quantity, line.stock)?;
        line.quantity = quantity;
        Ok(next)
    }

    pub fn remove(&self, product_id: &str) -> Result<Cart, CartError> {
        let mut next = self.clone();
        let i = next.require(product_id)?;
        next.lines.remove(i);
        Ok(next)
    }

    pub fn clear(&self) -> Cart {
        Cart::new()
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Reconciles every line against a fresh product listing.
    ///
    /// `products` is the backend's current list. A product absent from it
    /// is treated like an inactive one.
    pub fn reconcile(&self, products: &[ProductSnapshot]) -> Reconciliation {
        let by_id: HashMap<&str, &ProductSnapshot> =
            products.iter().map(|p| (p.id.as_str(), p)).collect();

        let mut changes = CartChanges::default();
        let mut lines = Vec::with_capacity(self.lines.len());

        for line in &self.lines {
            let product = match by_id.get(line.product_id.as_str()) {
                Some(p) => *p,
                None => {
                    changes.removed.push(removed(line, RemovalReason::Missing));
                    continue;
                }
            };

            if !product.is_active {
                changes.removed.push(removed(line, RemovalReason::Inactive));
                continue;
            }

            let available = product.available_units();
            if available == 0 {
                changes.removed.push(removed(line, RemovalReason::OutOfStock));
                continue;
            }

            let mut next = line.clone();
            if available < line.quantity {
                next.quantity = available;
                changes.adjusted.push(AdjustedLine {
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    from: line.quantity,
                    to: available,
                });
            } else if available > line.stock {
                changes.restocked.push(RestockedLine {
                    product_id: line.product_id.clone(),
                    from: line.stock,
                    to: available,
                });
            }
            next.stock = available;
            lines.push(next);
        }

        Reconciliation {
            cart: Cart { lines },
            changes,
        }
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id == product_id)
    }

    fn require(&self, product_id: &str) -> Result<usize, CartError> {
        self.position(product_id)
            .ok_or_else(|| CartError::LineNotFound(product_id.to_string()))
    }
}

fn check_quantity(product_id: &str, requested: i64, available: i64) -> Result<(), CartError> {
    if requested > MAX_ITEM_QUANTITY {
        return Err(CartError::QuantityTooLarge {
            requested,
            max: MAX_ITEM_QUANTITY,
        });
    }
    if requested > available {
        return Err(CartError::StockLimit {
            product_id: product_id.to_string(),
            available,
            requested,
        });
    }
    Ok(())
}

fn removed(line: &CartLine, reason: RemovalReason) -> RemovedLine {
    RemovedLine {
        product_id: line.product_id.clone(),
        name: line.name.clone(),
        reason,
    }
}

/// Cart totals summary for command responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub total: Money,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            total: cart.total(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(id: &str, price_cents: i64, stock: i64) -> ProductSnapshot {
        ProductSnapshot::new(id, format!("Product {}", id), price_cents, Decimal::from(stock))
    }

    fn cart_with(id: &str, quantity: i64, stock: i64) -> Cart {
        let mut cart = Cart::new();
        let p = product(id, 1000, stock);
        for _ in 0..quantity {
            cart = cart.add(&p).unwrap();
        }
        cart
    }

    #[test]
    fn test_add_creates_then_increments_line() {
        let p = product("A", 999, 10);
        let cart = Cart::new().add(&p).unwrap().add(&p).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.total().cents(), 1998);
    }

    #[test]
    fn test_add_rejects_inactive_product() {
        let mut p = product("A", 999, 10);
        p.is_active = false;
        let err = Cart::new().add(&p).unwrap_err();
        assert!(matches!(err, CartError::ProductInactive { .. }));
    }

    #[test]
    fn test_add_rejects_out_of_stock_product() {
        let err = Cart::new().add(&product("A", 999, 0)).unwrap_err();
        assert_eq!(
            err,
            CartError::StockLimit {
                product_id: "A".to_string(),
                available: 0,
                requested: 1,
            }
        );
    }

    #[test]
    fn test_increase_is_bounded_by_cached_stock() {
        let cart = cart_with("A", 2, 2);
        let err = cart.increase("A").unwrap_err();
        assert!(matches!(err, CartError::StockLimit { available: 2, requested: 3, .. }));
        // Original snapshot untouched
        assert_eq!(cart.line("A").unwrap().quantity, 2);
    }

    #[test]
    fn test_add_uses_fresh_stock_for_existing_line() {
        let cart = cart_with("A", 2, 2);
        let restocked = product("A", 1000, 5);
        let cart = cart.add(&restocked).unwrap();
        assert_eq!(cart.line("A").unwrap().quantity, 3);
        assert_eq!(cart.line("A").unwrap().stock, 5);
    }

    #[test]
    fn test_decrease_at_one_removes_line() {
        let cart = cart_with("A", 1, 5).decrease("A").unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity() {
        let cart = cart_with("A", 1, 5);
        assert_eq!(cart.set_quantity("A", 4).unwrap().line("A").unwrap().quantity, 4);
        assert!(cart.set_quantity("A", 0).unwrap().is_empty());
        assert!(matches!(
            cart.set_quantity("A", 6),
            Err(CartError::StockLimit { .. })
        ));
        assert!(matches!(
            cart.set_quantity("A", -1),
            Err(CartError::InvalidQuantity { requested: -1 })
        ));
        assert!(matches!(
            cart.set_quantity("B", 1),
            Err(CartError::LineNotFound(_))
        ));
    }

    #[test]
    fn test_quantity_cap_applies_before_stock() {
        let cart = cart_with("A", 1, 5000);
        assert!(matches!(
            cart.set_quantity("A", 1000),
            Err(CartError::QuantityTooLarge { requested: 1000, max: 999 })
        ));
    }

    #[test]
    fn test_cart_full() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart = cart.add(&product(&i.to_string(), 100, 1)).unwrap();
        }
        let err = cart.add(&product("extra", 100, 1)).unwrap_err();
        assert_eq!(err, CartError::CartFull { max: MAX_CART_ITEMS });
    }

    #[test]
    fn test_promotion_price_is_frozen() {
        let promo = Promotion {
            id: "p".to_string(),
            label: "10% off".to_string(),
            discount_bps: 1000,
        };
        let p = product("A", 2000, 5).with_promotion(promo);
        let cart = Cart::new().add(&p).unwrap();
        assert_eq!(cart.line("A").unwrap().unit_price.cents(), 1800);

        // Promotion ends, price on the line stays
        let outcome = cart.reconcile(&[product("A", 2000, 5)]);
        assert_eq!(outcome.cart.line("A").unwrap().unit_price.cents(), 1800);
    }

    #[test]
    fn test_reconcile_clamps_quantity_to_lower_stock() {
        let cart = cart_with("A", 3, 5);
        let outcome = cart.reconcile(&[product("A", 1000, 2)]);

        let line = outcome.cart.line("A").unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.stock, 2);
        assert!(outcome.changes.removed.is_empty());
        assert_eq!(
            outcome.changes.adjusted,
            vec![AdjustedLine {
                product_id: "A".to_string(),
                name: "Product A".to_string(),
                from: 3,
                to: 2,
            }]
        );
    }

    #[test]
    fn test_reconcile_drops_inactive_zero_and_missing() {
        let cart = cart_with("A", 1, 5)
            .add(&product("B", 100, 5))
            .unwrap()
            .add(&product("C", 100, 5))
            .unwrap();

        let mut inactive = product("A", 1000, 5);
        inactive.is_active = false;
        let outcome = cart.reconcile(&[inactive, product("B", 100, 0)]);

        assert!(outcome.cart.is_empty());
        let reasons: Vec<_> = outcome.changes.removed.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RemovalReason::Inactive,
                RemovalReason::OutOfStock,
                RemovalReason::Missing
            ]
        );
    }

    #[test]
    fn test_reconcile_restock_keeps_quantity() {
        let cart = cart_with("A", 2, 2);
        let outcome = cart.reconcile(&[product("A", 1000, 9)]);

        let line = outcome.cart.line("A").unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.stock, 9);
        assert!(!outcome.changes.affects_selection());
        assert_eq!(outcome.changes.restocked.len(), 1);
    }

    #[test]
    fn test_reconcile_unchanged_reports_nothing() {
        let cart = cart_with("A", 2, 4);
        let outcome = cart.reconcile(&[product("A", 1000, 4)]);
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.cart, cart);
    }

    #[test]
    fn test_no_line_exceeds_stock_after_reconcile() {
        let cart = cart_with("A", 5, 9)
            .add(&product("B", 100, 9))
            .unwrap()
            .set_quantity("B", 7)
            .unwrap();

        for stock in 0..10 {
            let outcome = cart.reconcile(&[product("A", 1000, stock), product("B", 100, stock)]);
            for line in outcome.cart.lines() {
                assert!(line.quantity <= line.stock);
                assert!(line.quantity >= 1);
            }
        }
    }

    #[test]
    fn test_from_lines_drops_invalid_rows() {
        let line = CartLine::from_product(&product("A", 100, 5));
        let mut zero = line.clone();
        zero.product_id = "Z".to_string();
        zero.quantity = 0;

        let cart = Cart::from_lines(vec![line.clone(), zero, line]);
        assert_eq!(cart.item_count(), 1);
    }
}
