//! # Money Module
//!
//! Provides the `Money` type for monetary values in integer cents.
//!
//! ## Where Decimals Stop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Backend JSON            Client                    Backend JSON         │
//! │  "price": "12.50"  ──►  Money(1250)  ── math ──►  "unit_price": 12.50   │
//! │        │                    ▲                            ▲              │
//! │        └── from_decimal ────┘                            │              │
//! │                              └──────── to_decimal ───────┘              │
//! │                                                                         │
//! │  Decimals exist only at the wire boundary. Every sum, discount and     │
//! │  comparison inside the client runs on i64 cents.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vitrina_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line = price * 3;
//! assert_eq!(line.cents(), 3297);
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Where Money is Used
/// ```text
/// ProductSnapshot.price ──► CartLine.unit_price ──► CartLine.line_total
///                                                        │
///                                  Cart.total ◄──────────┘
///                                      │
///                                      ├──► SaleDraft (as decimal)
///                                      └──► simulate_card_payment check
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a backend decimal amount (major units) to cents.
    ///
    /// Fractions of a cent are rounded half away from zero. Returns `None`
    /// if the value does not fit in an i64 of cents.
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use vitrina_core::money::Money;
    ///
    /// let d = Decimal::new(12345, 3); // 12.345
    /// assert_eq!(Money::from_decimal(d).unwrap().cents(), 1235);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let cents = amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::ONE_HUNDRED)?;
        cents.to_i64().map(Money)
    }

    /// Converts to a decimal in major units with two fractional digits.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%)
    ///
    /// The discount itself is rounded half up, so a 2.5 cent discount
    /// becomes 3 cents off.
    ///
    /// ## Example
    /// ```rust
    /// use vitrina_core::money::Money;
    ///
    /// let price = Money::from_cents(10000);
    /// assert_eq!(price.apply_percentage_discount(1500).cents(), 8500);
    /// ```
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        let discount = (self.0 as i128 * discount_bps.min(10_000) as i128 + 5000) / 10000;
        Money::from_cents(self.0 - discount as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly rendering. Localised formatting belongs to the frontend.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
