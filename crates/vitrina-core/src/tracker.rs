//! # Order Lifecycle Tracker
//!
//! The client-side record of one order, keyed by the backend order number.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   pending_payment ──► pending_confirmation ──┬──► confirmed  (receipt)  │
//! │         │                    ▲               │                          │
//! │         │  proof uploaded /  │               └──► rejected              │
//! │         └─ card simulated ───┘                                          │
//! │                                                                         │
//! │   Moves only forward. Terminal states never change again, so a late    │
//! │   poller tick or a duplicated staff click is rejected by the same rule. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A staff decision may land on an entry still in `pending_payment` (the
//! proof reached the staff device but the customer's local flip did not).
//! That is still a forward move.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::{Cart, CartLine};
use crate::error::CoreError;
use crate::money::Money;
use crate::types::{CreatedSale, PaymentMethod, SaleRecord};
use crate::validation::validate_payment_amount;

// =============================================================================
// Tracker Status
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    PendingPayment,
    PendingConfirmation,
    Confirmed,
    Rejected,
}

impl TrackerStatus {
    fn rank(&self) -> u8 {
        match self {
            TrackerStatus::PendingPayment => 0,
            TrackerStatus::PendingConfirmation => 1,
            TrackerStatus::Confirmed | TrackerStatus::Rejected => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerStatus::Confirmed | TrackerStatus::Rejected)
    }

    /// Forward moves out of a non-terminal state.
    pub fn can_transition_to(&self, to: TrackerStatus) -> bool {
        !self.is_terminal() && to.rank() > self.rank()
    }

    /// Statuses this one may move to, for the conditional UPDATE in the
    /// local store.
    pub fn predecessors(&self) -> &'static [TrackerStatus] {
        match self {
            TrackerStatus::PendingPayment => &[],
            TrackerStatus::PendingConfirmation => &[TrackerStatus::PendingPayment],
            TrackerStatus::Confirmed | TrackerStatus::Rejected => &[
                TrackerStatus::PendingPayment,
                TrackerStatus::PendingConfirmation,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::PendingPayment => "pending_payment",
            TrackerStatus::PendingConfirmation => "pending_confirmation",
            TrackerStatus::Confirmed => "confirmed",
            TrackerStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Staff Decision
// =============================================================================

/// The two terminal outcomes a staff operator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StaffDecision {
    Confirmed,
    Rejected,
}

impl StaffDecision {
    pub fn status(&self) -> TrackerStatus {
        match self {
            StaffDecision::Confirmed => TrackerStatus::Confirmed,
            StaffDecision::Rejected => TrackerStatus::Rejected,
        }
    }
}

// =============================================================================
// Payment Details
// =============================================================================

/// What the customer did to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub amount: Money,
    /// Card authorisation code or transfer reference.
    pub reference: Option<String>,
    /// MIME type of the uploaded proof, for proof-based methods.
    pub proof_mime: Option<String>,
    #[ts(as = "String")]
    pub submitted_at: DateTime<Utc>,
}

/// What the customer has to do next, as shown on the order page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerAction {
    UploadProof,
    CompleteCardPayment,
    WaitForConfirmation,
    /// Rejected orders are not resumed; the customer starts a new one.
    StartNewOrder,
    Done,
}

// =============================================================================
// Order Line
// =============================================================================

/// A line of the order as it was submitted, kept for the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    pub fn from_cart(cart: &Cart) -> Vec<OrderLine> {
        cart.lines().iter().map(OrderLine::from).collect()
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        OrderLine {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

// =============================================================================
// Tracker Entry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrackerEntry {
    pub order_number: String,
    pub sale_id: String,
    pub status: TrackerStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub total: Money,
    /// Submitted lines. Empty for entries mirrored on a staff device.
    pub lines: Vec<OrderLine>,
    pub payment_details: Option<PaymentDetails>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub receipt_issued_at: Option<DateTime<Utc>>,
}

impl TrackerEntry {
    /// Entry for a sale the backend just accepted.
    ///
    /// Every method starts in `pending_payment`: proof-based methods wait
    /// for the upload, card waits for its simulated charge.
    pub fn new_for_method(
        created: &CreatedSale,
        customer_name: &str,
        payment_method: PaymentMethod,
        lines: Vec<OrderLine>,
    ) -> Self {
        TrackerEntry {
            order_number: created.sale_number.clone(),
            sale_id: created.id.clone(),
            status: TrackerStatus::PendingPayment,
            payment_method,
            customer_name: customer_name.to_string(),
            total: created.total,
            lines,
            payment_details: None,
            created_at: created.created_at,
            updated_at: created.created_at,
            confirmed_at: None,
            rejected_at: None,
            receipt_issued_at: None,
        }
    }

    /// Entry a staff device creates for a sale it never saw drafted, so the
    /// decision is remembered across queue refreshes.
    pub fn mirror_of(sale: &SaleRecord, decision: StaffDecision, at: DateTime<Utc>) -> Self {
        let mut entry = TrackerEntry {
            order_number: sale.sale_number.clone(),
            sale_id: sale.id.clone(),
            status: TrackerStatus::PendingConfirmation,
            payment_method: sale.payment_method,
            customer_name: sale.customer_name.clone(),
            total: sale.total,
            lines: Vec::new(),
            payment_details: None,
            created_at: sale.created_at,
            updated_at: at,
            confirmed_at: None,
            rejected_at: None,
            receipt_issued_at: None,
        };
        entry.stamp(decision.status(), at);
        entry
    }

    /// Applies a forward transition.
    pub fn transition(&mut self, to: TrackerStatus, at: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                order_number: self.order_number.clone(),
                from: self.status,
                to,
            });
        }
        self.stamp(to, at);
        Ok(())
    }

    fn stamp(&mut self, to: TrackerStatus, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        match to {
            TrackerStatus::Confirmed => self.confirmed_at = Some(at),
            TrackerStatus::Rejected => self.rejected_at = Some(at),
            _ => {}
        }
    }

    /// The confirmation poller runs only in this state.
    pub fn awaits_confirmation(&self) -> bool {
        self.status == TrackerStatus::PendingConfirmation
    }

    pub fn next_action(&self) -> CustomerAction {
        match self.status {
            TrackerStatus::PendingPayment if self.payment_method.is_instant() => {
                CustomerAction::CompleteCardPayment
            }
            TrackerStatus::PendingPayment => CustomerAction::UploadProof,
            TrackerStatus::PendingConfirmation => CustomerAction::WaitForConfirmation,
            TrackerStatus::Rejected => CustomerAction::StartNewOrder,
            TrackerStatus::Confirmed => CustomerAction::Done,
        }
    }

    /// Checks a simulated card charge against this order.
    ///
    /// ## Rules
    /// - The order was placed with an instant method
    /// - It is still in `pending_payment`
    /// - The amount is positive and equals the order total
    pub fn check_card_payment(&self, amount: Money) -> Result<(), CoreError> {
        if !self.payment_method.is_instant() {
            return Err(CoreError::MethodNotInstant {
                method: self.payment_method,
            });
        }
        if self.status != TrackerStatus::PendingPayment {
            return Err(CoreError::InvalidTransition {
                order_number: self.order_number.clone(),
                from: self.status,
                to: TrackerStatus::PendingConfirmation,
            });
        }
        validate_payment_amount(amount.cents())?;
        if amount != self.total {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!("expected {}, got {}", self.total, amount),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
