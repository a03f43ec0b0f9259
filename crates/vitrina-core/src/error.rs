//! # Error Types
//!
//! Domain-specific error types for vitrina-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vitrina-core errors (this file)                                       │
//! │  ├── ValidationError   - One field failed a rule                       │
//! │  ├── ValidationErrors  - Every failing field of a form, in order       │
//! │  ├── CartError         - Stock guard, limits, unknown lines            │
//! │  └── CoreError         - Tracker transitions, proofs, payments         │
//! │                                                                         │
//! │  vitrina-db errors                                                     │
//! │  └── DbError           - Local store failures                          │
//! │                                                                         │
//! │  vitrina-sync errors                                                   │
//! │  ├── BackendError      - Typed backend failure kinds                   │
//! │  └── SyncError         - Protocol service failures                     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → ApiError    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is rejected locally, before any network call is made.

use std::fmt;

use thiserror::Error;

use crate::tracker::TrackerStatus;
use crate::types::PaymentMethod;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations in the order flow.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A tracker entry was asked to move backwards or sideways.
    ///
    /// ## When This Occurs
    /// - A late poller tick trying to re-confirm a rejected order
    /// - Advancing an order that is already terminal
    #[error("Order {order_number} cannot move from {from} to {to}")]
    InvalidTransition {
        order_number: String,
        from: TrackerStatus,
        to: TrackerStatus,
    },

    /// Proof attachment exceeds the configured limit.
    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    ProofTooLarge { size: usize, max: usize },

    /// Proof attachment is not an image.
    #[error("Payment proof must be an image, got '{mime}'")]
    ProofNotImage { mime: String },

    /// Proof attachment has no content.
    #[error("Payment proof is empty")]
    ProofEmpty,

    /// Simulated payment amount does not match the order.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// The order's payment method has no simulated confirmation step.
    #[error("Payment method {method} cannot be completed instantly")]
    MethodNotInstant { method: PaymentMethod },

    /// Checkout attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Checkout form failed validation.
    #[error("{0}")]
    Form(ValidationErrors),

    /// Cart rule violation.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Cart Error
// =============================================================================

/// Cart mutation rejected by the client-side guard.
///
/// ## User Workflow
/// ```text
/// Click "+" on a line (qty: 5)
///      │
///      ▼
/// Cached stock: 5
///      │
///      ▼
/// StockLimit { product_id: "A", available: 5, requested: 6 }
///      │
///      ▼
/// Cart unchanged, UI shows a warning
/// ```
///
/// The guard is advisory. The backend re-checks stock when the sale is
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Increment would exceed the cached stock figure.
    #[error("Only {available} of {product_id} in stock, requested {requested}")]
    StockLimit {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Product is marked inactive.
    #[error("Product {product_id} is not available")]
    ProductInactive { product_id: String },

    /// Quantity is negative.
    #[error("Quantity {requested} is not valid")]
    InvalidQuantity { requested: i64 },

    /// Line quantity exceeds the hard cap.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Cart already holds the maximum number of distinct lines.
    #[error("Cart cannot have more than {max} items")]
    CartFull { max: usize },

    /// Operation refers to a product that has no line in the cart.
    #[error("Product {0} not in cart")]
    LineNotFound(String),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These carry the field name so a form can highlight it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid phone, invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::InvalidFormat { field, .. } => field,
        }
    }
}

// =============================================================================
// Validation Error Set
// =============================================================================

/// All validation failures of a form, in the order the fields were checked.
///
/// Checkout validates every field before reporting, so the customer sees
/// all problems at once rather than one per submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Records the error of `result`, if any.
    pub fn check(&mut self, result: Result<(), ValidationError>) {
        if let Err(e) = result {
            self.0.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// True if any error refers to `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    /// `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::Form(errors)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
