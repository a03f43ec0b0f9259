//! # API Error Type
//!
//! Unified error type for desk commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Vitrina Desk                           │
//! │                                                                         │
//! │  Command Function: Result<T, ApiError>                                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Local rule?      ─── CoreError / CartError ──────────┐                │
//! │         │                                              │                │
//! │         ▼                                              ▼                │
//! │  Local store?     ─── DbError ─────────────────────► ApiError ──► UI   │
//! │         │                                              ▲                │
//! │         ▼                                              │                │
//! │  Backend?         ─── SyncError::Backend(kind) ───────┘                │
//! │                                                                         │
//! │  { "code": "INSUFFICIENT_STOCK", "message": "Only 2 of A in stock..." } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only user-initiated commands produce an `ApiError`. Background tasks log
//! and report through the event emitter instead.

use serde::Serialize;
use vitrina_core::{CartError, CoreError};
use vitrina_db::DbError;
use vitrina_sync::{BackendErrorKind, SyncError};

/// API error returned from desk commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "BACKEND_UNAVAILABLE",
///   "message": "Could not reach the shop server, try again"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Local store operation failed (500)
    DatabaseError,

    /// Order is not in a state that allows the operation (422)
    BusinessLogic,

    /// Internal error (500)
    Internal,

    /// Cart operation refused
    CartError,

    /// Not enough stock, locally or at the backend
    InsufficientStock,

    /// Payment step refused
    PaymentError,

    /// Backend unreachable or timed out; the same action can be retried
    BackendUnavailable,

    /// Backend answered with an error
    BackendRejected,

    /// Configuration is missing or invalid
    ConfigError,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", resource, id),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// True when repeating the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::BackendUnavailable | ErrorCode::DatabaseError
        )
    }
}

/// Converts local store errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::Corrupt { column, reason } => {
                tracing::error!(column = %column, "Corrupt row: {}", reason);
                ApiError::new(ErrorCode::DatabaseError, "Stored data could not be read")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts cart guard errors to API errors.
impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        let message = err.to_string();
        match err {
            CartError::StockLimit { .. } => ApiError::new(ErrorCode::InsufficientStock, message),
            CartError::ProductInactive { .. } | CartError::CartFull { .. } => {
                ApiError::new(ErrorCode::CartError, message)
            }
            CartError::InvalidQuantity { .. } | CartError::QuantityTooLarge { .. } => {
                ApiError::validation(message)
            }
            CartError::LineNotFound(id) => ApiError::not_found("Cart line", &id),
        }
    }
}

/// Converts core rule errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InvalidTransition { .. } => ApiError::new(ErrorCode::BusinessLogic, message),
            CoreError::ProofTooLarge { .. }
            | CoreError::ProofNotImage { .. }
            | CoreError::ProofEmpty => ApiError::validation(message),
            CoreError::InvalidPaymentAmount { .. } | CoreError::MethodNotInstant { .. } => {
                ApiError::new(ErrorCode::PaymentError, message)
            }
            CoreError::EmptyCart => ApiError::new(ErrorCode::CartError, message),
            CoreError::Form(_) | CoreError::Validation(_) => ApiError::validation(message),
            CoreError::Cart(e) => ApiError::from(e),
        }
    }
}

/// Converts protocol service errors to API errors.
///
/// The backend's own wording never reaches the user; the kind decides the
/// message.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidConfig(_)
            | SyncError::InvalidUrl(_)
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_) => ApiError::new(ErrorCode::ConfigError, err.to_string()),
            SyncError::Backend(e) => match e.kind {
                BackendErrorKind::Network | BackendErrorKind::Timeout => ApiError::new(
                    ErrorCode::BackendUnavailable,
                    "Could not reach the shop server, try again",
                ),
                BackendErrorKind::AlreadyConfirmed => ApiError::new(
                    ErrorCode::BusinessLogic,
                    "This payment was already confirmed",
                ),
                BackendErrorKind::SaleNotOnline => ApiError::new(
                    ErrorCode::BusinessLogic,
                    "This sale was not placed online",
                ),
                BackendErrorKind::NotFound => {
                    ApiError::new(ErrorCode::NotFound, "The shop server has no such record")
                }
                BackendErrorKind::Rejected { status: 422 } => ApiError::new(
                    ErrorCode::InsufficientStock,
                    "Some items are no longer available in the requested quantity",
                ),
                BackendErrorKind::Rejected { status } if status >= 500 => ApiError::new(
                    ErrorCode::BackendUnavailable,
                    "The shop server failed, try again",
                ),
                BackendErrorKind::Rejected { status } => {
                    tracing::error!(status, "Backend rejected request: {}", e.message);
                    ApiError::new(ErrorCode::BackendRejected, "The shop server refused the request")
                }
                BackendErrorKind::InvalidResponse => {
                    tracing::error!("Unreadable backend response: {}", e.message);
                    ApiError::new(ErrorCode::BackendRejected, "The shop server sent an unreadable reply")
                }
            },
            SyncError::Core(e) => ApiError::from(e),
            SyncError::DatabaseError(e) => {
                tracing::error!("Local store failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            SyncError::OrderNotFound(n) => ApiError::not_found("Order", &n),
            SyncError::UnknownProduct(id) => ApiError::not_found("Product", &id),
            SyncError::SaleNotFound(id) => ApiError::not_found("Sale", &id),
            SyncError::NotReady { .. } => ApiError::new(ErrorCode::BusinessLogic, err.to_string()),
            SyncError::UntrackedSale { .. } => {
                ApiError::new(ErrorCode::DatabaseError, err.to_string())
            }
            SyncError::ShuttingDown | SyncError::ChannelError(_) | SyncError::Internal(_) => {
                tracing::error!("Internal error: {}", err);
                ApiError::internal("Internal error")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
