//! # Sync Error Types
//!
//! Error types for the protocol services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Backend      │  │     Local rules         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  BackendError   │  │  Core (validation,      │ │
//! │  │  InvalidUrl     │  │   └ kind        │  │   cart guard, proof,    │ │
//! │  │  ConfigLoad/Save│  │                 │  │   transitions)          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐ │
//! │  │    Database     │  │    Lookup / state                            │ │
//! │  │  DatabaseError  │  │  OrderNotFound, UnknownProduct, SaleNotFound │ │
//! │  │                 │  │  NotReady                                    │ │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backend Error Kinds
//! The HTTP adapter is the only code that looks at status codes and bodies.
//! Everything above it branches on [`BackendErrorKind`].

use std::fmt;

use thiserror::Error;
use vitrina_core::{CartError, CoreError, TrackerStatus};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

// =============================================================================
// Backend Error
// =============================================================================

/// What went wrong talking to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Could not reach the backend.
    Network,

    /// The request timed out.
    Timeout,

    /// An order already exists for the sale. The confirmation happened.
    AlreadyConfirmed,

    /// The sale was rung in store; it has nothing to confirm online.
    SaleNotOnline,

    /// Sale, product or order unknown to the backend.
    NotFound,

    /// Any other non-success status.
    Rejected { status: u16 },

    /// The response body could not be understood.
    InvalidResponse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::Network => write!(f, "network"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::AlreadyConfirmed => write!(f, "already confirmed"),
            BackendErrorKind::SaleNotOnline => write!(f, "sale not online"),
            BackendErrorKind::NotFound => write!(f, "not found"),
            BackendErrorKind::Rejected { status } => write!(f, "rejected (HTTP {status})"),
            BackendErrorKind::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

/// A failed backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Backend {kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        BackendError {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidResponse, message)
    }

    /// Transient failures: the next timer tick may succeed.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            BackendErrorKind::Network | BackendErrorKind::Timeout => true,
            BackendErrorKind::Rejected { status } => status >= 500 || status == 429,
            _ => false,
        }
    }

    /// Conflicts that prove the desired end state already holds.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::AlreadyConfirmed | BackendErrorKind::SaleNotOnline
        )
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Error type for every protocol service.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Backend
    // =========================================================================
    #[error(transparent)]
    Backend(#[from] BackendError),

    // =========================================================================
    // Local Rules
    // =========================================================================
    /// Rejected locally before any network call.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Database
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Lookup / State
    // =========================================================================
    #[error("Order {0} is not tracked on this device")]
    OrderNotFound(String),

    #[error("Product {0} is not in the stock cache")]
    UnknownProduct(String),

    #[error("Sale {0} not found")]
    SaleNotFound(String),

    /// The backend accepted the sale but this device could not track it.
    /// The order number is the customer's only handle on it.
    #[error("Order {order_number} was placed but could not be saved on this device: {reason}")]
    UntrackedSale {
        order_number: String,
        sale_id: String,
        reason: String,
    },

    /// The operation needs the order in a different state.
    #[error("Order {order_number} is {status}; {reason}")]
    NotReady {
        order_number: String,
        status: TrackerStatus,
        reason: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CartError> for SyncError {
    fn from(err: CartError) -> Self {
        SyncError::Core(CoreError::Cart(err))
    }
}

impl From<vitrina_db::DbError> for SyncError {
    fn from(err: vitrina_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Backend(e) => e.is_retryable(),
            SyncError::DatabaseError(_) => true,
            _ => false,
        }
    }

    /// Returns true if the failure was caught locally, before any request.
    pub fn is_local_rejection(&self) -> bool {
        matches!(self, SyncError::Core(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            SyncError::Backend(e) => Some(e.kind),
            _ => None,
        }
    }
}
