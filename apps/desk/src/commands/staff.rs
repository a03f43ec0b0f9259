//! # Staff Commands
//!
//! Operations desk: the pending-payment queue and the confirm / reject
//! actions on it.
//!
//! ## Confirmation Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_pending_payments                                                   │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  V-0042  Ana Quispe     wallet         S/ 35.00   [proof]        │  │
//! │  │  V-0043  Luis Rojas     bank_transfer  S/ 12.50   [proof]        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         │                                     │                         │
//! │         ▼                                     ▼                         │
//! │  confirm_payment(sale_id)              reject_payment(sale_id)          │
//! │    POST confirm-online                   local record only              │
//! │    "already confirmed" → success                                        │
//! │         │                                     │                         │
//! │         └─────────────► leaves the queue ◄────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;
use vitrina_core::queue::ProofSource;
use vitrina_core::{Money, PaymentMethod, PendingPayment};
use vitrina_sync::ConfirmOutcome;

// =============================================================================
// Response DTOs
// =============================================================================

/// A queue row. The proof itself is returned as a data URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPaymentResponse {
    pub sale_id: String,
    pub sale_number: String,
    pub customer_name: String,
    pub payment_method: PaymentMethod,
    pub total: Money,
    pub created_at: String,
    pub proof: String,
    pub proof_source: ProofSource,
}

impl From<PendingPayment> for PendingPaymentResponse {
    fn from(p: PendingPayment) -> Self {
        PendingPaymentResponse {
            sale_id: p.sale.id,
            sale_number: p.sale.sale_number,
            customer_name: p.sale.customer_name,
            payment_method: p.sale.payment_method,
            total: p.sale.total,
            created_at: p.sale.created_at.to_rfc3339(),
            proof: p.proof,
            proof_source: p.proof_source,
        }
    }
}

/// Result of a confirm action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub sale_id: String,
    /// `true` for both a fresh confirmation and one that had already happened.
    pub confirmed: bool,
    /// Backend order id, when this call created it.
    pub order_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub sale_id: String,
    /// False when the sale had already been decided on this desk.
    pub recorded: bool,
}

// =============================================================================
// Commands
// =============================================================================

/// Online sales of the current business day waiting for validation, newest
/// first.
pub async fn get_pending_payments(
    state: &AppState,
) -> Result<Vec<PendingPaymentResponse>, ApiError> {
    debug!("get_pending_payments command");
    let pending = state.queue.list().await?;
    Ok(pending.into_iter().map(PendingPaymentResponse::from).collect())
}

/// Confirms the payment of a sale.
///
/// ## Outcomes
/// - Backend order created: confirmed
/// - Another desk (or a retried click) got there first: confirmed, silently
/// - Sale rung in store: not confirmed, nothing changed
/// - Already rejected on this desk: not confirmed, nothing sent
/// - Anything else: error, the sale stays in the queue
pub async fn confirm_payment(state: &AppState, sale_id: &str) -> Result<ConfirmResponse, ApiError> {
    debug!(sale_id = %sale_id, "confirm_payment command");
    let outcome = state.actuator.confirm_by_id(sale_id).await?;

    let confirmed = outcome.is_confirmed();
    let (order_id, message) = match outcome {
        ConfirmOutcome::Confirmed { order } => (Some(order.id), "Payment confirmed".to_string()),
        ConfirmOutcome::AlreadyConfirmed => (None, "Payment confirmed".to_string()),
        ConfirmOutcome::NotOnline => (None, "Sale was not placed online".to_string()),
        ConfirmOutcome::AlreadyRejected => (None, "Payment was already rejected".to_string()),
    };
    info!(sale_id = %sale_id, confirmed, "Confirm action handled");

    Ok(ConfirmResponse {
        sale_id: sale_id.to_string(),
        confirmed,
        order_id,
        message,
    })
}

/// Rejects the payment of a sale on this desk.
pub async fn reject_payment(state: &AppState, sale_id: &str) -> Result<RejectResponse, ApiError> {
    debug!(sale_id = %sale_id, "reject_payment command");
    let outcome = state.actuator.reject_by_id(sale_id).await?;

    Ok(RejectResponse {
        sale_id: sale_id.to_string(),
        recorded: outcome.recorded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::customer::{add_to_cart, refresh_stock, submit_order, upload_proof};
    use crate::error::ErrorCode;
    use crate::state::testing::{contact, customer_state, staff_state, PNG};
    use vitrina_sync::testing::Op;
    use vitrina_sync::BackendErrorKind;

    /// Places a wallet order with a proof through the customer commands.
    async fn place_order(customer: &AppState) -> String {
        refresh_stock(customer).await.unwrap();
        add_to_cart(customer, "A").await.unwrap();
        let order = submit_order(customer, &contact(), PaymentMethod::Wallet)
            .await
            .unwrap();
        let number = order.entry.order_number.clone();
        upload_proof(customer, &number, "image/png", PNG.to_vec())
            .await
            .unwrap();
        customer.shutdown().await;
        order.entry.sale_id
    }

    #[tokio::test]
    async fn test_confirm_removes_from_queue() {
        let (customer, backend) = customer_state(&[("A", 5)]).await;
        let staff = staff_state(&backend).await;
        let sale_id = place_order(&customer).await;

        let pending = get_pending_payments(&staff).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sale_id, sale_id);
        assert_eq!(pending[0].proof_source, ProofSource::Backend);

        let response = confirm_payment(&staff, &sale_id).await.unwrap();
        assert!(response.confirmed);
        assert!(response.order_id.is_some());
        assert!(get_pending_payments(&staff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_confirm_is_success() {
        let (customer, backend) = customer_state(&[("A", 5)]).await;
        let staff = staff_state(&backend).await;
        let sale_id = place_order(&customer).await;

        confirm_payment(&staff, &sale_id).await.unwrap();
        let again = confirm_payment(&staff, &sale_id).await.unwrap();

        assert!(again.confirmed);
        assert!(again.order_id.is_none());
        assert_eq!(backend.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_failure_surfaces() {
        let (customer, backend) = customer_state(&[("A", 5)]).await;
        let staff = staff_state(&backend).await;
        let sale_id = place_order(&customer).await;

        backend.fail_next(Op::ConfirmOnline, BackendErrorKind::Network);
        let err = confirm_payment(&staff, &sale_id).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::BackendUnavailable);
        assert_eq!(get_pending_payments(&staff).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_is_local() {
        let (customer, backend) = customer_state(&[("A", 5)]).await;
        let staff = staff_state(&backend).await;
        let sale_id = place_order(&customer).await;

        let first = reject_payment(&staff, &sale_id).await.unwrap();
        let second = reject_payment(&staff, &sale_id).await.unwrap();

        assert!(first.recorded);
        assert!(!second.recorded);
        assert_eq!(backend.calls(Op::ConfirmOnline), 0);
        assert!(get_pending_payments(&staff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_after_reject_keeps_rejection() {
        let (customer, backend) = customer_state(&[("A", 5)]).await;
        let staff = staff_state(&backend).await;
        let sale_id = place_order(&customer).await;

        reject_payment(&staff, &sale_id).await.unwrap();
        let response = confirm_payment(&staff, &sale_id).await.unwrap();

        assert!(!response.confirmed);
        assert_eq!(response.order_id, None);
        assert!(backend.orders().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let (_, backend) = customer_state(&[]).await;
        let staff = staff_state(&backend).await;
        let err = confirm_payment(&staff, "missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
