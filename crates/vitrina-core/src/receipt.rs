//! # Receipt
//!
//! The summary handed to the customer once, when their order is confirmed.
//! Rendering and printing happen elsewhere; this is only the data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;
use crate::tracker::{OrderLine, TrackerEntry, TrackerStatus};
use crate::types::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub order_number: String,
    pub sale_id: String,
    pub customer_name: String,
    pub payment_method: PaymentMethod,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    #[ts(as = "String")]
    pub confirmed_at: DateTime<Utc>,
}

impl Receipt {
    /// Builds the receipt for a confirmed entry.
    ///
    /// Only the data is produced here; issuing it exactly once is the local
    /// store's job (`claim_receipt`).
    pub fn for_entry(entry: &TrackerEntry) -> Result<Receipt, CoreError> {
        let confirmed_at = match (entry.status, entry.confirmed_at) {
            (TrackerStatus::Confirmed, Some(at)) => at,
            (status, _) => {
                return Err(CoreError::InvalidTransition {
                    order_number: entry.order_number.clone(),
                    from: status,
                    to: TrackerStatus::Confirmed,
                })
            }
        };

        Ok(Receipt {
            order_number: entry.order_number.clone(),
            sale_id: entry.sale_id.clone(),
            customer_name: entry.customer_name.clone(),
            payment_method: entry.payment_method,
            lines: entry.lines.clone(),
            total: entry.total,
            confirmed_at,
        })
    }

    /// Sum of the line totals. Equals `total` unless the backend applied an
    /// adjustment the client did not see.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}
