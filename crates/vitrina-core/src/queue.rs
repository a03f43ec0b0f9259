//! # Pending-Payment Filter
//!
//! Which online sales still need a staff member to look at the proof.
//!
//! ```text
//! all sales ──► online? ──► no order? ──► today? ──► has proof? ──► not decided locally?
//!                                                      │
//!                                   backend field, or the local outbox copy
//! ```
//!
//! There is no backend status field for "awaiting validation"; this
//! combination of filters is what keeps handled and stale sales out.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::tracker::TrackerStatus;
use crate::types::{OrderRecord, SaleRecord};

/// Where the proof shown to staff came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProofSource {
    Backend,
    /// The upload to the backend has not succeeded yet; this device still
    /// holds the stashed copy.
    LocalFallback,
}

/// A sale waiting for manual validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingPayment {
    pub sale: SaleRecord,
    /// Proof as a data URL.
    pub proof: String,
    pub proof_source: ProofSource,
}

/// Filters `sales` down to the ones awaiting validation, newest first.
///
/// * `local_statuses` - tracker status by sale id; any terminal status
///   (confirmed or rejected on this device) hides the sale
/// * `fallback_proofs` - stashed proof data URLs by sale id
/// * `now` - current instant in the store's offset; defines "today"
pub fn pending_payments(
    sales: &[SaleRecord],
    orders: &[OrderRecord],
    local_statuses: &HashMap<String, TrackerStatus>,
    fallback_proofs: &HashMap<String, String>,
    now: DateTime<FixedOffset>,
) -> Vec<PendingPayment> {
    let ordered: HashSet<&str> = orders.iter().map(|o| o.sale_id.as_str()).collect();
    let today = now.date_naive();
    let offset = *now.offset();

    let mut pending: Vec<PendingPayment> = sales
        .iter()
        .filter(|s| s.is_online())
        .filter(|s| !ordered.contains(s.id.as_str()))
        .filter(|s| s.created_at.with_timezone(&offset).date_naive() == today)
        .filter(|s| {
            !local_statuses
                .get(&s.id)
                .map(TrackerStatus::is_terminal)
                .unwrap_or(false)
        })
        .filter_map(|s| {
            let (proof, proof_source) = match &s.payment_proof {
                Some(p) if s.has_proof() => (p.clone(), ProofSource::Backend),
                _ => {
                    let stashed = fallback_proofs.get(&s.id)?;
                    if stashed.trim().is_empty() {
                        return None;
                    }
                    (stashed.clone(), ProofSource::LocalFallback)
                }
            };
            Some(PendingPayment {
                sale: s.clone(),
                proof,
                proof_source,
            })
        })
        .collect();

    pending.sort_by(|a, b| {
        b.sale
            .created_at
            .cmp(&a.sale.created_at)
            .then_with(|| b.sale.id.cmp(&a.sale.id))
    });
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::PaymentMethod;
    use chrono::{Duration, TimeZone, Utc};

    const PROOF: &str = "data:image/png;base64,AA==";

    fn lima() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn now() -> DateTime<FixedOffset> {
        lima().with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    fn sale(id: &str, minutes_ago: i64) -> SaleRecord {
        SaleRecord {
            id: id.to_string(),
            sale_number: format!("V-{id}"),
            customer_name: "Ana".to_string(),
            payment_method: PaymentMethod::BankTransfer,
            total: Money::from_cents(1000),
            created_at: now().with_timezone(&Utc) - Duration::minutes(minutes_ago),
            created_by_id: None,
            payment_proof: Some(PROOF.to_string()),
        }
    }

    fn run(sales: &[SaleRecord], orders: &[OrderRecord]) -> Vec<String> {
        pending_payments(sales, orders, &HashMap::new(), &HashMap::new(), now())
            .into_iter()
            .map(|p| p.sale.id)
            .collect()
    }

    #[test]
    fn test_newest_first() {
        assert_eq!(run(&[sale("1", 30), sale("2", 5), sale("3", 60)], &[]), ["2", "1", "3"]);
    }

    #[test]
    fn test_excludes_sales_with_an_order() {
        let orders = [OrderRecord {
            id: "o1".to_string(),
            sale_id: "1".to_string(),
        }];
        assert_eq!(run(&[sale("1", 5), sale("2", 5)], &orders), ["2"]);
    }

    #[test]
    fn test_excludes_staff_sales() {
        let mut counter = sale("1", 5);
        counter.created_by_id = Some("u9".to_string());
        assert!(run(&[counter], &[]).is_empty());
    }

    #[test]
    fn test_excludes_sales_without_proof() {
        let mut s = sale("1", 5);
        s.payment_proof = None;
        let mut blank = sale("2", 5);
        blank.payment_proof = Some(String::new());
        assert!(run(&[s, blank], &[]).is_empty());
    }

    #[test]
    fn test_business_day_uses_store_offset() {
        // 23:00 yesterday in Lima, same UTC date as now
        let yesterday = sale("1", 19 * 60);
        // 01:00 today in Lima
        let early_today = sale("2", 17 * 60);
        assert_eq!(run(&[yesterday, early_today], &[]), ["2"]);
    }

    #[test]
    fn test_local_decision_hides_sale() {
        let mut local = HashMap::new();
        local.insert("1".to_string(), TrackerStatus::Confirmed);
        local.insert("2".to_string(), TrackerStatus::Rejected);
        local.insert("3".to_string(), TrackerStatus::PendingConfirmation);

        let out = pending_payments(
            &[sale("1", 1), sale("2", 2), sale("3", 3)],
            &[],
            &local,
            &HashMap::new(),
            now(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sale.id, "3");
    }

    #[test]
    fn test_fallback_proof_is_used_when_backend_field_empty() {
        let mut s = sale("1", 5);
        s.payment_proof = None;
        let mut fallback = HashMap::new();
        fallback.insert("1".to_string(), PROOF.to_string());

        let out = pending_payments(&[s], &[], &HashMap::new(), &fallback, now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].proof_source, ProofSource::LocalFallback);
        assert_eq!(out[0].proof, PROOF);
    }
}
