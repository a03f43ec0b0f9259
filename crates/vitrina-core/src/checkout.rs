//! # Checkout Draft Builder
//!
//! Turns a cart snapshot and the contact form into the payload the backend
//! turns into a sale. Assigns no identifiers: the backend returns the sale id
//! and order number.
//!
//! ## Flow
//! ```text
//! Cart snapshot ──┐
//!                 ├──► build_sale_draft ──► SaleDraft ──► POST /public/sales
//! ContactFields ──┘          │
//!                            └──► ValidationErrors (nothing is sent)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::Cart;
use crate::error::{CoreError, ValidationError, ValidationErrors};
use crate::money::Money;
use crate::types::PaymentMethod;
use crate::validation::{validate_max_len, validate_phone, validate_required};

const MAX_NAME_LEN: usize = 120;
const MAX_ADDRESS_LEN: usize = 300;
const MAX_DOCUMENT_LEN: usize = 20;
const MAX_NOTES_LEN: usize = 500;

// =============================================================================
// Contact Fields
// =============================================================================

/// What the customer types into the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContactFields {
    pub name: String,
    pub phone: String,
    /// Delivery address.
    pub address: String,
    /// National id or tax number, if the customer wants it on the receipt.
    pub document_id: Option<String>,
    pub notes: Option<String>,
}

impl ContactFields {
    /// Checks every field and reports all failures together.
    ///
    /// Name, phone and address are required.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_required("name", &self.name, MAX_NAME_LEN));
        errors.check(validate_phone("phone", &self.phone));
        errors.check(validate_required("address", &self.address, MAX_ADDRESS_LEN));
        if let Some(doc) = &self.document_id {
            errors.check(validate_max_len("document_id", doc, MAX_DOCUMENT_LEN));
        }
        if let Some(notes) = &self.notes {
            errors.check(validate_max_len("notes", notes, MAX_NOTES_LEN));
        }
        errors.into_result()
    }

    /// Identifier the backend stores for the customer: the document id when
    /// given, the phone number otherwise.
    pub fn customer_identifier(&self) -> String {
        match self.document_id.as_deref().map(str::trim) {
            Some(doc) if !doc.is_empty() => doc.to_string(),
            _ => self.phone.trim().to_string(),
        }
    }

    fn delivery_notes(&self) -> String {
        let mut notes = format!(
            "Address: {}\nPhone: {}",
            self.address.trim(),
            self.phone.trim()
        );
        if let Some(extra) = self.notes.as_deref().map(str::trim) {
            if !extra.is_empty() {
                notes.push('\n');
                notes.push_str(extra);
            }
        }
        notes
    }
}

// =============================================================================
// Sale Draft
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDraftLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Backend-createable sale payload. Never stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDraft {
    pub customer_name: String,
    pub customer_identifier: String,
    pub payment_method: PaymentMethod,
    pub notes: String,
    /// Always zero for online orders; promotions are already in line prices.
    pub discount: Money,
    pub details: Vec<SaleDraftLine>,
}

impl SaleDraft {
    pub fn total(&self) -> Money {
        self.details
            .iter()
            .map(|d| d.unit_price.multiply_quantity(d.quantity))
            .sum::<Money>()
            - self.discount
    }
}

/// Builds the sale payload for `cart`.
///
/// ## Errors
/// - `CoreError::EmptyCart` when there is nothing to order
/// - `CoreError::Form` with every failing field otherwise
pub fn build_sale_draft(
    cart: &Cart,
    contact: &ContactFields,
    payment_method: PaymentMethod,
) -> Result<SaleDraft, CoreError> {
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    let mut errors = match contact.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };
    if payment_method == PaymentMethod::Other {
        errors.push(ValidationError::InvalidFormat {
            field: "payment_method".to_string(),
            reason: "choose bank transfer, wallet or card".to_string(),
        });
    }
    errors.into_result()?;

    Ok(SaleDraft {
        customer_name: contact.name.trim().to_string(),
        customer_identifier: contact.customer_identifier(),
        payment_method,
        notes: contact.delivery_notes(),
        discount: Money::zero(),
        details: cart
            .lines()
            .iter()
            .map(|l| SaleDraftLine {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
            .collect(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
