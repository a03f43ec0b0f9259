//! # HTTP Backend
//!
//! [`Backend`] over the REST API with `reqwest`.
//!
//! ## Wire Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Backend JSON                      Domain                              │
//! │  ────────────                      ──────                              │
//! │  id: 12 | "12"                  →  String                              │
//! │  price: "10.99" | 10.99         →  Money (cents, half away from zero)  │
//! │  stock: "3.000"                 →  Decimal                             │
//! │  promotion.discount_percent: 15 →  Promotion { discount_bps: 1500 }    │
//! │  created_by_id: null            →  online sale                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Classification
//! Non-success responses carry an optional `code` in their JSON body. The
//! code wins; the status decides otherwise:
//!
//! | Response                                  | Kind               |
//! |-------------------------------------------|--------------------|
//! | `code: "order_exists"`/`"already_confirmed"` | `AlreadyConfirmed` |
//! | `code: "sale_not_online"`                 | `SaleNotOnline`    |
//! | 409 on confirm-online                     | `AlreadyConfirmed` |
//! | 404                                       | `NotFound`         |
//! | anything else                             | `Rejected{status}` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendErrorKind, BackendResult, SyncError, SyncResult};
use vitrina_core::{
    CreatedSale, Money, OrderRecord, PaymentMethod, ProductSnapshot, Promotion, SaleDraft,
    SaleRecord,
};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    WireId::deserialize(d).map(String::from)
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<WireId>::deserialize(d).map(|id| id.map(String::from))
}

fn money(value: Decimal, field: &str) -> BackendResult<Money> {
    Money::from_decimal(value)
        .ok_or_else(|| BackendError::invalid_response(format!("{field} out of range: {value}")))
}

#[derive(Deserialize)]
struct PromotionDto {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default, alias = "label")]
    name: String,
    #[serde(alias = "discount_percentage")]
    discount_percent: Decimal,
}

impl PromotionDto {
    fn into_promotion(self) -> Promotion {
        let bps = (self.discount_percent * Decimal::ONE_HUNDRED)
            .round()
            .clamp(Decimal::ZERO, Decimal::from(10_000));
        Promotion {
            id: self.id,
            label: self.name,
            discount_bps: bps.to_u32().unwrap_or(10_000),
        }
    }
}

#[derive(Deserialize)]
struct ProductDto {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: String,
    price: Decimal,
    #[serde(default)]
    stock: Decimal,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    promotion: Option<PromotionDto>,
}

fn default_true() -> bool {
    true
}

impl ProductDto {
    fn into_snapshot(self) -> BackendResult<ProductSnapshot> {
        Ok(ProductSnapshot {
            price: money(self.price, "price")?,
            id: self.id,
            name: self.name,
            stock: self.stock.max(Decimal::ZERO),
            is_active: self.is_active,
            promotion: self.promotion.map(PromotionDto::into_promotion),
        })
    }
}

#[derive(Deserialize)]
struct SaleDto {
    #[serde(deserialize_with = "de_id")]
    id: String,
    sale_number: String,
    #[serde(default)]
    customer_name: String,
    payment_method: PaymentMethod,
    total: Decimal,
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_opt_id")]
    created_by_id: Option<String>,
    #[serde(default)]
    payment_proof: Option<String>,
}

impl SaleDto {
    fn into_record(self) -> BackendResult<SaleRecord> {
        Ok(SaleRecord {
            total: money(self.total, "total")?,
            id: self.id,
            sale_number: self.sale_number,
            customer_name: self.customer_name,
            payment_method: self.payment_method,
            created_at: self.created_at,
            created_by_id: self.created_by_id,
            payment_proof: self.payment_proof,
        })
    }
}

/// One unreadable sale must not empty the staff queue.
fn sale_records(listing: Listing<SaleDto>) -> Vec<SaleRecord> {
    let mut sales = Vec::new();
    for dto in listing.into_vec() {
        let id = dto.id.clone();
        match dto.into_record() {
            Ok(sale) => sales.push(sale),
            Err(e) => warn!(sale_id = %id, error = %e, "Skipping unreadable sale"),
        }
    }
    sales
}

#[derive(Deserialize)]
struct CreatedSaleDto {
    #[serde(deserialize_with = "de_id")]
    id: String,
    sale_number: String,
    created_at: DateTime<Utc>,
    total: Decimal,
}

#[derive(Deserialize)]
struct OrderDto {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(deserialize_with = "de_id")]
    sale_id: String,
}

impl From<OrderDto> for OrderRecord {
    fn from(dto: OrderDto) -> Self {
        OrderRecord {
            id: dto.id,
            sale_id: dto.sale_id,
        }
    }
}

#[derive(Serialize)]
struct NewSaleLine<'a> {
    product_id: &'a str,
    quantity: i64,
    unit_price: Decimal,
}

#[derive(Serialize)]
struct NewSaleBody<'a> {
    customer_name: &'a str,
    customer_identifier: &'a str,
    payment_method: PaymentMethod,
    notes: &'a str,
    discount: Decimal,
    details: Vec<NewSaleLine<'a>>,
}

impl<'a> From<&'a SaleDraft> for NewSaleBody<'a> {
    fn from(draft: &'a SaleDraft) -> Self {
        NewSaleBody {
            customer_name: &draft.customer_name,
            customer_identifier: &draft.customer_identifier,
            payment_method: draft.payment_method,
            notes: &draft.notes,
            discount: draft.discount.to_decimal(),
            details: draft
                .details
                .iter()
                .map(|d| NewSaleLine {
                    product_id: &d.product_id,
                    quantity: d.quantity,
                    unit_price: d.unit_price.to_decimal(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ProofBody<'a> {
    payment_proof: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "detail", alias = "error")]
    message: Option<String>,
}

// =============================================================================
// Classification
// =============================================================================

/// Which call a non-success response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Products,
    CreateSale,
    AttachProof,
    Sales,
    Orders,
    ConfirmOnline,
}

fn classify(call: Call, status: StatusCode, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| format!("HTTP {} from {:?}", status.as_u16(), call));

    let kind = match parsed.code.as_deref() {
        Some("order_exists") | Some("already_confirmed") => BackendErrorKind::AlreadyConfirmed,
        Some("sale_not_online") => BackendErrorKind::SaleNotOnline,
        _ if status == StatusCode::CONFLICT && call == Call::ConfirmOnline => {
            BackendErrorKind::AlreadyConfirmed
        }
        _ if status == StatusCode::NOT_FOUND => BackendErrorKind::NotFound,
        _ => BackendErrorKind::Rejected {
            status: status.as_u16(),
        },
    };

    BackendError::new(kind, message)
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::new(BackendErrorKind::Timeout, err.to_string())
    } else if err.is_decode() {
        BackendError::invalid_response(err.to_string())
    } else {
        BackendError::network(err.to_string())
    }
}

// =============================================================================
// HTTP Backend
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpBackend {
            client,
            base: config.url()?,
            api_token: config.api_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base
            .join(path)
            .map_err(|e| BackendError::new(BackendErrorKind::Rejected { status: 0 }, e.to_string()))
    }

    async fn send(&self, call: Call, request: RequestBuilder) -> BackendResult<Response> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify(call, status, &body);
        debug!(?call, status = status.as_u16(), kind = %err.kind, "Backend call failed");
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(&self, call: Call, path: &str) -> BackendResult<T> {
        let url = self.endpoint(path)?;
        let response = self.send(call, self.client.get(url)).await?;
        response.json().await.map_err(transport_error)
    }
}

/// List endpoints answer either a bare array or `{"results": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Paged { results: items } => items,
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_products(&self) -> BackendResult<Vec<ProductSnapshot>> {
        let listing: Listing<ProductDto> = self.get_json(Call::Products, "products").await?;
        let mut products = Vec::new();
        for dto in listing.into_vec() {
            let id = dto.id.clone();
            match dto.into_snapshot() {
                Ok(p) => products.push(p),
                Err(e) => warn!(product_id = %id, error = %e, "Skipping unreadable product"),
            }
        }
        Ok(products)
    }

    async fn create_sale(&self, draft: &SaleDraft) -> BackendResult<CreatedSale> {
        let url = self.endpoint("public/sales")?;
        let body = NewSaleBody::from(draft);
        let response = self
            .send(Call::CreateSale, self.client.post(url).json(&body))
            .await?;
        let dto: CreatedSaleDto = response.json().await.map_err(transport_error)?;

        Ok(CreatedSale {
            total: money(dto.total, "total")?,
            id: dto.id,
            sale_number: dto.sale_number,
            created_at: dto.created_at,
        })
    }

    async fn attach_payment_proof(&self, sale_id: &str, data_url: &str) -> BackendResult<()> {
        let url = self.endpoint(&format!("public/sales/{sale_id}/payment-proof"))?;
        let body = ProofBody {
            payment_proof: data_url,
        };
        self.send(Call::AttachProof, self.client.patch(url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_sales(&self) -> BackendResult<Vec<SaleRecord>> {
        let listing: Listing<SaleDto> = self.get_json(Call::Sales, "public/sales").await?;
        Ok(sale_records(listing))
    }

    async fn list_orders(&self) -> BackendResult<Vec<OrderRecord>> {
        let listing: Listing<OrderDto> = self.get_json(Call::Orders, "public/orders").await?;
        Ok(listing.into_vec().into_iter().map(OrderRecord::from).collect())
    }

    async fn confirm_online(&self, sale_id: &str) -> BackendResult<OrderRecord> {
        let url = self.endpoint(&format!("sales/{sale_id}/confirm-online"))?;
        let response = self
            .send(Call::ConfirmOnline, self.client.patch(url))
            .await?;

        // Some deployments answer with the order, others with an empty body.
        let body = response.text().await.map_err(transport_error)?;
        match serde_json::from_str::<OrderDto>(&body) {
            Ok(dto) => Ok(dto.into()),
            Err(_) => Ok(OrderRecord {
                id: String::new(),
                sale_id: sale_id.to_string(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
