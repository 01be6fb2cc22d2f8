use async_trait::async_trait;
use model::{CustomerDetails, PaymentMode, format_minor};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{ClientError, ensure_success, join_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub origin_pincode: String,
    pub dest_pincode: String,
    pub weight_grams: u32,
    pub payment_mode: PaymentMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    pub order_id: String,
    pub phone: String,
    pub consignee: CustomerDetails,
    pub products_desc: String,
    pub quantity: u32,
    pub weight_grams: u32,
    pub payment_mode: PaymentMode,
    /// Amount the courier collects, in minor units. Zero for prepaid orders.
    pub cod_amount: i64,
    pub total_amount: i64,
    pub pickup_location: String,
}

/// Result of a shipment-creation call that reached the carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentOutcome {
    pub success: bool,
    pub waybill: Option<String>,
    pub remarks: Option<String>,
    /// Carrier response as received, for the audit trail.
    pub raw: Value,
}

#[async_trait]
pub trait LogisticsClient: Send + Sync {
    /// Returns the shipping charge in minor units.
    ///
    /// A response without a recognizable numeric charge is
    /// [`ClientError::Unparseable`], never a zero charge.
    async fn quote_shipping_charge(&self, request: &QuoteRequest) -> Result<i64, ClientError>;

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentOutcome, ClientError>;
}

/// Delhivery client for rate quotes and shipment manifests.
pub struct DelhiveryClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DelhiveryClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }
}

/// Extracts `total_amount` (major units) from a rate-quote response and
/// converts it to minor units. The carrier answers with a one-element array.
pub fn parse_quote(body: &Value) -> Option<i64> {
    let quote = match body {
        Value::Array(entries) => entries.first()?,
        other => other,
    };
    let amount = match quote.get("total_amount")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

/// Reads success and waybill out of a manifest response. A response that
/// claims success without a waybill is treated as a failure.
pub fn parse_shipment_response(raw: Value) -> ShipmentOutcome {
    let package = raw.get("packages").and_then(|p| p.get(0));
    let waybill = package
        .and_then(|p| p.get("waybill"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string);
    let remarks = raw
        .get("rmk")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            package
                .and_then(|p| p.get("remarks"))
                .and_then(Value::as_array)
                .map(|remarks| {
                    remarks
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join("; ")
                })
        })
        .filter(|r| !r.is_empty());
    let success = raw.get("success").and_then(Value::as_bool).unwrap_or(false) && waybill.is_some();

    ShipmentOutcome {
        success,
        waybill,
        remarks,
        raw,
    }
}

fn manifest(request: &ShipmentRequest) -> Value {
    let consignee = &request.consignee;
    json!({
        "shipments": [{
            "name": consignee.name,
            "add": consignee.full_address(),
            "pin": consignee.pincode,
            "city": consignee.city.clone().unwrap_or_default(),
            "state": consignee.state.clone().unwrap_or_default(),
            "country": "India",
            "phone": request.phone,
            "order": request.order_id,
            "payment_mode": match request.payment_mode {
                PaymentMode::Cod => "COD",
                PaymentMode::Prepaid => "Prepaid",
            },
            "products_desc": request.products_desc,
            "quantity": request.quantity.to_string(),
            "cod_amount": format_minor(request.cod_amount),
            "total_amount": format_minor(request.total_amount),
            "weight": request.weight_grams.to_string(),
            "shipping_mode": "Surface",
        }],
        "pickup_location": { "name": request.pickup_location }
    })
}

#[async_trait]
impl LogisticsClient for DelhiveryClient {
    async fn quote_shipping_charge(&self, request: &QuoteRequest) -> Result<i64, ClientError> {
        let weight = request.weight_grams.to_string();
        let response = self
            .http
            .get(join_url(&self.api_base, "api/kinko/v1/invoice/charges/.json"))
            .header("Authorization", self.auth_header())
            .query(&[
                ("md", "S"),
                ("ss", "Delivered"),
                ("o_pin", request.origin_pincode.as_str()),
                ("d_pin", request.dest_pincode.as_str()),
                ("cgm", weight.as_str()),
                ("pt", request.payment_mode.carrier_class()),
            ])
            .send()
            .await?;
        let body: Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Unparseable(format!("rate quote body: {e}")))?;

        parse_quote(&body).ok_or_else(|| {
            warn!(dest = %request.dest_pincode, %body, "rate quote has no usable total_amount");
            ClientError::Unparseable("rate quote without total_amount".to_string())
        })
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentOutcome, ClientError> {
        let data = manifest(request).to_string();
        let response = self
            .http
            .post(join_url(&self.api_base, "api/cmu/create.json"))
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .form(&[("format", "json"), ("data", data.as_str())])
            .send()
            .await?;
        let raw: Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Unparseable(format!("shipment body: {e}")))?;

        let outcome = parse_shipment_response(raw);
        info!(
            order_id = %request.order_id,
            success = outcome.success,
            waybill = outcome.waybill.as_deref().unwrap_or(""),
            "shipment creation answered"
        );
        Ok(outcome)
    }
}
