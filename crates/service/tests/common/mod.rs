#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use clients::{
    ClientError, LogisticsClient, MessagingClient, PaymentGateway, PaymentLinkRequest, QuoteRequest,
    ShipmentOutcome, ShipmentRequest,
};
use hmac::{Hmac, Mac};
use model::{InboundMessage, LedgerRow, PaymentLinkRef};
use repository::{LedgerRepository, RepositoryError};
use serde_json::{Value, json};
use service::{Catalog, CheckoutSettings, CommerceServiceImpl};
use sha2::Sha256;
use store::SessionStore;

pub const PHONE: &str = "919999999999";
pub const SECRET: &str = "whsec_test";
pub const FORM_ID: &str = "delivery-form";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { to: String, body: String },
    Catalog { to: String },
    Form { to: String, form_id: String, flow_token: String },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingMessenger {
    pub sent: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingMessenger {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Text { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessagingClient for RecordingMessenger {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_catalog(&self, to: &str) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(Sent::Catalog { to: to.to_string() });
        Ok(())
    }

    async fn send_form(
        &self,
        to: &str,
        form_id: &str,
        flow_token: &str,
    ) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(Sent::Form {
            to: to.to_string(),
            form_id: form_id.to_string(),
            flow_token: flow_token.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubGateway {
    pub requests: Arc<Mutex<Vec<PaymentLinkRequest>>>,
    pub fail: bool,
}

impl StubGateway {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<PaymentLinkRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkRef, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ClientError::Timeout);
        }
        let expires_in = ChronoDuration::seconds(request.expires_in.as_secs() as i64);
        Ok(PaymentLinkRef {
            id: format!("plink_{}", request.correlation_ref),
            short_url: "https://rzp.io/i/test".to_string(),
            expires_at: Utc::now() + expires_in,
        })
    }
}

/// Carrier double. `quote: None` answers every quote with an unparseable body.
#[derive(Debug, Clone)]
pub struct StubLogistics {
    pub quote: Option<i64>,
    pub shipment_success: bool,
    pub quotes: Arc<Mutex<Vec<QuoteRequest>>>,
    pub shipments: Arc<Mutex<Vec<ShipmentRequest>>>,
}

impl Default for StubLogistics {
    fn default() -> Self {
        Self {
            quote: Some(8550),
            shipment_success: true,
            quotes: Arc::default(),
            shipments: Arc::default(),
        }
    }
}

impl StubLogistics {
    pub fn with_quote(quote: Option<i64>) -> Self {
        Self {
            quote,
            ..Self::default()
        }
    }

    pub fn refusing_shipments() -> Self {
        Self {
            shipment_success: false,
            ..Self::default()
        }
    }

    pub fn quotes(&self) -> Vec<QuoteRequest> {
        self.quotes.lock().unwrap().clone()
    }

    pub fn shipments(&self) -> Vec<ShipmentRequest> {
        self.shipments.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogisticsClient for StubLogistics {
    async fn quote_shipping_charge(&self, request: &QuoteRequest) -> Result<i64, ClientError> {
        self.quotes.lock().unwrap().push(request.clone());
        self.quote
            .ok_or_else(|| ClientError::Unparseable("rate quote without total_amount".to_string()))
    }

    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentOutcome, ClientError> {
        self.shipments.lock().unwrap().push(request.clone());
        let raw = if self.shipment_success {
            json!({ "success": true, "packages": [{ "waybill": "WB123", "remarks": [] }] })
        } else {
            json!({ "success": false, "packages": [{ "waybill": "", "remarks": ["Invalid pincode"] }] })
        };
        Ok(clients::parse_shipment_response(raw))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingLedger {
    pub rows: Arc<Mutex<Vec<LedgerRow>>>,
}

impl RecordingLedger {
    pub fn rows(&self) -> Vec<LedgerRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerRepository for RecordingLedger {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

pub type TestService = CommerceServiceImpl<RecordingMessenger, StubGateway, StubLogistics>;

pub struct Harness {
    pub service: TestService,
    pub messenger: RecordingMessenger,
    pub gateway: StubGateway,
    pub logistics: StubLogistics,
    pub ledger: RecordingLedger,
}

impl Harness {
    /// Ledger rows once every queued append has gone through.
    pub async fn ledger_rows(&self) -> Vec<LedgerRow> {
        use service::CommerceService;

        self.service.flush_ledger().await;
        self.ledger.rows()
    }
}

pub fn settings() -> CheckoutSettings {
    CheckoutSettings {
        form_id: FORM_ID.to_string(),
        webhook_secret: SECRET.to_string(),
        ..CheckoutSettings::default()
    }
}

pub fn harness() -> Harness {
    harness_with(StubGateway::default(), StubLogistics::default())
}

pub fn harness_with(gateway: StubGateway, logistics: StubLogistics) -> Harness {
    let messenger = RecordingMessenger::default();
    let ledger = RecordingLedger::default();
    let service = CommerceServiceImpl::new(
        SessionStore::new(),
        Catalog::builtin(),
        settings(),
        messenger.clone(),
        gateway.clone(),
        logistics.clone(),
        ledger.clone(),
    );
    Harness {
        service,
        messenger,
        gateway,
        logistics,
        ledger,
    }
}

fn message(value: Value) -> InboundMessage {
    serde_json::from_value(value).unwrap()
}

pub fn text(from: &str, body: &str) -> InboundMessage {
    message(json!({
        "from": from,
        "id": "wamid.text",
        "type": "text",
        "text": { "body": body }
    }))
}

/// Catalog selection of `(product_ref, quantity, unit price in major units)`.
pub fn selection(from: &str, lines: &[(&str, u32, f64)]) -> InboundMessage {
    let product_items: Vec<Value> = lines
        .iter()
        .map(|(product, quantity, price)| {
            json!({
                "product_retailer_id": product,
                "quantity": quantity,
                "item_price": price,
                "currency": "INR"
            })
        })
        .collect();
    message(json!({
        "from": from,
        "id": "wamid.order",
        "type": "order",
        "order": { "catalog_id": "cat-1", "product_items": product_items }
    }))
}

pub fn delivery_form(from: &str, payment_mode: &str) -> InboundMessage {
    let response = json!({
        "flow_token": format!("checkout:{from}"),
        "name": "Asha Rao",
        "address_line_1": "12 MG Road",
        "city": "Pune",
        "pincode": "411001",
        "email": "asha@example.com",
        "payment_mode": payment_mode
    });
    message(json!({
        "from": from,
        "id": "wamid.form",
        "type": "interactive",
        "interactive": {
            "type": "nfm_reply",
            "nfm_reply": {
                "response_json": response.to_string(),
                "body": "Sent",
                "name": "flow"
            }
        }
    }))
}

pub fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// `payment_link.paid` body carrying `order_id` as the link reference.
pub fn paid_event(order_id: &str) -> Vec<u8> {
    paid_event_with(order_id, order_id, "+919999999999")
}

/// `payment_link.paid` body with independent link reference, `notes.order_id`
/// and payer contact.
pub fn paid_event_with(link_reference: &str, notes_order_id: &str, contact: &str) -> Vec<u8> {
    json!({
        "entity": "event",
        "event": "payment_link.paid",
        "payload": {
            "payment_link": { "entity": {
                "id": format!("plink_{link_reference}"),
                "reference_id": link_reference,
                "status": "paid"
            }},
            "payment": { "entity": {
                "id": "pay_001",
                "amount": 20000,
                "status": "captured",
                "contact": contact,
                "notes": { "order_id": notes_order_id }
            }}
        }
    })
    .to_string()
    .into_bytes()
}

/// `payment.captured` body with no order reference, only the payer's contact.
pub fn captured_without_reference(contact: &str) -> Vec<u8> {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": { "entity": {
                "id": "pay_002",
                "amount": 20000,
                "status": "captured",
                "contact": contact,
                "notes": []
            }}
        }
    })
    .to_string()
    .into_bytes()
}

pub fn event_for(order_id: &str, event: &str) -> Vec<u8> {
    json!({
        "event": event,
        "payload": {
            "payment_link": { "entity": { "id": format!("plink_{order_id}"), "reference_id": order_id } }
        }
    })
    .to_string()
    .into_bytes()
}

/// Runs "place order" and a selection of two units at 100.00.
pub async fn select_items(harness: &Harness, from: &str) {
    use service::CommerceService;

    harness.service.handle_chat_message(text(from, "place order")).await.unwrap();
    harness
        .service
        .handle_chat_message(selection(from, &[("PICKLE-MANGO-500", 2, 100.0)]))
        .await
        .unwrap();
}
