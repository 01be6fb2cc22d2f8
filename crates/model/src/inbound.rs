//! Wire shapes of the messaging platform's webhook.

use serde::{Deserialize, Serialize};

/// Top-level webhook envelope: `entry[].changes[].value.messages[]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagingWebhook {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

impl MessagingWebhook {
    /// All inbound customer messages carried by this delivery, in order.
    /// Delivery receipts and other status updates are skipped.
    pub fn into_messages(self) -> Vec<InboundMessage> {
        self.entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.messages)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// A single customer message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: TextBody },
    Interactive { interactive: InteractiveReply },
    Order { order: CatalogOrder },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractiveReply {
    /// Structured form ("flow") submission.
    NfmReply { nfm_reply: NfmReply },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NfmReply {
    /// Form answers, JSON-encoded as a string by the platform.
    pub response_json: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogOrder {
    #[serde(default)]
    pub catalog_id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub product_items: Vec<OrderProductItem>,
}

/// Catalog line as sent by the platform. `item_price` is in major units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderProductItem {
    pub product_retailer_id: String,
    pub quantity: u32,
    pub item_price: f64,
    #[serde(default)]
    pub currency: String,
}

/// Answers of the delivery-details form. Every field is optional on the wire;
/// required ones are checked when the form is turned into customer details.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryForm {
    pub flow_token: Option<String>,
    pub name: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub payment_mode: Option<String>,
}
