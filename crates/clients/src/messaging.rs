use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::{ClientError, ensure_success, join_url};

/// Outbound side of the chat channel.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ClientError>;

    /// Sends the interactive product catalog.
    async fn send_catalog(&self, to: &str) -> Result<(), ClientError>;

    /// Sends the structured delivery-details form `form_id`. `flow_token` comes
    /// back verbatim in the submission.
    async fn send_form(&self, to: &str, form_id: &str, flow_token: &str) -> Result<(), ClientError>;
}

/// WhatsApp Cloud API client.
pub struct WhatsAppClient {
    http: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
        }
    }

    async fn post_message(&self, payload: Value) -> Result<(), ClientError> {
        let url = join_url(&self.api_base, &format!("{}/messages", self.phone_number_id));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

fn text_message(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": true, "body": body }
    })
}

fn catalog_message(to: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "catalog_message",
            "body": { "text": "Browse our catalog and add items to your cart." },
            "action": { "name": "catalog_message" }
        }
    })
}

fn form_message(to: &str, form_id: &str, flow_token: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "flow",
            "body": { "text": "Please share your delivery details to complete the order." },
            "action": {
                "name": "flow",
                "parameters": {
                    "flow_message_version": "3",
                    "flow_token": flow_token,
                    "flow_id": form_id,
                    "flow_cta": "Enter details",
                    "flow_action": "navigate",
                    "flow_action_payload": { "screen": "DELIVERY_DETAILS" }
                }
            }
        }
    })
}

#[async_trait]
impl MessagingClient for WhatsAppClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ClientError> {
        debug!(to, "sending text message");
        self.post_message(text_message(to, body)).await
    }

    async fn send_catalog(&self, to: &str) -> Result<(), ClientError> {
        debug!(to, "sending catalog");
        self.post_message(catalog_message(to)).await
    }

    async fn send_form(
        &self,
        to: &str,
        form_id: &str,
        flow_token: &str,
    ) -> Result<(), ClientError> {
        debug!(to, form_id, "sending delivery form");
        self.post_message(form_message(to, form_id, flow_token)).await
    }
}
