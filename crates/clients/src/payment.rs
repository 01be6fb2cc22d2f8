use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::PaymentLinkRef;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ClientError, ensure_success, join_url};

/// Parameters for a hosted, time-boxed payment link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLinkRequest {
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub customer_name: String,
    pub customer_contact: String,
    pub customer_email: Option<String>,
    /// Our order id; comes back on the webhook as the link's reference id.
    pub correlation_ref: String,
    pub expires_in: Duration,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkRef, ClientError>;
}

/// Razorpay payment-links client.
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateLinkBody<'a> {
    amount: i64,
    currency: &'a str,
    accept_partial: bool,
    expire_by: i64,
    reference_id: &'a str,
    description: &'a str,
    customer: LinkCustomerBody<'a>,
    notify: LinkNotify,
    reminder_enable: bool,
    notes: LinkNotes<'a>,
}

#[derive(Debug, Serialize)]
struct LinkCustomerBody<'a> {
    name: &'a str,
    contact: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LinkNotify {
    sms: bool,
    email: bool,
}

#[derive(Debug, Serialize)]
struct LinkNotes<'a> {
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    id: String,
    short_url: String,
    expire_by: Option<i64>,
}

fn link_body(request: &PaymentLinkRequest, now: DateTime<Utc>) -> CreateLinkBody<'_> {
    let expires_in = i64::try_from(request.expires_in.as_secs()).unwrap_or(i64::MAX / 2);
    CreateLinkBody {
        amount: request.amount,
        currency: &request.currency,
        accept_partial: false,
        expire_by: now.timestamp().saturating_add(expires_in),
        reference_id: &request.correlation_ref,
        description: &request.description,
        customer: LinkCustomerBody {
            name: &request.customer_name,
            contact: &request.customer_contact,
            email: request.customer_email.as_deref(),
        },
        notify: LinkNotify {
            sms: false,
            email: false,
        },
        reminder_enable: false,
        notes: LinkNotes {
            order_id: &request.correlation_ref,
        },
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkRef, ClientError> {
        let body = link_body(request, Utc::now());
        let requested_expiry = body.expire_by;

        let response = self
            .http
            .post(join_url(&self.api_base, "payment_links"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;
        let created: CreateLinkResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Unparseable(format!("payment link response: {e}")))?;

        let expire_by = created.expire_by.unwrap_or(requested_expiry);
        let expires_at = DateTime::<Utc>::from_timestamp(expire_by, 0)
            .ok_or_else(|| {
                ClientError::Unparseable(format!("expire_by out of range: {expire_by}"))
            })?;

        info!(order_id = %request.correlation_ref, link_id = %created.id, "payment link created");
        Ok(PaymentLinkRef {
            id: created.id,
            short_url: created.short_url,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_link_body_uses_order_id_and_expiry() {
        let request = PaymentLinkRequest {
            amount: 20000,
            currency: "INR".to_string(),
            description: "Order ORD1".to_string(),
            customer_name: "Asha".to_string(),
            customer_contact: "919999999999".to_string(),
            customer_email: None,
            correlation_ref: "ORD1".to_string(),
            expires_in: Duration::from_secs(1200),
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        let body = serde_json::to_value(link_body(&request, now)).unwrap();
        assert_eq!(body["reference_id"], "ORD1");
        assert_eq!(body["notes"]["order_id"], "ORD1");
        assert_eq!(body["amount"], 20000);
        assert_eq!(body["expire_by"], now.timestamp() + 1200);
        assert!(body["customer"].get("email").is_none());
    }
}
