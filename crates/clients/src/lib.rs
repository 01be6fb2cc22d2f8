//! Outbound adapters for the collaborators the order bot talks to:
//! the messaging platform, the payment-link provider and the logistics carrier.
//!
//! Each collaborator is a trait so the service layer can be exercised with
//! test doubles; the production implementations are thin reqwest wrappers.

mod logistics;
mod messaging;
mod payment;

pub use logistics::{
    DelhiveryClient, LogisticsClient, QuoteRequest, ShipmentOutcome, ShipmentRequest,
    parse_quote, parse_shipment_response,
};
pub use messaging::{MessagingClient, WhatsAppClient};
pub use payment::{PaymentGateway, PaymentLinkRequest, RazorpayClient};
/// Shared connection pool handed to every outbound adapter.
pub use reqwest::Client as HttpClient;

use std::time::Duration;

use thiserror::Error;

/// Failure of an outbound call. None of these are fatal to event processing.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unparseable response: {0}")]
    Unparseable(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(err)
        }
    }
}

/// Builds the shared HTTP client. `timeout` bounds every request end to end.
pub fn build_http_client(timeout: Duration) -> Result<HttpClient, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(ClientError::from)
}

/// Turns a non-2xx response into [`ClientError::Status`], keeping the body for the logs.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
