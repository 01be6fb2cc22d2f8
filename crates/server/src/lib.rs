//! HTTP surface of the order bot.
//!
//! Two webhook ingestion points (messaging platform and payment provider),
//! the messaging verification handshake, an order lookup for operators and
//! the usual health and Prometheus endpoints. Webhooks are acknowledged with
//! `200` whatever happens internally; the only exception is a payment
//! notification with a bad or missing signature, which gets `401`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{MatchedPath, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use model::MessagingWebhook;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use serde::Deserialize;
use service::{CommerceService, ServiceError};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Header carrying the payment provider's hex HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// HTTP server wrapping a [`CommerceService`].
pub struct Server<S> {
    service: Arc<S>,
    port: u16,
    verify_token: String,
    shutdown_timeout: Duration,
    metrics: Arc<Metrics>,
}

/// Request and webhook metrics exposed on `/metrics`.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    webhook_events_total: CounterVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds"),
            &["method", "endpoint"],
        )?;
        let webhook_events_total = CounterVec::new(
            Opts::new("webhook_events_total", "Inbound webhook events by source and outcome"),
            &["source", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(webhook_events_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            webhook_events_total,
        })
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_event(&self, source: &str, outcome: &str) {
        self.webhook_events_total.with_label_values(&[source, outcome]).inc();
    }
}

struct AppState<S> {
    service: Arc<S>,
    verify_token: Arc<str>,
    metrics: Arc<Metrics>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            verify_token: self.verify_token.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Query of the messaging platform's subscription handshake.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

impl<S> Server<S>
where
    S: CommerceService + 'static,
{
    pub fn new(
        port: u16,
        verify_token: impl Into<String>,
        shutdown_timeout: Duration,
        service: Arc<S>,
    ) -> Result<Self> {
        info!(port, "Initializing HTTP server");
        let metrics = Metrics::new().context("Failed to create metrics registry")?;

        Ok(Self {
            service,
            port,
            verify_token: verify_token.into(),
            shutdown_timeout,
            metrics: Arc::new(metrics),
        })
    }

    /// Serves until Ctrl+C or SIGTERM. In-flight requests get
    /// `shutdown_timeout` to finish after the signal, and queued ledger rows
    /// get the same again.
    pub async fn start(&self) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .context("Failed to bind to port")?;
        info!(port = self.port, "HTTP server listening");

        let signalled = Arc::new(Notify::new());
        let on_signal = signalled.clone();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal().await;
            on_signal.notify_one();
        });
        let drain_deadline = async {
            signalled.notified().await;
            tokio::time::sleep(self.shutdown_timeout).await;
        };

        tokio::select! {
            result = serve => {
                result.context("Server error")?;
                info!("HTTP server shut down gracefully");
            }
            _ = drain_deadline => {
                warn!(timeout = ?self.shutdown_timeout, "Graceful shutdown timed out");
            }
        }

        if tokio::time::timeout(self.shutdown_timeout, self.service.flush_ledger())
            .await
            .is_err()
        {
            warn!(timeout = ?self.shutdown_timeout, "Pending ledger rows not flushed before exit");
        }
        Ok(())
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            service: self.service.clone(),
            verify_token: Arc::from(self.verify_token.as_str()),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(
                "/webhook",
                get(handle_verify::<S>).post(handle_messaging_webhook::<S>),
            )
            .route("/payments/webhook", post(handle_payment_webhook::<S>))
            .route("/orders/{order_id}", get(handle_get_order::<S>))
            .route("/health", get(handle_health))
            .route("/metrics", get(handle_metrics::<S>))
            .layer(axum::middleware::from_fn_with_state(
                self.metrics.clone(),
                metrics_middleware,
            ))
            .with_state(state)
    }
}

/// Records count and latency per route template rather than per raw path.
async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    metrics.record_request(&method, &endpoint, response.status().as_u16(), start.elapsed());

    response
}

async fn handle_verify<S: CommerceService + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let subscribed = params.mode.as_deref() == Some("subscribe");
    let token_matches = !state.verify_token.is_empty()
        && params.verify_token.as_deref() == Some(state.verify_token.as_ref());

    match params.challenge {
        Some(challenge) if subscribed && token_matches => {
            info!("Webhook verification succeeded");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(mode = params.mode.as_deref().unwrap_or(""), "Webhook verification rejected");
            (StatusCode::FORBIDDEN, "verification failed").into_response()
        }
    }
}

async fn handle_messaging_webhook<S: CommerceService + 'static>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> StatusCode {
    let webhook: MessagingWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!(error = %e, "Unparseable messaging webhook acknowledged");
            state.metrics.record_event("messaging", "unparseable");
            return StatusCode::OK;
        }
    };

    let messages = webhook.into_messages();
    if messages.is_empty() {
        debug!("Messaging webhook without messages");
    }
    for message in messages {
        let message_id = message.id.clone();
        match state.service.handle_chat_message(message).await {
            Ok(outcome) => {
                debug!(message_id = %message_id, outcome = outcome.label(), "Chat message handled");
                state.metrics.record_event("messaging", outcome.label());
            }
            Err(e) => {
                error!(message_id = %message_id, error = %e, "Chat message processing failed");
                state.metrics.record_event("messaging", "error");
            }
        }
    }
    StatusCode::OK
}

async fn handle_payment_webhook<S: CommerceService + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());

    match state.service.handle_payment_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(outcome = outcome.label(), "Payment notification handled");
            state.metrics.record_event("payment", outcome.label());
            StatusCode::OK
        }
        Err(ServiceError::Authentication(reason)) => {
            warn!(%reason, "Payment notification failed authentication");
            state.metrics.record_event("payment", "unauthenticated");
            StatusCode::UNAUTHORIZED
        }
        Err(ServiceError::Resolution(reason)) => {
            warn!(%reason, "Payment notification matched no session");
            state.metrics.record_event("payment", "unresolved");
            StatusCode::OK
        }
        Err(e) => {
            error!(error = %e, "Payment notification processing failed");
            state.metrics.record_event("payment", "error");
            StatusCode::OK
        }
    }
}

async fn handle_get_order<S: CommerceService + 'static>(
    State(state): State<AppState<S>>,
    Path(order_id): Path<String>,
) -> Response {
    match state.service.get_order(&order_id).await {
        Some(session) => Json(session).into_response(),
        None => {
            warn!(order_id = %order_id, "Order not found");
            (StatusCode::NOT_FOUND, "order not found").into_response()
        }
    }
}

async fn handle_health() -> &'static str {
    "OK"
}

async fn handle_metrics<S: CommerceService + 'static>(
    State(state): State<AppState<S>>,
) -> Response {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match String::from_utf8(buffer) {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to convert metrics to UTF-8: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
        }
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use model::{InboundMessage, OrderSession};
    use service::{ChatOutcome, ReconcileOutcome};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const GOOD_SIGNATURE: &str = "good";

    /// Records calls and answers with canned outcomes.
    #[derive(Default)]
    struct FakeService {
        chats: Mutex<Vec<InboundMessage>>,
        payment_error: Option<&'static str>,
    }

    #[async_trait]
    impl CommerceService for FakeService {
        async fn handle_chat_message(
            &self,
            message: InboundMessage,
        ) -> Result<ChatOutcome, ServiceError> {
            self.chats.lock().unwrap().push(message);
            Err(ServiceError::Unexpected("downstream exploded".to_string()))
        }

        async fn handle_payment_webhook(
            &self,
            _raw_body: &[u8],
            signature: Option<&str>,
        ) -> Result<ReconcileOutcome, ServiceError> {
            if signature != Some(GOOD_SIGNATURE) {
                return Err(ServiceError::Authentication("signature mismatch".to_string()));
            }
            match self.payment_error {
                Some(reason) => Err(ServiceError::Resolution(reason.to_string())),
                None => Ok(ReconcileOutcome::Ignored {
                    event: "order.paid".to_string(),
                }),
            }
        }

        async fn get_order(&self, _order_id: &str) -> Option<OrderSession> {
            None
        }
    }

    fn router(service: FakeService) -> (Router, Arc<FakeService>) {
        let service = Arc::new(service);
        let server =
            Server::new(8080, "verify-me", Duration::from_secs(1), service.clone()).unwrap();
        (server.router(), service)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn payment_request(signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/payments/webhook");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(r#"{"event":"order.paid"}"#)).unwrap()
    }

    #[tokio::test]
    async fn test_verification_handshake() {
        let (app, _) = router(FakeService::default());
        let ok = Request::get(
            "/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444",
        )
        .body(Body::empty())
        .unwrap();
        assert_eq!(send(app.clone(), ok).await, (StatusCode::OK, "1158201444".to_string()));

        let wrong =
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                .body(Body::empty())
                .unwrap();
        assert_eq!(send(app, wrong).await.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_messaging_webhook_always_acknowledged() {
        let (app, service) = router(FakeService::default());
        let body = r#"{"object":"whatsapp_business_account","entry":[{"id":"1","changes":[{"field":"messages","value":{"messages":[{"from":"919999999999","id":"wamid.1","type":"text","text":{"body":"hi"}}]}}]}]}"#;
        let request = Request::post("/webhook").body(Body::from(body)).unwrap();
        assert_eq!(send(app.clone(), request).await.0, StatusCode::OK);
        assert_eq!(service.chats.lock().unwrap().len(), 1);

        let garbage = Request::post("/webhook").body(Body::from("not json")).unwrap();
        assert_eq!(send(app, garbage).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_payment_webhook_status_policy() {
        let (app, _) = router(FakeService::default());
        assert_eq!(send(app.clone(), payment_request(None)).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            send(app.clone(), payment_request(Some("bad"))).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(send(app, payment_request(Some(GOOD_SIGNATURE))).await.0, StatusCode::OK);

        let (unresolved, _) = router(FakeService {
            payment_error: Some("no session"),
            ..FakeService::default()
        });
        assert_eq!(send(unresolved, payment_request(Some(GOOD_SIGNATURE))).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_order_is_404() {
        let (app, _) = router(FakeService::default());
        let request = Request::get("/orders/ORD404").body(Body::empty()).unwrap();
        assert_eq!(send(app, request).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_count_webhook_outcomes() {
        let (app, _) = router(FakeService::default());
        send(app.clone(), payment_request(Some("bad"))).await;

        let metrics = Request::get("/metrics").body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), metrics).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"webhook_events_total{outcome="unauthenticated",source="payment"} 1"#));
        assert!(body.contains("http_requests_total"));

        let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    }
}
