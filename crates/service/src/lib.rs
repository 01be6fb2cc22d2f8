//! Business logic of the order bot.
//!
//! [`CommerceServiceImpl`] correlates three independent event streams against
//! one logical order: chat messages (conversation flow), payment-provider
//! notifications (reconciliation) and carrier responses (shipment creation).
//! Every handler takes the customer's lock from [`store::CustomerLocks`] before
//! reading a session, so on a multi-threaded runtime a duplicate webhook can
//! never race the original.
//!
//! Failures of outbound calls never abort an event: they are logged with the
//! order id and phone, recorded on the session where relevant, and turned
//! into a plain-language chat message.

mod flow;
mod ledger;
mod messages;
pub mod pricing;
mod reconciler;
mod shipping;

pub use flow::{ChatIntent, FlowAction, IntentKind, RejectReason, Transition, dispatch};
pub use pricing::{Catalog, CatalogProduct};
pub use reconciler::{ResolvedBy, verify_signature};

use std::time::Duration;

use async_trait::async_trait;
use clients::{ClientError, LogisticsClient, MessagingClient, PaymentGateway};
use ledger::LedgerWriter;
use model::{InboundMessage, LedgerRow, LedgerStatus, OrderSession, PaymentStatus};
use repository::{LedgerRepository, RepositoryError};
use store::{CustomerLocks, SessionStore};
use thiserror::Error;
use tracing::warn;

/// The main error type of [`CommerceService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A payment notification failed signature verification.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// A payment notification could not be matched to any session.
    #[error("Unresolved notification: {0}")]
    Resolution(String),
    /// An outbound call failed or returned unusable data.
    #[error("Adapter error: {0}")]
    Adapter(#[from] ClientError),
    /// An inbound payload is missing required data or is a test submission.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// The ledger could not be written.
    #[error("Ledger error: {0}")]
    Ledger(#[from] RepositoryError),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Knobs of the checkout flow, resolved from the application config at startup.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Structured form sent after a catalog selection.
    pub form_id: String,
    pub origin_pincode: String,
    pub pickup_location: String,
    /// Cash-on-delivery handling fee in minor units.
    pub cod_fee: i64,
    pub currency: String,
    pub payment_link_expiry: Duration,
    pub default_country_code: String,
    /// Shared secret for payment webhook HMACs. Empty rejects every webhook.
    pub webhook_secret: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            form_id: String::new(),
            origin_pincode: "110001".to_string(),
            pickup_location: "Primary Warehouse".to_string(),
            cod_fee: 15_000,
            currency: "INR".to_string(),
            payment_link_expiry: Duration::from_secs(20 * 60),
            default_country_code: "91".to_string(),
            webhook_secret: String::new(),
        }
    }
}

/// What a chat event led to. Used for logging, metrics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Greeted,
    CatalogSent,
    ItemsRecorded { amount: i64 },
    PaymentLinkSent { order_id: String },
    CodPlaced { order_id: String, waybill: String },
    /// COD gate failed: no usable quote or no shipment record.
    CodRejected { order_id: String },
    /// Payment link could not be created.
    CheckoutFailed { order_id: String },
    Rejected(RejectReason),
    Invalid(String),
    Fallback,
    /// The sender could not be identified.
    Ignored,
}

impl ChatOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ChatOutcome::Greeted => "greeted",
            ChatOutcome::CatalogSent => "catalog_sent",
            ChatOutcome::ItemsRecorded { .. } => "items_recorded",
            ChatOutcome::PaymentLinkSent { .. } => "payment_link_sent",
            ChatOutcome::CodPlaced { .. } => "cod_placed",
            ChatOutcome::CodRejected { .. } => "cod_rejected",
            ChatOutcome::CheckoutFailed { .. } => "checkout_failed",
            ChatOutcome::Rejected(_) => "rejected",
            ChatOutcome::Invalid(_) => "invalid",
            ChatOutcome::Fallback => "fallback",
            ChatOutcome::Ignored => "ignored",
        }
    }
}

/// What a verified payment notification led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        order_id: String,
        status: PaymentStatus,
        resolved_by: ResolvedBy,
    },
    /// Replay of an event that was already applied.
    Duplicate { order_id: String },
    /// The event does not fit the session's current payment status.
    Rejected { order_id: String, reason: &'static str },
    /// An event type the bot does not act on.
    Ignored { event: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Duplicate { .. } => "duplicate",
            ReconcileOutcome::Rejected { .. } => "rejected",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Operations exposed to the HTTP layer.
#[async_trait]
pub trait CommerceService: Send + Sync {
    /// Runs one inbound chat message through the conversation flow.
    ///
    /// Customer-facing problems (invalid forms, unknown products, failed
    /// downstream calls) are answered in chat and reported as an `Ok` outcome.
    async fn handle_chat_message(
        &self,
        message: InboundMessage,
    ) -> Result<ChatOutcome, ServiceError>;

    /// Verifies and applies a payment notification.
    ///
    /// `raw_body` must be the exact bytes received: the signature covers them.
    ///
    /// # Errors
    /// [`ServiceError::Authentication`] when the signature is missing or wrong
    /// (nothing is read or changed), [`ServiceError::Validation`] for an
    /// unparseable body and [`ServiceError::Resolution`] when no session matches.
    async fn handle_payment_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ServiceError>;

    async fn get_order(&self, order_id: &str) -> Option<OrderSession>;

    /// Waits for queued ledger rows to be written. Called on shutdown.
    async fn flush_ledger(&self) {}
}

/// Default [`CommerceService`] wired to concrete collaborators.
pub struct CommerceServiceImpl<M, P, L> {
    store: SessionStore,
    locks: CustomerLocks,
    catalog: Catalog,
    settings: CheckoutSettings,
    messaging: M,
    payments: P,
    logistics: L,
    ledger: LedgerWriter,
}

impl<M, P, L> CommerceServiceImpl<M, P, L>
where
    M: MessagingClient,
    P: PaymentGateway,
    L: LogisticsClient,
{
    /// Must be called inside a Tokio runtime: the ledger writer task is
    /// spawned here.
    pub fn new<R: LedgerRepository>(
        store: SessionStore,
        catalog: Catalog,
        settings: CheckoutSettings,
        messaging: M,
        payments: P,
        logistics: L,
        ledger: R,
    ) -> Self {
        Self {
            store,
            locks: CustomerLocks::new(),
            catalog,
            settings,
            messaging,
            payments,
            logistics,
            ledger: LedgerWriter::start(ledger),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Sends a chat message; delivery failures are logged only.
    async fn notify(&self, phone: &str, body: &str) {
        if let Err(e) = self.messaging.send_text(phone, body).await {
            warn!(phone, error = %e, "failed to deliver chat message");
        }
    }

    /// Queues a ledger row. The append runs on the writer task and its
    /// failures are logged there.
    async fn record(&self, session: &OrderSession, status: LedgerStatus) {
        let row = LedgerRow::from_session(session, status, |product_ref| {
            self.catalog.display_name(product_ref)
        });
        self.ledger.append(row).await;
    }
}

#[async_trait]
impl<M, P, L> CommerceService for CommerceServiceImpl<M, P, L>
where
    M: MessagingClient,
    P: PaymentGateway,
    L: LogisticsClient,
{
    async fn handle_chat_message(
        &self,
        message: InboundMessage,
    ) -> Result<ChatOutcome, ServiceError> {
        self.process_chat_message(message).await
    }

    async fn handle_payment_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        self.reconcile_payment(raw_body, signature).await
    }

    async fn get_order(&self, order_id: &str) -> Option<OrderSession> {
        self.store.get(order_id).await
    }

    async fn flush_ledger(&self) {
        self.ledger.flush().await;
    }
}
