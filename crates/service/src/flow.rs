//! Conversation flow: intent classification, the (phase, intent) dispatch
//! table and the side effects of each action.

use clients::{
    LogisticsClient, MessagingClient, PaymentGateway, PaymentLinkRequest, ShipmentOutcome,
};
use model::{
    CatalogOrder, ConversationPhase, CustomerDetails, DeliveryForm, InboundMessage,
    InteractiveReply, LedgerStatus, MessageContent, OrderSession, PaymentMode, PaymentStatus,
    normalize_phone,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{ChatOutcome, CommerceServiceImpl, ServiceError, messages, pricing};

/// Flow token submitted by the platform's form preview. Never a real order.
const TEST_FLOW_TOKEN: &str = "unused";

const GREETING_WORDS: &[&str] = &[
    "hi",
    "hii",
    "hello",
    "hey",
    "namaste",
    "good morning",
    "good evening",
];
const START_WORDS: &[&str] = &[
    "place order",
    "order",
    "order now",
    "menu",
    "catalog",
    "catalogue",
    "shop",
    "buy",
];
const COD_SYNONYMS: &[&str] = &[
    "cod",
    "cash on delivery",
    "cash",
    "cash_on_delivery",
    "pay on delivery",
];

/// A classified inbound chat event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatIntent {
    Greeting,
    StartOrder,
    CatalogSelection(CatalogOrder),
    DetailsSubmitted {
        customer: CustomerDetails,
        payment_mode: PaymentMode,
    },
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Greeting,
    StartOrder,
    CatalogSelection,
    DetailsSubmitted,
    Unrecognized,
}

impl ChatIntent {
    pub fn kind(&self) -> IntentKind {
        match self {
            ChatIntent::Greeting => IntentKind::Greeting,
            ChatIntent::StartOrder => IntentKind::StartOrder,
            ChatIntent::CatalogSelection(_) => IntentKind::CatalogSelection,
            ChatIntent::DetailsSubmitted { .. } => IntentKind::DetailsSubmitted,
            ChatIntent::Unrecognized => IntentKind::Unrecognized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Greet,
    ShowCatalog,
    RecordSelection,
    PlaceOrder,
    Fallback,
}

/// Why a (phase, intent) combination was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Delivery details arrived before any catalog selection.
    NoItemsSelected,
    /// Delivery details arrived for an order whose checkout never finished.
    CheckoutInProgress,
    PaymentPending,
    AlreadyPlaced,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoItemsSelected => "no_items_selected",
            RejectReason::CheckoutInProgress => "checkout_in_progress",
            RejectReason::PaymentPending => "payment_pending",
            RejectReason::AlreadyPlaced => "already_placed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance {
        action: FlowAction,
        next: ConversationPhase,
    },
    Rejected(RejectReason),
}

/// Dispatch table of the conversation state machine.
///
/// Greetings and unrecognized text never change the phase. "Start ordering"
/// and catalog selections are accepted in every phase, since a customer may
/// begin a new order after a finished or abandoned one. Delivery details are
/// only accepted once items are selected.
pub fn dispatch(phase: ConversationPhase, intent: IntentKind) -> Transition {
    use ConversationPhase as P;
    use IntentKind as I;

    let advance = |action, next| Transition::Advance { action, next };
    match (phase, intent) {
        (_, I::Greeting) => advance(FlowAction::Greet, phase),
        (_, I::Unrecognized) => advance(FlowAction::Fallback, phase),
        (_, I::StartOrder) => advance(FlowAction::ShowCatalog, P::CatalogShown),
        (_, I::CatalogSelection) => advance(FlowAction::RecordSelection, P::ItemsSelected),
        (P::ItemsSelected, I::DetailsSubmitted) => {
            advance(FlowAction::PlaceOrder, P::DetailsCollected)
        }
        (P::Idle | P::CatalogShown, I::DetailsSubmitted) => {
            Transition::Rejected(RejectReason::NoItemsSelected)
        }
        // Seen only when a checkout returned an error after promotion and left
        // no draft behind. Every handled checkout failure restores the draft,
        // which then decides the phase instead.
        (P::DetailsCollected, I::DetailsSubmitted) => {
            Transition::Rejected(RejectReason::CheckoutInProgress)
        }
        (P::AwaitingPayment, I::DetailsSubmitted) => {
            Transition::Rejected(RejectReason::PaymentPending)
        }
        (P::CodPlaced, I::DetailsSubmitted) => Transition::Rejected(RejectReason::AlreadyPlaced),
    }
}

/// Flow token handed out with the delivery form for `phone`.
pub(crate) fn flow_token(phone: &str) -> String {
    format!("checkout:{phone}")
}

fn new_order_id() -> String {
    format!("ORD{}", Uuid::new_v4().simple())
}

/// Maps raw message content to an intent.
///
/// # Errors
/// [`ServiceError::Validation`] for a delivery form that is unparseable,
/// incomplete or a test submission.
pub(crate) fn classify(
    content: &MessageContent,
    phone: &str,
    default_country_code: &str,
) -> Result<ChatIntent, ServiceError> {
    match content {
        MessageContent::Text { text } => Ok(classify_text(&text.body)),
        MessageContent::Order { order } => Ok(ChatIntent::CatalogSelection(order.clone())),
        MessageContent::Interactive {
            interactive: InteractiveReply::NfmReply { nfm_reply },
        } => {
            let form: DeliveryForm = serde_json::from_str(&nfm_reply.response_json)
                .map_err(|e| ServiceError::Validation(format!("unreadable delivery form: {e}")))?;
            let (customer, payment_mode) = validate_form(form, phone, default_country_code)?;
            Ok(ChatIntent::DetailsSubmitted {
                customer,
                payment_mode,
            })
        }
        MessageContent::Interactive { .. } | MessageContent::Unsupported => {
            Ok(ChatIntent::Unrecognized)
        }
    }
}

fn classify_text(body: &str) -> ChatIntent {
    let normalized = body
        .trim()
        .trim_end_matches(['!', '.', '?'])
        .to_lowercase();
    if GREETING_WORDS.contains(&normalized.as_str()) {
        ChatIntent::Greeting
    } else if START_WORDS.contains(&normalized.as_str()) {
        ChatIntent::StartOrder
    } else {
        ChatIntent::Unrecognized
    }
}

fn parse_payment_mode(raw: &str) -> Option<PaymentMode> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else if COD_SYNONYMS.contains(&normalized.as_str()) {
        Some(PaymentMode::Cod)
    } else {
        Some(PaymentMode::Prepaid)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_form(
    form: DeliveryForm,
    phone: &str,
    default_country_code: &str,
) -> Result<(CustomerDetails, PaymentMode), ServiceError> {
    if form.flow_token.as_deref().map(str::trim) == Some(TEST_FLOW_TOKEN) {
        return Err(ServiceError::Validation("test form submission".to_string()));
    }

    let required = |value: Option<String>, field: &str| {
        non_empty(value).ok_or_else(|| ServiceError::Validation(format!("missing {field}")))
    };
    let name = required(form.name, "name")?;
    let address_line_1 = required(form.address_line_1, "address")?;
    let pincode = required(form.pincode, "pincode")?;
    if pincode.len() != 6 || !pincode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServiceError::Validation(format!("invalid pincode {pincode}")));
    }
    let payment_mode = form
        .payment_mode
        .as_deref()
        .and_then(parse_payment_mode)
        .ok_or_else(|| ServiceError::Validation("missing payment mode".to_string()))?;
    let contact = non_empty(form.phone)
        .and_then(|raw| normalize_phone(&raw, default_country_code))
        .unwrap_or_else(|| phone.to_string());

    let customer = CustomerDetails {
        name,
        address_line_1,
        address_line_2: non_empty(form.address_line_2),
        city: non_empty(form.city),
        state: non_empty(form.state),
        pincode,
        contact,
        email: non_empty(form.email),
    };
    Ok((customer, payment_mode))
}

impl<M, P, L> CommerceServiceImpl<M, P, L>
where
    M: MessagingClient,
    P: PaymentGateway,
    L: LogisticsClient,
{
    /// Phase used for dispatch: an open draft wins, otherwise the latest
    /// session decides. A prepaid session stops blocking new checkouts once
    /// its payment is settled or its link expired.
    pub(crate) async fn current_phase(&self, phone: &str) -> ConversationPhase {
        if let Some(draft) = self.store.get_draft(phone).await {
            return draft.phase;
        }
        match self.store.find_latest_by_phone(phone).await {
            Some(session) if session.phase == ConversationPhase::AwaitingPayment => {
                match session.payment_status {
                    PaymentStatus::AwaitingPayment | PaymentStatus::Failed => {
                        ConversationPhase::AwaitingPayment
                    }
                    _ => ConversationPhase::Idle,
                }
            }
            Some(session) => session.phase,
            None => ConversationPhase::Idle,
        }
    }

    #[instrument(skip_all, fields(message_id = %message.id))]
    pub(crate) async fn process_chat_message(
        &self,
        message: InboundMessage,
    ) -> Result<ChatOutcome, ServiceError> {
        let Some(phone) = normalize_phone(&message.from, &self.settings.default_country_code)
        else {
            warn!(from = %message.from, "chat message without a usable sender");
            return Ok(ChatOutcome::Ignored);
        };
        let _guard = self.locks.acquire(&phone).await;

        let classified = classify(&message.content, &phone, &self.settings.default_country_code);
        let intent = match classified {
            Ok(intent) => intent,
            Err(ServiceError::Validation(reason)) => {
                warn!(phone = %phone, %reason, "invalid chat submission");
                self.notify(&phone, &messages::invalid_input(&reason)).await;
                return Ok(ChatOutcome::Invalid(reason));
            }
            Err(e) => return Err(e),
        };

        let phase = self.current_phase(&phone).await;
        match dispatch(phase, intent.kind()) {
            Transition::Rejected(reason) => {
                info!(phone = %phone, ?phase, reason = reason.as_str(), "chat event rejected");
                self.notify(&phone, messages::rejected(reason)).await;
                Ok(ChatOutcome::Rejected(reason))
            }
            Transition::Advance { action, next } => {
                debug!(phone = %phone, ?phase, ?next, ?action, "chat transition");
                self.run_action(&phone, action, intent).await
            }
        }
    }

    async fn run_action(
        &self,
        phone: &str,
        action: FlowAction,
        intent: ChatIntent,
    ) -> Result<ChatOutcome, ServiceError> {
        match (action, intent) {
            (FlowAction::Greet, _) => {
                self.notify(phone, messages::GREETING).await;
                Ok(ChatOutcome::Greeted)
            }
            (FlowAction::Fallback, _) => {
                self.notify(phone, messages::FALLBACK).await;
                Ok(ChatOutcome::Fallback)
            }
            (FlowAction::ShowCatalog, _) => {
                self.store.create_draft(phone).await;
                if let Err(e) = self.messaging.send_catalog(phone).await {
                    warn!(phone, error = %e, "failed to send catalog");
                }
                self.notify(phone, messages::CATALOG_PROMPT).await;
                Ok(ChatOutcome::CatalogSent)
            }
            (FlowAction::RecordSelection, ChatIntent::CatalogSelection(order)) => {
                self.record_selection(phone, &order).await
            }
            (
                FlowAction::PlaceOrder,
                ChatIntent::DetailsSubmitted {
                    customer,
                    payment_mode,
                },
            ) => self.place_order(phone, customer, payment_mode).await,
            (action, intent) => Err(ServiceError::Unexpected(format!(
                "action {action:?} dispatched for intent {:?}",
                intent.kind()
            ))),
        }
    }

    async fn record_selection(
        &self,
        phone: &str,
        order: &CatalogOrder,
    ) -> Result<ChatOutcome, ServiceError> {
        let priced = self
            .catalog
            .price_selection(&order.product_items, &self.settings.currency)
            .and_then(|items| pricing::subtotal(&items).map(|amount| (items, amount)));
        let (items, amount) = match priced {
            Ok(priced) => priced,
            Err(ServiceError::Validation(reason)) => {
                warn!(phone, %reason, "catalog selection rejected");
                self.notify(phone, &messages::invalid_input(&reason)).await;
                return Ok(ChatOutcome::Invalid(reason));
            }
            Err(e) => return Err(e),
        };

        let summary = messages::order_summary(&self.catalog.describe(&items), amount);
        self.store.record_selection(phone, items, amount).await;
        info!(phone, amount, "catalog selection recorded");

        self.notify(phone, &summary).await;
        if let Err(e) = self
            .messaging
            .send_form(phone, &self.settings.form_id, &flow_token(phone))
            .await
        {
            warn!(phone, error = %e, "failed to send delivery form");
        }
        Ok(ChatOutcome::ItemsRecorded { amount })
    }

    async fn place_order(
        &self,
        phone: &str,
        customer: CustomerDetails,
        payment_mode: PaymentMode,
    ) -> Result<ChatOutcome, ServiceError> {
        let order_id = new_order_id();
        let session = self
            .store
            .promote(phone, &order_id, customer, payment_mode)
            .await;
        info!(
            order_id = %order_id,
            phone,
            payment_mode = payment_mode.as_str(),
            amount = session.amount,
            "draft promoted to order"
        );

        match payment_mode {
            PaymentMode::Cod => self.place_cod_order(session).await,
            PaymentMode::Prepaid => self.start_prepaid_checkout(session).await,
        }
    }

    /// Confirms a COD order only when the shipping quote parsed and the
    /// carrier created a shipment. Otherwise the customer is asked to
    /// re-enter details and the draft is restored.
    async fn place_cod_order(
        &self,
        mut session: OrderSession,
    ) -> Result<ChatOutcome, ServiceError> {
        let subtotal = pricing::subtotal(&session.product_items)?;
        let weight = self.catalog.total_weight(&session.product_items);

        session.shipping = self.quote_shipping(&session, weight).await;
        session.amount = pricing::cod_total(
            subtotal,
            self.settings.cod_fee,
            session.shipping.amount_or_zero(),
        );

        let waybill = if session.shipping.is_quoted() {
            match self.request_shipment(&session, weight).await {
                Ok(ShipmentOutcome {
                    success,
                    waybill,
                    remarks,
                    raw,
                }) => {
                    session.shipment_response = Some(raw);
                    if !success {
                        warn!(
                            order_id = %session.order_id,
                            phone = %session.phone,
                            remarks = remarks.as_deref().unwrap_or(""),
                            "carrier refused COD shipment"
                        );
                    }
                    waybill.filter(|_| success)
                }
                Err(e) => {
                    warn!(
                        order_id = %session.order_id,
                        phone = %session.phone,
                        error = %e,
                        "COD shipment creation failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        let Some(waybill) = waybill else {
            let order_id = session.order_id.clone();
            self.store.save(session.clone()).await;
            self.store.reopen_draft(&session, subtotal).await;
            self.notify(&session.phone, messages::INVALID_DETAILS).await;
            return Ok(ChatOutcome::CodRejected { order_id });
        };

        session.set_carrier_ref(waybill.as_str());
        session.phase = ConversationPhase::CodPlaced;
        self.store.save(session.clone()).await;
        info!(
            order_id = %session.order_id,
            phone = %session.phone,
            amount = session.amount,
            waybill = %waybill,
            "COD order placed"
        );

        self.record(&session, LedgerStatus::CodPlaced).await;
        let text = messages::cod_confirmed(&session.order_id, session.amount, &waybill);
        self.notify(&session.phone, &text).await;
        Ok(ChatOutcome::CodPlaced {
            order_id: session.order_id,
            waybill,
        })
    }

    /// Issues a payment link for the item subtotal. Shipment is deferred
    /// until the payment notification arrives.
    async fn start_prepaid_checkout(
        &self,
        mut session: OrderSession,
    ) -> Result<ChatOutcome, ServiceError> {
        let request = PaymentLinkRequest {
            amount: session.amount,
            currency: self.settings.currency.clone(),
            description: format!("Order {}", session.order_id),
            customer_name: session.customer.name.clone(),
            customer_contact: session.customer.contact.clone(),
            customer_email: session.customer.email.clone(),
            correlation_ref: session.order_id.clone(),
            expires_in: self.settings.payment_link_expiry,
        };

        let link = match self.payments.create_payment_link(&request).await {
            Ok(link) => link,
            Err(e) => {
                let err = ServiceError::from(e);
                error!(
                    order_id = %session.order_id,
                    phone = %session.phone,
                    error = %err,
                    "payment link creation failed"
                );
                session.payment_status = PaymentStatus::Failed;
                let order_id = session.order_id.clone();
                self.store.save(session.clone()).await;
                self.store.reopen_draft(&session, session.amount).await;
                self.notify(&session.phone, messages::PAYMENT_LINK_FAILED).await;
                return Ok(ChatOutcome::CheckoutFailed { order_id });
            }
        };

        let text = messages::payment_link(&session.order_id, session.amount, &link);
        session.payment_link = Some(link);
        session.phase = ConversationPhase::AwaitingPayment;
        self.store.save(session.clone()).await;

        self.notify(&session.phone, &text).await;
        self.record(&session, LedgerStatus::AwaitingPayment).await;
        Ok(ChatOutcome::PaymentLinkSent {
            order_id: session.order_id,
        })
    }
}
