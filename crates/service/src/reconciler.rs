//! Payment notification handling: signature check, session resolution and
//! the payment status state machine.

use clients::{LogisticsClient, MessagingClient, PaymentGateway, ShipmentOutcome};
use hmac::{Hmac, Mac};
use model::{
    LedgerStatus, OrderSession, PaymentEvent, PaymentStatus, PaymentTransition, PaymentWebhook,
    PaymentWebhookKind, normalize_phone,
};
use sha2::Sha256;
use tracing::{debug, error, info, instrument, warn};

use crate::{CommerceServiceImpl, ReconcileOutcome, ServiceError, messages};

type HmacSha256 = Hmac<Sha256>;

/// How a notification was matched to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// The link reference id or `notes.order_id` named a known order.
    Reference,
    /// No reference named a known order; matched through the payer's phone.
    PhoneFallback,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBy::Reference => "reference",
            ResolvedBy::PhoneFallback => "phone_fallback",
        }
    }
}

/// Chooses among one customer's sessions (oldest first) for a notification
/// that no reference could place.
///
/// A session already holding this payment id wins, so a replay stays a
/// duplicate. Next comes the newest session the event advances, then the
/// newest one for which it is a duplicate. Failing both, the newest session
/// is returned and the caller reports the rejection.
pub(crate) fn pick_for_event(
    sessions: Vec<OrderSession>,
    event: PaymentEvent,
    payment_id: Option<&str>,
) -> Option<OrderSession> {
    let rank = |session: &OrderSession| {
        if payment_id.is_some() && session.payment_ref.as_deref() == payment_id {
            return 3;
        }
        match session.payment_status.on_event(event) {
            PaymentTransition::Advance(_) => 2,
            PaymentTransition::Duplicate => 1,
            PaymentTransition::Rejected(_) => 0,
        }
    };

    sessions
        .into_iter()
        .enumerate()
        .max_by_key(|(position, session)| (rank(session), *position))
        .map(|(_, session)| session)
}

fn unresolved(references: &[&str], reason: &str) -> ServiceError {
    if references.is_empty() {
        ServiceError::Resolution(reason.to_string())
    } else {
        ServiceError::Resolution(format!(
            "unknown order reference {} and {reason}",
            references.join(", ")
        ))
    }
}

/// Checks a hex HMAC-SHA256 signature over the exact request bytes.
///
/// Comparison is constant time. An empty secret never verifies.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

impl<M, P, L> CommerceServiceImpl<M, P, L>
where
    M: MessagingClient,
    P: PaymentGateway,
    L: LogisticsClient,
{
    #[instrument(skip_all)]
    pub(crate) async fn reconcile_payment(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::Authentication("missing signature header".to_string()))?;
        if !verify_signature(&self.settings.webhook_secret, raw_body, signature) {
            return Err(ServiceError::Authentication("signature mismatch".to_string()));
        }

        let webhook: PaymentWebhook = serde_json::from_slice(raw_body)
            .map_err(|e| ServiceError::Validation(format!("payment notification body: {e}")))?;
        let event = match webhook.kind() {
            PaymentWebhookKind::Paid => PaymentEvent::Paid,
            PaymentWebhookKind::Failed => PaymentEvent::Failed,
            PaymentWebhookKind::Expired => PaymentEvent::Expired,
            PaymentWebhookKind::Other => {
                debug!(event = %webhook.event, "payment notification ignored");
                return Ok(ReconcileOutcome::Ignored { event: webhook.event });
            }
        };

        let (order_id, phone, resolved_by) = self.resolve(&webhook, event).await?;
        let _guard = self.locks.acquire(&phone).await;

        // Re-read under the lock: a concurrent handler may have moved the status.
        let mut session = self
            .store
            .get(&order_id)
            .await
            .ok_or_else(|| ServiceError::Resolution(format!("session {order_id} disappeared")))?;

        match session.payment_status.on_event(event) {
            PaymentTransition::Duplicate => {
                info!(
                    order_id = %order_id,
                    event = %webhook.event,
                    "duplicate payment notification"
                );
                Ok(ReconcileOutcome::Duplicate { order_id })
            }
            PaymentTransition::Rejected(reason) if event == PaymentEvent::Paid => {
                // Money was captured but no order moves: operators must settle it by hand.
                error!(
                    alert = "unapplied_payment",
                    order_id = %order_id,
                    phone = %session.phone,
                    payment_id = webhook.payment_id().unwrap_or(""),
                    status = ?session.payment_status,
                    resolved_by = resolved_by.as_str(),
                    reason,
                    "captured payment could not be applied"
                );
                self.notify(&session.phone, &messages::payment_not_applied(&order_id))
                    .await;
                Ok(ReconcileOutcome::Rejected { order_id, reason })
            }
            PaymentTransition::Rejected(reason) => {
                warn!(
                    order_id = %order_id,
                    event = %webhook.event,
                    status = ?session.payment_status,
                    reason,
                    "payment notification does not apply"
                );
                Ok(ReconcileOutcome::Rejected { order_id, reason })
            }
            PaymentTransition::Advance(status) => {
                info!(
                    order_id = %order_id,
                    phone = %session.phone,
                    from = ?session.payment_status,
                    to = ?status,
                    resolved_by = resolved_by.as_str(),
                    "payment status advanced"
                );
                session.payment_status = status;
                match status {
                    PaymentStatus::Paid => self.apply_paid(session, &webhook).await,
                    PaymentStatus::Failed => self.apply_failed(session).await,
                    PaymentStatus::Expired => self.apply_expired(session).await,
                    other => {
                        return Err(ServiceError::Unexpected(format!(
                            "payment transition to {other:?}"
                        )));
                    }
                }
                Ok(ReconcileOutcome::Applied {
                    order_id,
                    status,
                    resolved_by,
                })
            }
        }
    }

    /// Finds the session a notification belongs to.
    ///
    /// Each embedded reference is tried in turn. When none names a known
    /// order, the payer's phone is looked up and [`pick_for_event`] chooses
    /// among that customer's sessions.
    async fn resolve(
        &self,
        webhook: &PaymentWebhook,
        event: PaymentEvent,
    ) -> Result<(String, String, ResolvedBy), ServiceError> {
        let references = webhook.correlation_refs();
        for reference in &references {
            if let Some(session) = self.store.get(reference).await {
                return Ok((session.order_id, session.phone, ResolvedBy::Reference));
            }
            debug!(reference, "order reference not known, trying the next one");
        }

        let Some(phone) = webhook
            .contact()
            .and_then(|contact| normalize_phone(contact, &self.settings.default_country_code))
        else {
            return Err(unresolved(&references, "no usable contact"));
        };
        let sessions = self.store.sessions_for_phone(&phone).await;
        let session = pick_for_event(sessions, event, webhook.payment_id())
            .ok_or_else(|| unresolved(&references, &format!("no session for phone {phone}")))?;
        if !references.is_empty() {
            warn!(
                references = %references.join(","),
                order_id = %session.order_id,
                "unknown order reference, matched by phone"
            );
        }
        Ok((session.order_id, session.phone, ResolvedBy::PhoneFallback))
    }

    /// Persists the payment first, then books the shipment. One ledger row is
    /// written whatever the carrier answers.
    async fn apply_paid(&self, mut session: OrderSession, webhook: &PaymentWebhook) {
        session.payment_ref = webhook.payment_id().map(str::to_string);
        self.store.save(session.clone()).await;
        self.notify(&session.phone, &messages::payment_received(&session.order_id, session.amount))
            .await;

        let weight = self.catalog.total_weight(&session.product_items);
        session.shipping = self.quote_shipping(&session, weight).await;

        let waybill = match self.request_shipment(&session, weight).await {
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
                        "carrier refused prepaid shipment"
                    );
                }
                waybill.filter(|_| success)
            }
            Err(e) => {
                warn!(
                    order_id = %session.order_id,
                    phone = %session.phone,
                    error = %e,
                    "prepaid shipment creation failed"
                );
                None
            }
        };

        let text = match waybill {
            Some(waybill) => {
                let text = messages::shipment_created(&session.order_id, &waybill);
                session.set_carrier_ref(waybill);
                text
            }
            None => messages::shipment_pending(&session.order_id),
        };
        self.store.save(session.clone()).await;
        self.notify(&session.phone, &text).await;
        self.record(&session, LedgerStatus::Paid).await;
    }

    async fn apply_failed(&self, session: OrderSession) {
        self.store.save(session.clone()).await;
        self.notify(&session.phone, &messages::payment_failed(session.payment_link.as_ref()))
            .await;
    }

    async fn apply_expired(&self, session: OrderSession) {
        self.store.save(session.clone()).await;
        self.notify(&session.phone, messages::LINK_EXPIRED).await;
    }
}

#[cfg(test)]
mod tests {
    use model::{CustomerDetails, PaymentMode};

    use super::*;

    fn session(order_id: &str, mode: PaymentMode, status: PaymentStatus) -> OrderSession {
        let customer = CustomerDetails {
            name: "Asha".to_string(),
            address_line_1: "12 MG Road".to_string(),
            address_line_2: None,
            city: None,
            state: None,
            pincode: "411001".to_string(),
            contact: "919999999999".to_string(),
            email: None,
        };
        let mut session = OrderSession::promoted(order_id, "919999999999", None, customer, mode);
        session.payment_status = status;
        session
    }

    fn picked(
        sessions: Vec<OrderSession>,
        event: PaymentEvent,
        payment_id: Option<&str>,
    ) -> String {
        pick_for_event(sessions, event, payment_id)
            .map(|session| session.order_id)
            .unwrap_or_default()
    }

    #[test]
    fn test_fallback_skips_sessions_that_reject_the_event() {
        let sessions = vec![
            session("ORD-prepaid", PaymentMode::Prepaid, PaymentStatus::AwaitingPayment),
            session("ORD-cod", PaymentMode::Cod, PaymentStatus::NotApplicable),
        ];
        assert_eq!(picked(sessions, PaymentEvent::Paid, Some("pay_9")), "ORD-prepaid");
    }

    #[test]
    fn test_fallback_prefers_newest_advancing_session() {
        let sessions = vec![
            session("ORD-old", PaymentMode::Prepaid, PaymentStatus::AwaitingPayment),
            session("ORD-new", PaymentMode::Prepaid, PaymentStatus::Failed),
            session("ORD-paid", PaymentMode::Prepaid, PaymentStatus::Paid),
        ];
        assert_eq!(picked(sessions, PaymentEvent::Paid, Some("pay_9")), "ORD-new");
    }

    #[test]
    fn test_fallback_keeps_replays_on_the_paid_session() {
        let mut paid = session("ORD-paid", PaymentMode::Prepaid, PaymentStatus::Paid);
        paid.payment_ref = Some("pay_1".to_string());
        let sessions = vec![
            paid,
            session("ORD-open", PaymentMode::Prepaid, PaymentStatus::AwaitingPayment),
        ];
        assert_eq!(picked(sessions, PaymentEvent::Paid, Some("pay_1")), "ORD-paid");
    }

    #[test]
    fn test_fallback_returns_newest_when_nothing_applies() {
        let sessions = vec![
            session("ORD-cod-1", PaymentMode::Cod, PaymentStatus::NotApplicable),
            session("ORD-cod-2", PaymentMode::Cod, PaymentStatus::NotApplicable),
        ];
        assert_eq!(picked(sessions, PaymentEvent::Paid, None), "ORD-cod-2");
        assert_eq!(picked(Vec::new(), PaymentEvent::Paid, None), "");
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"event":"payment_link.paid"}"#;
        let signature = sign("secret", body);
        assert!(verify_signature("secret", body, &signature));
        assert!(verify_signature("secret", body, &signature.to_uppercase()));
    }

    #[test]
    fn test_signature_covers_exact_bytes() {
        let body = br#"{"event":"payment_link.paid"}"#;
        let reformatted = br#"{ "event": "payment_link.paid" }"#;
        let signature = sign("secret", body);
        assert!(!verify_signature("secret", reformatted, &signature));
        assert!(!verify_signature("other", body, &signature));
    }

    #[test]
    fn test_bad_signatures_are_rejected() {
        let body = b"{}";
        assert!(!verify_signature("secret", body, "not-hex"));
        assert!(!verify_signature("secret", body, ""));
        assert!(!verify_signature("", body, &sign("", body)));
    }
}
