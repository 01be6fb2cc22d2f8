//! Wire shapes of the payment provider's webhook notifications.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentWebhook {
    pub event: String,
    #[serde(default)]
    pub payload: PaymentWebhookPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentWebhookPayload {
    pub payment: Option<EntityEnvelope<PaymentEntity>>,
    pub payment_link: Option<EntityEnvelope<PaymentLinkEntity>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityEnvelope<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEntity {
    pub id: String,
    pub amount: Option<i64>,
    pub status: Option<String>,
    pub contact: Option<String>,
    /// Free-form notes. The provider sends `[]` instead of `{}` when empty.
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl PaymentEntity {
    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLinkEntity {
    pub id: String,
    pub reference_id: Option<String>,
    pub status: Option<String>,
    pub short_url: Option<String>,
    pub customer: Option<LinkCustomer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkCustomer {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentWebhookKind {
    Paid,
    Failed,
    Expired,
    /// Any event the reconciler does not act on.
    Other,
}

impl PaymentWebhook {
    pub fn kind(&self) -> PaymentWebhookKind {
        match self.event.as_str() {
            "payment_link.paid" | "payment.captured" => PaymentWebhookKind::Paid,
            "payment.failed" => PaymentWebhookKind::Failed,
            "payment_link.expired" | "payment_link.cancelled" => PaymentWebhookKind::Expired,
            _ => PaymentWebhookKind::Other,
        }
    }

    /// Order ids embedded by us when the link was created, in lookup order:
    /// the link's `reference_id`, then the payment's `notes.order_id`.
    /// Blank values and repeats are dropped.
    pub fn correlation_refs(&self) -> Vec<&str> {
        let from_link = self
            .payload
            .payment_link
            .as_ref()
            .and_then(|link| link.entity.reference_id.as_deref());
        let from_notes = self
            .payload
            .payment
            .as_ref()
            .and_then(|payment| payment.entity.note("order_id"));

        let mut refs: Vec<&str> = Vec::with_capacity(2);
        for value in from_link.into_iter().chain(from_notes).map(str::trim) {
            if !value.is_empty() && !refs.contains(&value) {
                refs.push(value);
            }
        }
        refs
    }

    /// Raw customer contact as reported by the provider, payment first.
    pub fn contact(&self) -> Option<&str> {
        let from_payment = self
            .payload
            .payment
            .as_ref()
            .and_then(|payment| payment.entity.contact.as_deref());
        let from_link = self
            .payload
            .payment_link
            .as_ref()
            .and_then(|link| link.entity.customer.as_ref())
            .and_then(|customer| customer.contact.as_deref());

        from_payment
            .into_iter()
            .chain(from_link)
            .find(|value| !value.trim().is_empty())
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payload
            .payment
            .as_ref()
            .map(|payment| payment.entity.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_reference_comes_before_notes() {
        let json = r#"
        {
          "event": "payment_link.paid",
          "payload": {
            "payment_link": { "entity": { "id": "plink_1", "reference_id": "ORD-A", "status": "paid" } },
            "payment": { "entity": { "id": "pay_1", "amount": 20000, "contact": "+919999999999",
                                     "notes": { "order_id": "ORD-B" } } }
          }
        }
        "#;
        let webhook: PaymentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.kind(), PaymentWebhookKind::Paid);
        assert_eq!(webhook.correlation_refs(), vec!["ORD-A", "ORD-B"]);
        assert_eq!(webhook.contact(), Some("+919999999999"));
        assert_eq!(webhook.payment_id(), Some("pay_1"));
    }

    #[test]
    fn test_empty_notes_array_and_missing_reference() {
        let json = r#"
        {
          "event": "payment.captured",
          "payload": { "payment": { "entity": { "id": "pay_2", "contact": "+919999999999", "notes": [] } } }
        }
        "#;
        let webhook: PaymentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.kind(), PaymentWebhookKind::Paid);
        assert!(webhook.correlation_refs().is_empty());
        assert_eq!(webhook.contact(), Some("+919999999999"));
    }

    #[test]
    fn test_repeated_reference_listed_once() {
        let json = r#"
        {
          "event": "payment_link.paid",
          "payload": {
            "payment_link": { "entity": { "id": "plink_1", "reference_id": " ORD-A " } },
            "payment": { "entity": { "id": "pay_1", "notes": { "order_id": "ORD-A" } } }
          }
        }
        "#;
        let webhook: PaymentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.correlation_refs(), vec!["ORD-A"]);
    }

    #[test]
    fn test_event_kinds() {
        let kind = |event: &str| PaymentWebhook {
            event: event.to_string(),
            payload: PaymentWebhookPayload::default(),
        }
        .kind();
        assert_eq!(kind("payment_link.expired"), PaymentWebhookKind::Expired);
        assert_eq!(kind("payment.failed"), PaymentWebhookKind::Failed);
        assert_eq!(kind("order.paid"), PaymentWebhookKind::Other);
    }
}
