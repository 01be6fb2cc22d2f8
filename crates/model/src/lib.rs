//! Domain types shared by every crate of the order bot.
//!
//! The central entity is [`OrderSession`]: one checkout, keyed by a generated
//! order id, correlated across chat messages, payment notifications and
//! carrier responses. Before delivery details arrive a customer only has a
//! phone-keyed [`Draft`].

mod inbound;
mod ledger;
mod payment;
mod session;

pub use inbound::{
    CatalogOrder, ChangeValue, DeliveryForm, Entry, InboundMessage, InteractiveReply,
    MessageContent, MessagingWebhook, NfmReply, OrderProductItem, TextBody, WebhookChange,
};
pub use ledger::{LedgerRow, LedgerStatus};
pub use payment::{
    EntityEnvelope, LinkCustomer, PaymentEntity, PaymentLinkEntity, PaymentWebhook,
    PaymentWebhookKind, PaymentWebhookPayload,
};
pub use session::{
    ConversationPhase, CustomerDetails, Draft, OrderSession, PaymentEvent, PaymentLinkRef,
    PaymentMode, PaymentStatus, PaymentTransition, ProductItem, ShippingCharge,
};

/// Normalizes a phone number to digits only.
///
/// Bare ten-digit national numbers get `default_country_code` prepended so
/// that `+91 99999 99999`, `9999999999` and `919999999999` all map to the
/// same key. Returns `None` when no digits are present.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0 => None,
        10 => Some(format!("{default_country_code}{digits}")),
        _ => Some(digits),
    }
}

/// Renders an amount in minor units as a major-unit string, e.g. `35000` -> `"350.00"`.
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
