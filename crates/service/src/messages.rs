//! Customer-facing chat texts.

use model::{PaymentLinkRef, format_minor};

use crate::flow::RejectReason;

pub(crate) const GREETING: &str =
    "Hi! Welcome to our store. Type \"place order\" to browse the catalog and order.";

pub(crate) const CATALOG_PROMPT: &str =
    "Add the items you like to your cart from the catalog above and send the cart to us.";

pub(crate) const FALLBACK: &str =
    "Sorry, I didn't understand that. Type \"place order\" to start a new order.";

pub(crate) const INVALID_DETAILS: &str =
    "We couldn't book a delivery with the details provided. \
     Please check your address and pincode and re-enter your details.";

pub(crate) const PAYMENT_LINK_FAILED: &str =
    "We couldn't create a payment link right now. \
     Please submit your delivery details again in a few minutes.";

pub(crate) const LINK_EXPIRED: &str =
    "Your payment link has expired. Type \"place order\" to start a fresh checkout.";

pub(crate) fn rejected(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::NoItemsSelected => {
            "Please add items from the catalog to your cart first, \
             then fill in your delivery details."
        }
        RejectReason::CheckoutInProgress => {
            "Your previous checkout did not finish. Type \"place order\" to start again."
        }
        RejectReason::PaymentPending => {
            "Your order is waiting for payment. Please use the payment link we sent, \
             or type \"place order\" to start over."
        }
        RejectReason::AlreadyPlaced => {
            "Your order has already been placed. \
             Type \"place order\" if you'd like to order something else."
        }
    }
}

pub(crate) fn invalid_input(reason: &str) -> String {
    format!("Sorry, we couldn't process that: {reason}. Please try again.")
}

pub(crate) fn order_summary(items: &str, subtotal: i64) -> String {
    format!(
        "Your cart: {items}\nSubtotal: ₹{}\nPlease fill in your delivery details to continue.",
        format_minor(subtotal)
    )
}

pub(crate) fn cod_confirmed(order_id: &str, amount: i64, waybill: &str) -> String {
    format!(
        "Your order {order_id} is confirmed! Please pay ₹{} in cash on delivery \
         (includes shipping and COD charges). Tracking number: {waybill}",
        format_minor(amount)
    )
}

pub(crate) fn payment_link(order_id: &str, amount: i64, link: &PaymentLinkRef) -> String {
    format!(
        "Please pay ₹{} for order {order_id} using this link: {}\nThe link expires at {} UTC.",
        format_minor(amount),
        link.short_url,
        link.expires_at.format("%H:%M")
    )
}

pub(crate) fn payment_received(order_id: &str, amount: i64) -> String {
    format!("Payment of ₹{} received for order {order_id}. Thank you!", format_minor(amount))
}

pub(crate) fn shipment_created(order_id: &str, waybill: &str) -> String {
    format!("Your order {order_id} has been shipped. Tracking number: {waybill}")
}

pub(crate) fn shipment_pending(order_id: &str) -> String {
    format!(
        "Payment received for order {order_id}, shipment pending. \
         Our team will share the tracking details shortly."
    )
}

pub(crate) fn payment_failed(link: Option<&PaymentLinkRef>) -> String {
    match link {
        Some(link) => format!(
            "Your payment did not go through. You can retry using the same link: {}",
            link.short_url
        ),
        None => "Your payment did not go through. Please try again.".to_string(),
    }
}

pub(crate) fn payment_not_applied(order_id: &str) -> String {
    format!(
        "We received a payment for order {order_id} but could not match it to an open checkout. \
         Our team will contact you shortly to ship your order or refund the payment."
    )
}
