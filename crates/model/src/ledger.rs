use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderSession, ShippingCharge, format_minor};

/// Session transitions that produce a ledger row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    AwaitingPayment,
    Paid,
    CodPlaced,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::AwaitingPayment => "AWAITING_PAYMENT",
            LedgerStatus::Paid => "PAID",
            LedgerStatus::CodPlaced => "COD_PLACED",
        }
    }
}

/// One append-only audit row. Column order is fixed by [`LedgerRow::values`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerRow {
    pub recorded_at: DateTime<Utc>,
    pub order_id: String,
    pub phone: String,
    pub status: LedgerStatus,
    pub customer_name: String,
    pub address: String,
    pub pincode: String,
    pub email: String,
    pub items: String,
    pub payment_mode: String,
    pub amount: i64,
    pub shipping_charge: Option<i64>,
    pub shipping_quote: String,
    pub payment_ref: String,
    pub carrier_ref: String,
    pub shipment_response: String,
}

impl LedgerRow {
    pub const HEADERS: [&'static str; 16] = [
        "recorded_at",
        "order_id",
        "phone",
        "status",
        "customer_name",
        "address",
        "pincode",
        "email",
        "items",
        "payment_mode",
        "amount",
        "shipping_charge",
        "shipping_quote",
        "payment_ref",
        "carrier_ref",
        "shipment_response",
    ];

    /// Snapshot of `session` for the given transition. `items` is rendered with
    /// `describe_item`, which typically maps product refs to display names.
    pub fn from_session<F>(session: &OrderSession, status: LedgerStatus, describe_item: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let items = session
            .product_items
            .iter()
            .map(|item| format!("{} x{}", describe_item(&item.product_ref), item.quantity))
            .collect::<Vec<_>>()
            .join("; ");
        let payment_ref = session
            .payment_ref
            .clone()
            .or_else(|| session.payment_link.as_ref().map(|link| link.id.clone()))
            .unwrap_or_default();
        let shipment_response = session
            .shipment_response
            .as_ref()
            .map(|response| response.to_string())
            .unwrap_or_default();
        let shipping_charge = match session.shipping {
            ShippingCharge::Quoted(amount) => Some(amount),
            _ => None,
        };

        Self {
            recorded_at: Utc::now(),
            order_id: session.order_id.clone(),
            phone: session.phone.clone(),
            status,
            customer_name: session.customer.name.clone(),
            address: session.customer.full_address(),
            pincode: session.customer.pincode.clone(),
            email: session.customer.email.clone().unwrap_or_default(),
            items,
            payment_mode: session.payment_mode.as_str().to_string(),
            amount: session.amount,
            shipping_charge,
            shipping_quote: session.shipping.audit_label().to_string(),
            payment_ref,
            carrier_ref: session.carrier_ref.clone().unwrap_or_default(),
            shipment_response,
        }
    }

    /// Cell values in [`LedgerRow::HEADERS`] order.
    pub fn values(&self) -> Vec<String> {
        vec![
            self.recorded_at.to_rfc3339(),
            self.order_id.clone(),
            self.phone.clone(),
            self.status.as_str().to_string(),
            self.customer_name.clone(),
            self.address.clone(),
            self.pincode.clone(),
            self.email.clone(),
            self.items.clone(),
            self.payment_mode.clone(),
            format_minor(self.amount),
            self.shipping_charge.map(format_minor).unwrap_or_default(),
            self.shipping_quote.clone(),
            self.payment_ref.clone(),
            self.carrier_ref.clone(),
            self.shipment_response.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CustomerDetails, PaymentMode, ProductItem};

    fn session(shipping: ShippingCharge) -> OrderSession {
        let mut session = OrderSession::promoted(
            "ORD1",
            "919999999999",
            None,
            CustomerDetails {
                name: "Asha".into(),
                address_line_1: "12 MG Road".into(),
                address_line_2: None,
                city: None,
                state: None,
                pincode: "411001".into(),
                contact: "919999999999".into(),
                email: None,
            },
            PaymentMode::Cod,
        );
        session.product_items.push(ProductItem {
            product_ref: "SKU-1".into(),
            quantity: 2,
            unit_price: 10000,
            currency: "INR".into(),
        });
        session.amount = 35000;
        session.shipping = shipping;
        session
    }

    #[test]
    fn test_degraded_quote_is_distinguishable_from_zero() {
        let quoted = LedgerRow::from_session(
            &session(ShippingCharge::Quoted(0)),
            LedgerStatus::CodPlaced,
            str::to_string,
        );
        let failed = LedgerRow::from_session(
            &session(ShippingCharge::Unavailable("timeout".into())),
            LedgerStatus::CodPlaced,
            str::to_string,
        );

        assert_eq!(quoted.shipping_charge, Some(0));
        assert_eq!(quoted.shipping_quote, "QUOTED");
        assert_eq!(failed.shipping_charge, None);
        assert_eq!(failed.shipping_quote, "UNAVAILABLE");
    }

    #[test]
    fn test_values_follow_header_order() {
        let row = LedgerRow::from_session(
            &session(ShippingCharge::Quoted(5000)),
            LedgerStatus::CodPlaced,
            |r| format!("Item {r}"),
        );
        let values = row.values();
        assert_eq!(values.len(), LedgerRow::HEADERS.len());
        assert_eq!(values[1], "ORD1");
        assert_eq!(values[3], "COD_PLACED");
        assert_eq!(values[8], "Item SKU-1 x2");
        assert_eq!(values[10], "350.00");
        assert_eq!(values[11], "50.00");
    }
}
