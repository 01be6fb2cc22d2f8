use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of a catalog selection. `unit_price` is in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductItem {
    pub product_ref: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub currency: String,
}

/// Delivery details captured from the structured form submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerDetails {
    pub name: String,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: String,
    pub contact: String,
    pub email: Option<String>,
}

impl CustomerDetails {
    /// Single-line address as printed on the shipping label and ledger row.
    pub fn full_address(&self) -> String {
        [
            Some(self.address_line_1.as_str()),
            self.address_line_2.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Prepaid,
    Cod,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Prepaid => "PREPAID",
            PaymentMode::Cod => "COD",
        }
    }

    /// Rate class understood by the carrier's quote and shipment endpoints.
    pub fn carrier_class(&self) -> &'static str {
        match self {
            PaymentMode::Prepaid => "Pre-paid",
            PaymentMode::Cod => "COD",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    AwaitingPayment,
    Paid,
    Failed,
    Expired,
    /// Cash on delivery: no online payment is expected.
    NotApplicable,
}

/// Payment outcome reported by the provider's webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Paid,
    Failed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Move to the new status and run its side effects.
    Advance(PaymentStatus),
    /// The session is already in the status this event leads to.
    Duplicate,
    /// The event cannot apply to the current status.
    Rejected(&'static str),
}

impl PaymentStatus {
    /// Transition table for payment notifications.
    ///
    /// Status only moves forward: `AwaitingPayment -> Failed -> {Paid | Expired}`,
    /// with `Paid` and `Expired` terminal.
    ///
    /// `Failed` is not terminal, unlike the other settled states. The provider
    /// keeps a link payable after a failed attempt, so a later `Paid` on the
    /// same link must still ship the order, and a later `Expired` still closes it.
    pub fn on_event(self, event: PaymentEvent) -> PaymentTransition {
        use PaymentEvent as E;
        use PaymentStatus as S;

        match (self, event) {
            (S::AwaitingPayment, E::Paid) | (S::Failed, E::Paid) => {
                PaymentTransition::Advance(S::Paid)
            }
            (S::AwaitingPayment, E::Failed) => PaymentTransition::Advance(S::Failed),
            (S::AwaitingPayment, E::Expired) | (S::Failed, E::Expired) => {
                PaymentTransition::Advance(S::Expired)
            }
            (S::Paid, E::Paid) | (S::Failed, E::Failed) | (S::Expired, E::Expired) => {
                PaymentTransition::Duplicate
            }
            (S::Paid, _) => PaymentTransition::Rejected("payment already captured"),
            (S::Expired, _) => PaymentTransition::Rejected("payment link already expired"),
            (S::NotApplicable, _) => PaymentTransition::Rejected("cash-on-delivery order"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Expired)
    }
}

/// Shipping charge in minor units, keeping "never asked" apart from
/// "asked and failed" and from a genuine zero quote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ShippingCharge {
    #[default]
    NotQueried,
    Quoted(i64),
    Unavailable(String),
}

impl ShippingCharge {
    /// Charge to add to a total. Falls back to zero when the quote is missing.
    pub fn amount_or_zero(&self) -> i64 {
        match self {
            ShippingCharge::Quoted(amount) => *amount,
            _ => 0,
        }
    }

    pub fn is_quoted(&self) -> bool {
        matches!(self, ShippingCharge::Quoted(_))
    }

    pub fn audit_label(&self) -> &'static str {
        match self {
            ShippingCharge::NotQueried => "NOT_QUERIED",
            ShippingCharge::Quoted(_) => "QUOTED",
            ShippingCharge::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

/// Where a customer currently stands in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    CatalogShown,
    ItemsSelected,
    DetailsCollected,
    AwaitingPayment,
    CodPlaced,
}

/// Phone-keyed pre-session holding the catalog selection until delivery
/// details arrive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Draft {
    pub phone: String,
    pub phase: ConversationPhase,
    pub items: Vec<ProductItem>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            phase: ConversationPhase::CatalogShown,
            items: Vec::new(),
            amount: 0,
            created_at: Utc::now(),
        }
    }
}

/// Hosted payment link issued for a prepaid order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentLinkRef {
    pub id: String,
    pub short_url: String,
    pub expires_at: DateTime<Utc>,
}

/// A checkout promoted from a draft once delivery details were submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderSession {
    pub order_id: String,
    pub phone: String,
    pub product_items: Vec<ProductItem>,
    pub amount: i64,
    pub customer: CustomerDetails,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub phase: ConversationPhase,
    pub shipping: ShippingCharge,
    pub payment_link: Option<PaymentLinkRef>,
    /// Provider payment id, set when a payment notification is applied.
    pub payment_ref: Option<String>,
    /// Carrier waybill, set at most once after a successful shipment creation.
    pub carrier_ref: Option<String>,
    /// Raw carrier response kept for the audit trail.
    pub shipment_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSession {
    /// Builds a freshly promoted session. Items and amount come from the draft
    /// when there is one.
    pub fn promoted(
        order_id: impl Into<String>,
        phone: impl Into<String>,
        draft: Option<Draft>,
        customer: CustomerDetails,
        payment_mode: PaymentMode,
    ) -> Self {
        let (product_items, amount) = draft
            .map(|draft| (draft.items, draft.amount))
            .unwrap_or_default();
        let payment_status = match payment_mode {
            PaymentMode::Prepaid => PaymentStatus::AwaitingPayment,
            PaymentMode::Cod => PaymentStatus::NotApplicable,
        };
        let now = Utc::now();

        Self {
            order_id: order_id.into(),
            phone: phone.into(),
            product_items,
            amount,
            customer,
            payment_mode,
            payment_status,
            phase: ConversationPhase::DetailsCollected,
            shipping: ShippingCharge::NotQueried,
            payment_link: None,
            payment_ref: None,
            carrier_ref: None,
            shipment_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the carrier waybill. A waybill that is already set is kept.
    pub fn set_carrier_ref(&mut self, waybill: impl Into<String>) -> bool {
        if self.carrier_ref.is_some() {
            return false;
        }
        self.carrier_ref = Some(waybill.into());
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
