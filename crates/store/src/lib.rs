//! In-memory correlation store for order sessions.
//!
//! Sessions are keyed by order id, with a secondary index from normalized
//! phone to the order ids created for it (oldest first). Drafts are keyed by
//! phone; there is at most one per customer. Nothing here survives a restart:
//! a production deployment needs these maps backed by a persistent store.

mod locks;

pub use locks::CustomerLocks;

use std::collections::HashMap;
use std::sync::Arc;

use model::{ConversationPhase, CustomerDetails, Draft, OrderSession, PaymentMode, ProductItem};
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Default)]
struct StoreInner {
    drafts: HashMap<String, Draft>,
    sessions: HashMap<String, OrderSession>,
    by_phone: HashMap<String, Vec<String>>,
}

/// Thread-safe session store.
#[derive(Debug, Default, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl SessionStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh draft for `phone`, discarding any previous one.
    pub async fn create_draft(&self, phone: &str) -> Draft {
        let draft = Draft::new(phone);
        let mut inner = self.inner.write().await;
        inner.drafts.insert(phone.to_string(), draft.clone());
        draft
    }

    pub async fn get_draft(&self, phone: &str) -> Option<Draft> {
        let inner = self.inner.read().await;
        inner.drafts.get(phone).cloned()
    }

    /// Replaces the draft's selection. Creates the draft when the selection
    /// arrives without a preceding "start ordering" message.
    pub async fn record_selection(
        &self,
        phone: &str,
        items: Vec<ProductItem>,
        amount: i64,
    ) -> Draft {
        let mut inner = self.inner.write().await;
        let draft = inner
            .drafts
            .entry(phone.to_string())
            .or_insert_with(|| Draft::new(phone));
        draft.items = items;
        draft.amount = amount;
        draft.phase = ConversationPhase::ItemsSelected;
        draft.clone()
    }

    /// Turns the phone's draft into an order-id keyed session.
    ///
    /// Items and amount are carried over from the draft. Without a draft the
    /// session starts empty with a zero amount. The draft is consumed.
    pub async fn promote(
        &self,
        phone: &str,
        order_id: &str,
        customer: CustomerDetails,
        payment_mode: PaymentMode,
    ) -> OrderSession {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.sessions.get(order_id) {
            warn!(order_id, "order id already promoted, keeping existing session");
            return existing.clone();
        }

        let draft = inner.drafts.remove(phone);
        let session = OrderSession::promoted(order_id, phone, draft, customer, payment_mode);
        inner.sessions.insert(order_id.to_string(), session.clone());
        inner
            .by_phone
            .entry(phone.to_string())
            .or_default()
            .push(order_id.to_string());
        session
    }

    /// Restores a draft from a session's items so the customer can re-submit
    /// delivery details after a failed checkout attempt. `subtotal` is the
    /// item total without shipping or fees.
    pub async fn reopen_draft(&self, session: &OrderSession, subtotal: i64) -> Draft {
        let mut draft = Draft::new(session.phone.as_str());
        draft.items = session.product_items.clone();
        draft.amount = subtotal;
        draft.phase = ConversationPhase::ItemsSelected;

        let mut inner = self.inner.write().await;
        inner.drafts.insert(session.phone.clone(), draft.clone());
        draft
    }

    /// Get a cloned session by its order id.
    pub async fn get(&self, order_id: &str) -> Option<OrderSession> {
        let inner = self.inner.read().await;
        inner.sessions.get(order_id).cloned()
    }

    /// Most recently created session for `phone`.
    ///
    /// Best-effort only: with two prepaid orders in flight for the same phone
    /// this returns the newer one even if the notification belongs to the older.
    pub async fn find_latest_by_phone(&self, phone: &str) -> Option<OrderSession> {
        let inner = self.inner.read().await;
        inner
            .by_phone
            .get(phone)
            .and_then(|ids| ids.last())
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    /// Writes back a mutated session. Unknown order ids are ignored, since
    /// sessions only come into existence through [`SessionStore::promote`].
    pub async fn save(&self, mut session: OrderSession) -> bool {
        session.touch();
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&session.order_id) {
            Some(slot) => {
                *slot = session;
                true
            }
            None => {
                warn!(order_id = %session.order_id, "save for unknown session ignored");
                false
            }
        }
    }

    /// All sessions for `phone`, oldest first.
    pub async fn sessions_for_phone(&self, phone: &str) -> Vec<OrderSession> {
        let inner = self.inner.read().await;
        inner
            .by_phone
            .get(phone)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }
}
