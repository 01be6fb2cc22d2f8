use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-customer async mutexes.
///
/// Every chat event and every payment notification for a phone runs its
/// read-decide-mutate-side-effect sequence while holding that phone's guard,
/// so a retried webhook can never interleave with another handler for the
/// same customer. Entries live as long as the process.
#[derive(Debug, Default)]
pub struct CustomerLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `phone`'s sessions.
    pub async fn acquire(&self, phone: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(phone.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
