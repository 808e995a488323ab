use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::UserId;

/// One async mutex per identity.
///
/// Holding a guard serializes that identity's events (so a visitor's second
/// message can never be recorded before their first) while other identities
/// keep going in parallel.
#[derive(Default)]
pub struct VisitorLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl VisitorLocks {
    pub async fn lock(&self, id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
