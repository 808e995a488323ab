use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageRef, OwnerSlot, Sender, SessionRecord, UserId},
    owner::OwnerRegistry,
    sessions::SessionTable,
    store::{PersistedState, StateStore},
};

#[derive(Debug, Default)]
struct Inner {
    owner: OwnerRegistry,
    sessions: SessionTable,
}

impl Inner {
    fn snapshot(&self) -> PersistedState {
        PersistedState {
            owner: self.owner.current().cloned(),
            sessions: self
                .sessions
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }
}

/// How the engine should treat a sender, decided in one critical section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Owner(OwnerSlot),
    Visitor(OwnerSlot),
    /// No owner has claimed the bot yet.
    Unclaimed,
}

/// Result of a bootstrap claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Claim {
    NewlyClaimed(OwnerSlot),
    AlreadyOwner(OwnerSlot),
    OwnedByOther(OwnerSlot),
}

/// Where a resolved owner reply should go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyRoute {
    pub visitor: UserId,
    pub chat_id: ChatId,
    pub visitor_message: MessageRef,
    pub display_name: String,
}

/// Shared relay state: owner slot and session table behind one lock.
///
/// Every mutation is persisted inside the same critical section. A failed save
/// is logged and the in-memory state keeps serving. Nothing in here awaits a
/// transport call, so the lock is only ever held briefly.
pub struct RelayState {
    inner: Mutex<Inner>,
    store: StateStore,
}

impl RelayState {
    /// Build from whatever the store holds (empty on missing/corrupt file).
    pub fn open(store: StateStore) -> Self {
        let loaded = store.load();
        tracing::info!(
            path = %store.path().display(),
            owner = loaded.owner.as_ref().map(|o| o.id.0),
            visitors = loaded.sessions.len(),
            "relay state loaded"
        );
        Self {
            inner: Mutex::new(Inner {
                owner: OwnerRegistry::new(loaded.owner),
                sessions: SessionTable::from_records(loaded.sessions),
            }),
            store,
        }
    }

    fn persist(&self, inner: &Inner) {
        if let Err(e) = self.store.save(&inner.snapshot()) {
            tracing::warn!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist relay state, continuing in memory"
            );
        }
    }

    pub async fn claim_owner(&self, sender: &Sender) -> Claim {
        let mut inner = self.inner.lock().await;
        let (newly, slot) = inner.owner.claim(sender);
        let slot = slot.clone();
        if newly {
            self.persist(&inner);
            tracing::info!(owner = slot.id.0, "owner claimed");
            Claim::NewlyClaimed(slot)
        } else if slot.id == sender.id {
            Claim::AlreadyOwner(slot)
        } else {
            Claim::OwnedByOther(slot)
        }
    }

    pub async fn role_of(&self, id: UserId) -> Role {
        let inner = self.inner.lock().await;
        match inner.owner.current() {
            Some(slot) if slot.id == id => Role::Owner(slot.clone()),
            Some(slot) => Role::Visitor(slot.clone()),
            None => Role::Unclaimed,
        }
    }

    pub async fn owner(&self) -> Option<OwnerSlot> {
        self.inner.lock().await.owner.current().cloned()
    }

    pub async fn is_owner(&self, id: UserId) -> bool {
        self.inner.lock().await.owner.is_owner(id)
    }

    pub async fn record_forward(
        &self,
        visitor: &Sender,
        visitor_message: MessageRef,
        relay_message: MessageRef,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .sessions
            .record_forward(visitor, visitor_message, relay_message);
        self.persist(&inner);
    }

    pub async fn resolve_reply(&self, target: MessageRef) -> Option<ReplyRoute> {
        let inner = self.inner.lock().await;
        let visitor = inner.sessions.resolve_visitor_for_reply(target)?;
        let record = inner.sessions.get(visitor)?;
        Some(ReplyRoute {
            visitor,
            chat_id: record.visitor_chat(),
            visitor_message: record.last_visitor_message,
            display_name: record.display_name.clone(),
        })
    }

    pub async fn session(&self, visitor: UserId) -> Option<SessionRecord> {
        self.inner.lock().await.sessions.get(visitor).cloned()
    }

    /// Snapshot of every known visitor and their chat, taken under the lock.
    pub async fn visitor_routes(&self) -> Vec<(UserId, ChatId)> {
        self.inner.lock().await.sessions.routes()
    }

    pub async fn visitor_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Final write at shutdown.
    pub async fn flush(&self) -> crate::Result<()> {
        let inner = self.inner.lock().await;
        self.store.save(&inner.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use std::{
        path::PathBuf,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn tmp_store() -> (StateStore, PathBuf) {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!("/tmp/orb-state-{}-{n}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        (StateStore::new(&path), path)
    }

    fn sender(id: i64) -> Sender {
        Sender {
            id: UserId(id),
            chat_id: ChatId(id),
            display_name: format!("user{id}"),
            handle: None,
        }
    }

    fn msg(chat: i64, id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
        }
    }

    #[tokio::test]
    async fn concurrent_claims_produce_exactly_one_owner() {
        let (store, path) = tmp_store();
        let state = Arc::new(RelayState::open(store));

        let mut handles = Vec::new();
        for id in 1..=16 {
            let state = state.clone();
            handles.push(tokio::spawn(async move { state.claim_owner(&sender(id)).await }));
        }
        let mut newly = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Claim::NewlyClaimed(_)) {
                newly += 1;
            }
        }
        assert_eq!(newly, 1);

        let owner = state.owner().await.unwrap();
        assert_eq!(state.claim_owner(&sender(owner.id.0)).await, Claim::AlreadyOwner(owner.clone()));
        assert_eq!(state.claim_owner(&sender(999)).await, Claim::OwnedByOther(owner.clone()));
        assert_eq!(state.owner().await, Some(owner));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let (store, path) = tmp_store();
        {
            let state = RelayState::open(store.clone());
            state.claim_owner(&sender(1)).await;
            state.record_forward(&sender(5), msg(5, 10), msg(1, 50)).await;
        }

        let reopened = RelayState::open(store);
        assert!(reopened.is_owner(UserId(1)).await);
        assert_eq!(reopened.visitor_count().await, 1);
        let route = reopened.resolve_reply(msg(1, 50)).await.unwrap();
        assert_eq!(route.visitor, UserId(5));
        assert_eq!(route.chat_id, ChatId(5));
        assert_eq!(route.visitor_message, msg(5, 10));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn roles_follow_the_owner_slot() {
        let (store, path) = tmp_store();
        let state = RelayState::open(store);
        assert_eq!(state.role_of(UserId(1)).await, Role::Unclaimed);

        state.claim_owner(&sender(1)).await;
        assert!(matches!(state.role_of(UserId(1)).await, Role::Owner(_)));
        assert!(matches!(state.role_of(UserId(2)).await, Role::Visitor(o) if o.id == UserId(1)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_save_keeps_serving_from_memory() {
        let (blocker, blocker_path) = tmp_store();
        std::fs::write(blocker.path(), "file, not a dir").unwrap();
        let state = RelayState::open(StateStore::new(blocker_path.join("state.json")));

        state.claim_owner(&sender(1)).await;
        state.record_forward(&sender(2), msg(2, 1), msg(1, 9)).await;

        assert!(state.is_owner(UserId(1)).await);
        assert_eq!(state.resolve_reply(msg(1, 9)).await.map(|r| r.visitor), Some(UserId(2)));
        assert!(state.flush().await.is_err());
        let _ = std::fs::remove_file(blocker_path);
    }
}
