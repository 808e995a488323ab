use std::collections::HashMap;

use chrono::Utc;

use crate::domain::{ChatId, MessageRef, Sender, SessionRecord, UserId};

/// Visitor id -> latest relay record, plus a reverse index from the relayed
/// message to its visitor so owner replies resolve in O(1).
///
/// Not synchronized on its own; see [`crate::state::RelayState`].
#[derive(Debug, Default)]
pub struct SessionTable {
    records: HashMap<UserId, SessionRecord>,
    by_relay: HashMap<MessageRef, UserId>,
}

impl SessionTable {
    pub fn from_records(records: impl IntoIterator<Item = (UserId, SessionRecord)>) -> Self {
        let mut table = Self::default();
        for (visitor, record) in records {
            table.insert(visitor, record);
        }
        table
    }

    /// Insert or overwrite the record for `visitor`.
    ///
    /// The previous relay reference stops resolving: only the latest message
    /// of each visitor can be replied to.
    pub fn record_forward(
        &mut self,
        visitor: &Sender,
        visitor_message: MessageRef,
        relay_message: MessageRef,
    ) {
        self.insert(
            visitor.id,
            SessionRecord {
                last_visitor_message: visitor_message,
                last_relay_message: relay_message,
                display_name: visitor.display_name.clone(),
                handle: visitor.handle.clone(),
                updated_at: Utc::now(),
            },
        );
    }

    fn insert(&mut self, visitor: UserId, record: SessionRecord) {
        let relay = record.last_relay_message;
        if let Some(prev) = self.records.insert(visitor, record) {
            // Only retire the old ref if it still points at this visitor.
            let old = prev.last_relay_message;
            if old != relay && self.by_relay.get(&old) == Some(&visitor) {
                self.by_relay.remove(&old);
            }
        }
        // A reused relay ref moves to the newest visitor. The previous
        // visitor keeps its record and stays a broadcast recipient.
        if let Some(previous) = self.by_relay.insert(relay, visitor) {
            if previous != visitor {
                tracing::warn!(
                    relay = relay.message_id.0,
                    from = previous.0,
                    to = visitor.0,
                    "relay ref reassigned"
                );
            }
        }
    }

    /// Visitor whose latest relayed message is `target`, if any.
    pub fn resolve_visitor_for_reply(&self, target: MessageRef) -> Option<UserId> {
        self.by_relay.get(&target).copied()
    }

    pub fn get(&self, visitor: UserId) -> Option<&SessionRecord> {
        self.records.get(&visitor)
    }

    /// Every visitor that ever had a message relayed, in no particular order.
    ///
    /// The iterator borrows the table, so it is finite and can be re-created
    /// at will.
    pub fn all_visitors(&self) -> impl Iterator<Item = UserId> + Clone + '_ {
        self.records.keys().copied()
    }

    /// `(visitor, chat)` pairs for fan-out.
    pub fn routes(&self) -> Vec<(UserId, ChatId)> {
        self.all_visitors()
            .filter_map(|v| self.records.get(&v).map(|r| (v, r.visitor_chat())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &SessionRecord)> {
        self.records.iter()
    }
}
