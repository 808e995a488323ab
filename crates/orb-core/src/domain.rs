use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Platform chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Platform message id (numeric, unique per chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a sent or received message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Whoever produced an inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub chat_id: ChatId,
    pub display_name: String,
    pub handle: Option<String>,
}

/// The single privileged identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSlot {
    pub id: UserId,
    pub chat_id: ChatId,
    pub display_name: String,
    pub claimed_at: DateTime<Utc>,
}

/// Routing data for a visitor's latest relayed message.
///
/// Only the most recent message is kept: a new message from the same visitor
/// replaces the record, so older relays stop being reply-able.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub last_visitor_message: MessageRef,
    pub last_relay_message: MessageRef,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Chat the visitor wrote from; replies and broadcasts go there.
    pub fn visitor_chat(&self) -> ChatId {
        self.last_visitor_message.chat_id
    }
}
