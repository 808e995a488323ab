use crate::domain::{MessageRef, Sender, UserId};

/// Inbound update, decoded once by the adapter before it reaches the core.
#[derive(Clone, Debug)]
pub enum IncomingEvent {
    Command(Command),
    Text(TextMessage),
    Media(MediaMessage),
    Callback(CallbackQuery),
    /// A message kind the relay cannot carry (stickers, locations, polls...).
    Unsupported(Sender),
}

impl IncomingEvent {
    pub fn sender(&self) -> &Sender {
        match self {
            IncomingEvent::Command(c) => &c.sender,
            IncomingEvent::Text(t) => &t.sender,
            IncomingEvent::Media(m) => &m.sender,
            IncomingEvent::Callback(q) => &q.sender,
            IncomingEvent::Unsupported(sender) => sender,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub sender: Sender,
    pub message: MessageRef,
    /// Lower-cased, without the leading `/` or any `@botname` suffix.
    pub name: String,
    pub args: String,
    pub reply_to: Option<MessageRef>,
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub sender: Sender,
    pub message: MessageRef,
    pub text: String,
    pub reply_to: Option<MessageRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
        }
    }
}

/// Platform-hosted media, re-sendable by its file id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: String,
}

#[derive(Clone, Debug)]
pub struct MediaMessage {
    pub sender: Sender,
    pub message: MessageRef,
    pub media: Media,
    pub caption: Option<String>,
    pub reply_to: Option<MessageRef>,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub sender: Sender,
    pub callback_id: String,
    pub data: String,
}

/// Inline keyboard (buttons) attached to an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

const VISITOR_INFO_PREFIX: &str = "visitor:";

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Single "who sent this" button attached to relayed messages.
    pub fn visitor_info(visitor: UserId) -> Self {
        Self::new(vec![InlineButton {
            label: "👤 Sender info".to_string(),
            callback_data: format!("{VISITOR_INFO_PREFIX}{}", visitor.0),
        }])
    }
}

/// Parse callback data produced by [`InlineKeyboard::visitor_info`].
pub fn parse_visitor_info(data: &str) -> Option<UserId> {
    data.strip_prefix(VISITOR_INFO_PREFIX)?
        .parse::<i64>()
        .ok()
        .map(UserId)
}

/// Per-call options for outbound sends.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub reply_to: Option<MessageRef>,
    pub keyboard: Option<InlineKeyboard>,
}

impl SendOptions {
    pub fn reply_to(msg: MessageRef) -> Self {
        Self {
            reply_to: Some(msg),
            keyboard: None,
        }
    }
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
    pub max_caption_len: usize,
}
