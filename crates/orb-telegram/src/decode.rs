//! Telegram update -> core event decoding.
//!
//! The only place that pokes at optional Telegram fields; everything past
//! here works with the closed [`IncomingEvent`] type.

use teloxide::types::{CallbackQuery as TgCallbackQuery, Message, User};

use orb_core::{
    domain::{ChatId, MessageId, MessageRef, Sender, UserId},
    messaging::types::{
        CallbackQuery, Command, IncomingEvent, Media, MediaKind, MediaMessage, TextMessage,
    },
};

/// Split `/cmd@botname rest of line` into (`cmd`, `rest of line`).
///
/// Returns `None` for text that is not a command (including a bare `/`).
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim().to_string();

    let name = first.split('@').next().unwrap_or("").to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, rest))
}

fn sender_of(user: &User, chat_id: teloxide::types::ChatId) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        chat_id: ChatId(chat_id.0),
        display_name: user.full_name(),
        handle: user.username.clone(),
    }
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

fn media_of(msg: &Message) -> Option<Media> {
    if let Some(photos) = msg.photo() {
        // Sizes are ordered small -> large.
        let best = photos.last()?;
        return Some(Media {
            kind: MediaKind::Photo,
            file_id: best.file.id.clone(),
        });
    }
    if let Some(video) = msg.video() {
        return Some(Media {
            kind: MediaKind::Video,
            file_id: video.file.id.clone(),
        });
    }
    if let Some(doc) = msg.document() {
        return Some(Media {
            kind: MediaKind::Document,
            file_id: doc.file.id.clone(),
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(Media {
            kind: MediaKind::Audio,
            file_id: audio.file.id.clone(),
        });
    }
    None
}

/// Decode a message; `None` only when it has no sender to answer.
pub fn decode_message(msg: &Message) -> Option<IncomingEvent> {
    let user = msg.from()?;
    let sender = sender_of(user, msg.chat.id);
    let message = message_ref(msg);
    let reply_to = msg.reply_to_message().map(message_ref);

    if let Some(text) = msg.text() {
        if let Some((name, args)) = parse_command(text) {
            return Some(IncomingEvent::Command(Command {
                sender,
                message,
                name,
                args,
                reply_to,
            }));
        }
        return Some(IncomingEvent::Text(TextMessage {
            sender,
            message,
            text: text.to_string(),
            reply_to,
        }));
    }

    let Some(media) = media_of(msg) else {
        return Some(IncomingEvent::Unsupported(sender));
    };
    Some(IncomingEvent::Media(MediaMessage {
        sender,
        message,
        media,
        caption: msg.caption().map(str::to_string),
        reply_to,
    }))
}

pub fn decode_callback(q: &TgCallbackQuery) -> IncomingEvent {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(teloxide::types::ChatId(q.from.id.0 as i64));
    IncomingEvent::Callback(CallbackQuery {
        sender: sender_of(&q.from, chat_id),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/broadcast@OrbBot  sale today  "),
            Some(("broadcast".to_string(), "sale today".to_string()))
        );
        assert_eq!(
            parse_command("/START"),
            Some(("start".to_string(), String::new()))
        );
        assert_eq!(
            parse_command("/broadcast\nline one\nline two"),
            Some(("broadcast".to_string(), "line one\nline two".to_string()))
        );
    }

    fn user(id: i64, name: &str) -> serde_json::Value {
        json!({ "id": id, "is_bot": false, "first_name": name, "username": name.to_lowercase() })
    }

    fn private_chat(id: i64, name: &str) -> serde_json::Value {
        json!({ "id": id, "type": "private", "first_name": name })
    }

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).expect("valid telegram message")
    }

    fn relayed_copy() -> serde_json::Value {
        json!({
            "message_id": 1001,
            "date": 1_700_000_000,
            "chat": private_chat(1, "Olivia"),
            "from": { "id": 999, "is_bot": true, "first_name": "Orb", "username": "orb_bot" },
            "text": "relayed"
        })
    }

    fn at(chat: i64, id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
        }
    }

    #[test]
    fn owner_text_reply_keeps_the_reply_target() {
        let msg = message(json!({
            "message_id": 50,
            "date": 1_700_000_100,
            "chat": private_chat(1, "Olivia"),
            "from": user(1, "Olivia"),
            "text": "hi there",
            "reply_to_message": relayed_copy()
        }));

        let Some(IncomingEvent::Text(t)) = decode_message(&msg) else {
            panic!("expected a text event");
        };
        assert_eq!(t.sender.id, UserId(1));
        assert_eq!(t.sender.handle.as_deref(), Some("olivia"));
        assert_eq!(t.message, at(1, 50));
        assert_eq!(t.text, "hi there");
        assert_eq!(t.reply_to, Some(at(1, 1001)));
    }

    #[test]
    fn command_reply_keeps_the_reply_target() {
        let msg = message(json!({
            "message_id": 51,
            "date": 1_700_000_100,
            "chat": private_chat(1, "Olivia"),
            "from": user(1, "Olivia"),
            "text": "/price is 5",
            "reply_to_message": relayed_copy()
        }));

        let Some(IncomingEvent::Command(cmd)) = decode_message(&msg) else {
            panic!("expected a command event");
        };
        assert_eq!(cmd.name, "price");
        assert_eq!(cmd.args, "is 5");
        assert_eq!(cmd.reply_to, Some(at(1, 1001)));
    }

    #[test]
    fn photo_uses_the_largest_size_and_keeps_the_caption() {
        let size = |id: &str, w: u32| {
            json!({ "file_id": id, "file_unique_id": format!("u-{id}"), "width": w, "height": w, "file_size": w * 10 })
        };
        let msg = message(json!({
            "message_id": 7,
            "date": 1_700_000_200,
            "chat": private_chat(30, "Mia"),
            "from": user(30, "Mia"),
            "photo": [size("small", 90), size("medium", 320), size("large", 1280)],
            "caption": "my cat"
        }));

        let Some(IncomingEvent::Media(m)) = decode_message(&msg) else {
            panic!("expected a media event");
        };
        assert_eq!(m.media.kind, MediaKind::Photo);
        assert_eq!(m.media.file_id, "large");
        assert_eq!(m.caption.as_deref(), Some("my cat"));
        assert_eq!(m.reply_to, None);
    }

    #[test]
    fn other_message_kinds_are_unsupported() {
        let msg = message(json!({
            "message_id": 8,
            "date": 1_700_000_300,
            "chat": private_chat(40, "Stan"),
            "from": user(40, "Stan"),
            "location": { "latitude": 52.52, "longitude": 13.405 }
        }));

        let Some(IncomingEvent::Unsupported(sender)) = decode_message(&msg) else {
            panic!("expected an unsupported event");
        };
        assert_eq!(sender.id, UserId(40));
        assert_eq!(sender.chat_id, ChatId(40));
    }

    #[test]
    fn callback_without_message_answers_in_the_users_chat() {
        let q: TgCallbackQuery = serde_json::from_value(json!({
            "id": "4382",
            "from": user(1, "Olivia"),
            "chat_instance": "-71",
            "data": "visitor:30"
        }))
        .expect("valid callback query");

        let IncomingEvent::Callback(cb) = decode_callback(&q) else {
            panic!("expected a callback event");
        };
        assert_eq!(cb.callback_id, "4382");
        assert_eq!(cb.data, "visitor:30");
        assert_eq!(cb.sender.chat_id, ChatId(1));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/ spaced"), None);
        assert_eq!(parse_command("/path/to/file"), None);
    }
}
