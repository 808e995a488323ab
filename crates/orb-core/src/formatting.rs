//! HTML rendering of relayed messages.

use crate::{
    domain::Sender,
    messaging::types::{MediaKind, MessagingCapabilities},
};

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape `text` and cut it so the escaped result is at most `max_len` chars.
///
/// Never splits an entity. A cut result ends with `…`, which counts toward the limit.
pub fn escape_html_truncated(text: &str, max_len: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= max_len {
        return escaped;
    }
    if max_len == 0 {
        return String::new();
    }

    let budget = max_len - 1;
    let mut out = String::new();
    let mut used = 0usize;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let piece = match ch {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&quot;",
            _ => ch.encode_utf8(&mut buf),
        };
        let n = piece.chars().count();
        if used + n > budget {
            break;
        }
        out.push_str(piece);
        used += n;
    }
    out.push('…');
    out
}

/// Header identifying the visitor, shown above relayed content.
pub fn relay_header(sender: &Sender, what: &str) -> String {
    let handle = sender
        .handle
        .as_deref()
        .map(|h| format!(" (@{})", escape_html(h)))
        .unwrap_or_default();
    format!(
        "📨 <b>{what} from {}</b>{handle}\n🆔 <code>{}</code>",
        escape_html(&sender.display_name),
        sender.id.0
    )
}

/// Full annotated body for a relayed text message.
pub fn annotate_text(sender: &Sender, text: &str, caps: &MessagingCapabilities) -> String {
    let header = relay_header(sender, "Message");
    let budget = caps
        .max_message_len
        .saturating_sub(header.chars().count() + 2);
    format!("{header}\n\n{}", escape_html_truncated(text, budget))
}

/// Annotated caption for relayed media; the original caption is kept below the header.
pub fn annotate_caption(
    sender: &Sender,
    kind: MediaKind,
    caption: Option<&str>,
    caps: &MessagingCapabilities,
) -> String {
    let what = capitalize(kind.label());
    let header = relay_header(sender, &what);
    match caption.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => {
            let budget = caps
                .max_caption_len
                .saturating_sub(header.chars().count() + 2);
            format!("{header}\n\n{}", escape_html_truncated(c, budget))
        }
        None => header,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
