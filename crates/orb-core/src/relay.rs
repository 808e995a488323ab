use std::{sync::Arc, time::Duration};

use crate::{
    broadcast::{BroadcastCoordinator, BroadcastError, BroadcastReport},
    domain::{ChatId, MessageRef, OwnerSlot, Sender, SessionRecord, UserId},
    formatting::{annotate_caption, annotate_text, escape_html},
    locks::VisitorLocks,
    messaging::{
        port::MessagingPort,
        types::{
            parse_visitor_info, CallbackQuery, Command, IncomingEvent, InlineKeyboard, Media,
            MediaMessage, SendOptions, TextMessage,
        },
    },
    state::{Claim, RelayState, Role},
};

const OWNER_WELCOME: &str = "👑 <b>You are now the owner of this bot.</b>\n\n\
Messages from visitors will be relayed here. Reply to a relayed message to answer its sender.\n\
Use /broadcast &lt;text&gt; to message every visitor, /stats for a summary.";
const OWNER_REMINDER: &str = "👑 You already own this bot.\n\n\
Reply to a relayed message to answer its sender. Use /broadcast &lt;text&gt; to message every visitor, /stats for a summary.";
const OWNER_HINT: &str = "💡 Reply to a relayed message to answer that visitor. \
Use /broadcast &lt;text&gt; to message every visitor.";
const VISITOR_GREETING: &str =
    "👋 Hi! Send a message here and it will be passed on to the owner. Replies arrive in this chat.";
const NO_OWNER: &str = "⚠️ This bot has no owner configured yet, so messages cannot be delivered.";
const VISITOR_ACK: &str = "✅ Message delivered.";
const VISITOR_SEND_ERROR: &str = "❌ Sorry, your message could not be delivered. Please try again later.";
const CANNOT_RESOLVE: &str = "⚠️ Cannot resolve recipient: this is not the latest relayed message of any visitor.";
const NOT_OWNER: &str = "⛔ Only the owner can use this command.";
const BROADCAST_USAGE: &str = "Usage: /broadcast &lt;message&gt;";
const UNSUPPORTED: &str =
    "This kind of message can't be relayed. Send text, a photo, a video, a document or audio.";

/// What the engine did with one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    OwnerClaimed(UserId),
    Greeted,
    NoOwner,
    Forwarded { visitor: UserId, relay: MessageRef },
    ForwardFailed,
    Replied { visitor: UserId },
    ReplyFailed { visitor: UserId },
    Unresolved,
    OwnerHint,
    Broadcast(BroadcastReport),
    BroadcastRejected(BroadcastError),
    Stats,
    Denied,
    CallbackAnswered,
    Unsupported,
}

enum Payload<'a> {
    Text(&'a str),
    Media {
        media: &'a Media,
        caption: Option<&'a str>,
    },
}

/// Routes visitor messages to the owner and owner replies back to visitors.
///
/// Handling never fails: every transport or storage problem is turned into a
/// message for whoever triggered the event.
pub struct RelayEngine {
    state: Arc<RelayState>,
    messenger: Arc<dyn MessagingPort>,
    broadcaster: BroadcastCoordinator,
    locks: VisitorLocks,
    acknowledge_visitors: bool,
}

impl RelayEngine {
    pub fn new(state: Arc<RelayState>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            broadcaster: BroadcastCoordinator::new(state.clone(), messenger.clone()),
            state,
            messenger,
            locks: VisitorLocks::default(),
            acknowledge_visitors: true,
        }
    }

    pub fn with_visitor_acks(mut self, enabled: bool) -> Self {
        self.acknowledge_visitors = enabled;
        self
    }

    pub fn with_broadcast_pacing(mut self, pacing: Duration) -> Self {
        self.broadcaster = self.broadcaster.with_pacing(pacing);
        self
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    pub async fn handle(&self, event: IncomingEvent) -> RelayOutcome {
        // Events of one identity run one at a time, in arrival order.
        let _guard = self.locks.lock(event.sender().id).await;
        match event {
            IncomingEvent::Command(cmd) => self.handle_command(cmd).await,
            IncomingEvent::Text(msg) => self.handle_text(msg).await,
            IncomingEvent::Media(msg) => self.handle_media(msg).await,
            IncomingEvent::Callback(q) => self.handle_callback(q).await,
            IncomingEvent::Unsupported(sender) => {
                self.notify(sender.chat_id, UNSUPPORTED, SendOptions::default())
                    .await;
                RelayOutcome::Unsupported
            }
        }
    }

    async fn handle_command(&self, cmd: Command) -> RelayOutcome {
        match cmd.name.as_str() {
            "start" => self.bootstrap(&cmd.sender).await,
            "broadcast" => self.broadcast(&cmd).await,
            "stats" => self.stats(&cmd.sender).await,
            "help" => match self.state.role_of(cmd.sender.id).await {
                Role::Owner(_) => {
                    self.notify(cmd.sender.chat_id, OWNER_REMINDER, SendOptions::default())
                        .await;
                    RelayOutcome::Greeted
                }
                Role::Visitor(_) => {
                    self.notify(cmd.sender.chat_id, VISITOR_GREETING, SendOptions::default())
                        .await;
                    RelayOutcome::Greeted
                }
                Role::Unclaimed => self.no_owner(&cmd.sender).await,
            },
            _ => {
                // Anything else is plain text that happens to start with `/`:
                // relayed for visitors, a reply when the owner answers a relay.
                let text = format!("/{} {}", cmd.name, cmd.args);
                self.handle_text(TextMessage {
                    sender: cmd.sender,
                    message: cmd.message,
                    text: text.trim_end().to_string(),
                    reply_to: cmd.reply_to,
                })
                .await
            }
        }
    }

    async fn bootstrap(&self, sender: &Sender) -> RelayOutcome {
        match self.state.claim_owner(sender).await {
            Claim::NewlyClaimed(slot) => {
                self.notify(slot.chat_id, OWNER_WELCOME, SendOptions::default())
                    .await;
                RelayOutcome::OwnerClaimed(slot.id)
            }
            Claim::AlreadyOwner(slot) => {
                self.notify(slot.chat_id, OWNER_REMINDER, SendOptions::default())
                    .await;
                RelayOutcome::Greeted
            }
            Claim::OwnedByOther(_) => {
                self.notify(sender.chat_id, VISITOR_GREETING, SendOptions::default())
                    .await;
                RelayOutcome::Greeted
            }
        }
    }

    async fn broadcast(&self, cmd: &Command) -> RelayOutcome {
        let chat = cmd.sender.chat_id;
        match self.broadcaster.broadcast(cmd.sender.id, &cmd.args).await {
            Ok(report) => {
                self.notify(chat, &format_report(&report), SendOptions::reply_to(cmd.message))
                    .await;
                RelayOutcome::Broadcast(report)
            }
            Err(err) => {
                let text = match err {
                    BroadcastError::NotOwner => NOT_OWNER,
                    BroadcastError::EmptyMessage => BROADCAST_USAGE,
                };
                self.notify(chat, text, SendOptions::reply_to(cmd.message))
                    .await;
                RelayOutcome::BroadcastRejected(err)
            }
        }
    }

    async fn stats(&self, sender: &Sender) -> RelayOutcome {
        let Role::Owner(owner) = self.state.role_of(sender.id).await else {
            self.notify(sender.chat_id, NOT_OWNER, SendOptions::default())
                .await;
            return RelayOutcome::Denied;
        };
        let visitors = self.state.visitor_count().await;
        let text = format!(
            "📊 <b>Relay stats</b>\nOwner: {} (<code>{}</code>) since {}\nKnown visitors: {visitors}",
            escape_html(&owner.display_name),
            owner.id.0,
            owner.claimed_at.format("%Y-%m-%d %H:%M UTC"),
        );
        self.notify(sender.chat_id, &text, SendOptions::default())
            .await;
        RelayOutcome::Stats
    }

    async fn handle_text(&self, msg: TextMessage) -> RelayOutcome {
        let payload = Payload::Text(&msg.text);
        self.route(&msg.sender, msg.message, msg.reply_to, payload)
            .await
    }

    async fn handle_media(&self, msg: MediaMessage) -> RelayOutcome {
        let payload = Payload::Media {
            media: &msg.media,
            caption: msg.caption.as_deref(),
        };
        self.route(&msg.sender, msg.message, msg.reply_to, payload)
            .await
    }

    async fn route(
        &self,
        sender: &Sender,
        message: MessageRef,
        reply_to: Option<MessageRef>,
        payload: Payload<'_>,
    ) -> RelayOutcome {
        match self.state.role_of(sender.id).await {
            Role::Unclaimed => self.no_owner(sender).await,
            Role::Visitor(owner) => self.forward(&owner, sender, message, payload).await,
            Role::Owner(owner) => match reply_to {
                Some(target) => self.reply(&owner, message, target, payload).await,
                None => {
                    self.notify(owner.chat_id, OWNER_HINT, SendOptions::default())
                        .await;
                    RelayOutcome::OwnerHint
                }
            },
        }
    }

    async fn forward(
        &self,
        owner: &OwnerSlot,
        sender: &Sender,
        message: MessageRef,
        payload: Payload<'_>,
    ) -> RelayOutcome {
        let caps = self.messenger.capabilities();
        let opts = SendOptions {
            reply_to: None,
            keyboard: caps
                .supports_inline_keyboards
                .then(|| InlineKeyboard::visitor_info(sender.id)),
        };

        let sent = match payload {
            Payload::Text(text) => {
                let html = annotate_text(sender, text, &caps);
                self.messenger.send_text(owner.chat_id, &html, opts).await
            }
            Payload::Media { media, caption } => {
                let html = annotate_caption(sender, media.kind, caption, &caps);
                self.messenger
                    .send_media(owner.chat_id, media, Some(&html), opts)
                    .await
            }
        };

        match sent {
            Ok(relay) => {
                self.state.record_forward(sender, message, relay).await;
                tracing::debug!(visitor = sender.id.0, "visitor message relayed");
                if self.acknowledge_visitors {
                    self.notify(sender.chat_id, VISITOR_ACK, SendOptions::reply_to(message))
                        .await;
                }
                RelayOutcome::Forwarded {
                    visitor: sender.id,
                    relay,
                }
            }
            Err(e) => {
                tracing::warn!(visitor = sender.id.0, error = %e, "relay to owner failed");
                self.notify(sender.chat_id, VISITOR_SEND_ERROR, SendOptions::reply_to(message))
                    .await;
                RelayOutcome::ForwardFailed
            }
        }
    }

    async fn reply(
        &self,
        owner: &OwnerSlot,
        owner_message: MessageRef,
        target: MessageRef,
        payload: Payload<'_>,
    ) -> RelayOutcome {
        let Some(route) = self.state.resolve_reply(target).await else {
            self.notify(owner.chat_id, CANNOT_RESOLVE, SendOptions::reply_to(owner_message))
                .await;
            return RelayOutcome::Unresolved;
        };

        let opts = SendOptions::reply_to(route.visitor_message);
        let sent = match payload {
            Payload::Text(text) => {
                self.messenger
                    .send_text(route.chat_id, &escape_html(text), opts)
                    .await
            }
            Payload::Media { media, caption } => {
                let caption = caption.map(escape_html);
                self.messenger
                    .send_media(route.chat_id, media, caption.as_deref(), opts)
                    .await
            }
        };

        match sent {
            Ok(_) => {
                tracing::debug!(visitor = route.visitor.0, "owner reply delivered");
                RelayOutcome::Replied {
                    visitor: route.visitor,
                }
            }
            Err(e) => {
                tracing::warn!(visitor = route.visitor.0, error = %e, "owner reply failed");
                let text = format!(
                    "❌ Could not deliver your reply to {} (<code>{}</code>): {}",
                    escape_html(&route.display_name),
                    route.visitor.0,
                    escape_html(&short_error(&e.to_string())),
                );
                self.notify(owner.chat_id, &text, SendOptions::reply_to(owner_message))
                    .await;
                RelayOutcome::ReplyFailed {
                    visitor: route.visitor,
                }
            }
        }
    }

    async fn handle_callback(&self, q: CallbackQuery) -> RelayOutcome {
        let answer = match parse_visitor_info(&q.data) {
            Some(visitor) if self.state.is_owner(q.sender.id).await => {
                match self.state.session(visitor).await {
                    Some(record) => visitor_info(visitor, &record),
                    None => format!("No record for visitor {}.", visitor.0),
                }
            }
            _ => "Nothing to do here.".to_string(),
        };
        if let Err(e) = self
            .messenger
            .answer_callback_query(&q.callback_id, Some(&answer))
            .await
        {
            tracing::warn!(error = %e, "failed to answer callback query");
        }
        RelayOutcome::CallbackAnswered
    }

    async fn no_owner(&self, sender: &Sender) -> RelayOutcome {
        self.notify(sender.chat_id, NO_OWNER, SendOptions::default())
            .await;
        RelayOutcome::NoOwner
    }

    /// Best-effort informational message; a failure is only logged.
    async fn notify(&self, chat_id: ChatId, html: &str, opts: SendOptions) {
        if let Err(e) = self.messenger.send_text(chat_id, html, opts).await {
            tracing::warn!(chat = chat_id.0, error = %e, "notification not delivered");
        }
    }
}

fn format_report(report: &BroadcastReport) -> String {
    let mut text = format!(
        "📣 <b>Broadcast finished</b>\n✅ Delivered: {}\n❌ Failed: {}",
        report.success_count, report.failure_count
    );
    if report.attempted() == 0 {
        text.push_str("\n\nNo visitors yet.");
    }
    text
}

/// Plain text (callback answers do not render HTML), kept under the 200 char limit.
fn visitor_info(visitor: UserId, record: &SessionRecord) -> String {
    let handle = record
        .handle
        .as_deref()
        .map(|h| format!("@{h}"))
        .unwrap_or_else(|| "-".to_string());
    let info = format!(
        "ID: {}\nName: {}\nHandle: {handle}\nLast message: {}",
        visitor.0,
        record.display_name,
        record.updated_at.format("%Y-%m-%d %H:%M UTC"),
    );
    info.chars().take(200).collect()
}

fn short_error(s: &str) -> String {
    if s.chars().count() > 120 {
        format!("{}...", s.chars().take(120).collect::<String>())
    } else {
        s.to_string()
    }
}
