use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{Media, MessagingCapabilities, SendOptions},
    },
    Result,
};

/// Chats with no pending slot are forgotten once the table grows past this.
const PRUNE_ABOVE: usize = 512;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Booked send slots: one global queue plus one queue per chat.
#[derive(Debug)]
struct Schedule {
    cfg: ThrottleConfig,
    global_next: Instant,
    chat_next: HashMap<ChatId, Instant>,
}

impl Schedule {
    fn new(cfg: ThrottleConfig, now: Instant) -> Self {
        Self {
            cfg,
            global_next: now,
            chat_next: HashMap::new(),
        }
    }

    /// Book a slot for a call into `chat` (or a chat-less call) and return
    /// the instant it may start.
    fn book(&mut self, chat: Option<ChatId>, now: Instant) -> Instant {
        let global_slot = self.global_next.max(now);
        self.global_next = global_slot + self.cfg.global_min_interval;

        let Some(chat) = chat else {
            return global_slot;
        };
        let chat_slot = self
            .chat_next
            .get(&chat)
            .map_or(now, |next| (*next).max(now));
        self.chat_next
            .insert(chat, chat_slot + self.cfg.per_chat_min_interval);

        if self.chat_next.len() > PRUNE_ABOVE {
            self.chat_next.retain(|_, next| *next > now);
        }
        global_slot.max(chat_slot)
    }
}

/// MessagingPort decorator that paces outbound calls.
///
/// A broadcast fans out to every visitor back to back and the owner chat can
/// receive bursts of relays; spacing the calls keeps the bot under the
/// platform's flood limits instead of collecting 429s.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    schedule: Mutex<Schedule>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            schedule: Mutex::new(Schedule::new(cfg, Instant::now())),
        }
    }

    async fn wait_turn(&self, chat: Option<ChatId>) {
        let start = self.schedule.lock().await.book(chat, Instant::now());
        sleep_until(start).await;
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        self.inner.send_text(chat_id, html, opts).await
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        self.inner.send_media(chat_id, media, caption, opts).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // Callback answers are not addressed to a chat.
        self.wait_turn(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}
