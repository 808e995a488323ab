//! In-memory fakes shared by the unit tests.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Media, MessagingCapabilities, SendOptions},
    },
    state::RelayState,
    store::StateStore,
    Result,
};

static STATE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh state backed by a unique file under /tmp.
pub fn tmp_state() -> Arc<RelayState> {
    let n = STATE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = PathBuf::from(format!(
        "/tmp/orb-test-state-{}-{n}.json",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    Arc::new(RelayState::open(StateStore::new(path)))
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub chat_id: ChatId,
    pub html: String,
    pub media: Option<Media>,
    pub opts: SendOptions,
    pub result: Option<MessageRef>,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<ChatId>>,
    callbacks: Mutex<Vec<(String, Option<String>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
    no_keyboards: bool,
}

impl FakeMessenger {
    /// A messenger that reports no inline keyboard support.
    pub fn without_keyboards() -> Self {
        Self {
            no_keyboards: true,
            ..Self::default()
        }
    }

    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    /// Hold any send whose text contains `needle` for `delay` before it lands.
    pub fn delay_text(&self, needle: &str, delay: Duration) {
        self.delays.lock().unwrap().push((needle.to_string(), delay));
    }

    async fn stall(&self, html: &str) {
        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| html.contains(needle.as_str()))
            .map(|(_, d)| *d);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(1000 + *guard),
        }
    }

    fn record(
        &self,
        chat_id: ChatId,
        html: &str,
        media: Option<Media>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let failing = self.failing.lock().unwrap().contains(&chat_id);
        let result = (!failing).then(|| self.alloc(chat_id));
        self.sends.lock().unwrap().push(Sent {
            chat_id,
            html: html.to_string(),
            media,
            opts,
            result,
        });
        result.ok_or_else(|| Error::Transport("Forbidden: bot was blocked by the user".into()))
    }

    /// Every chat a send was attempted to, failed attempts included.
    pub fn attempted_chats(&self) -> Vec<ChatId> {
        self.sends.lock().unwrap().iter().map(|s| s.chat_id).collect()
    }

    /// Successful sends into `chat_id`, oldest first.
    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Sent> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.chat_id == chat_id && s.result.is_some())
            .cloned()
            .collect()
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id).into_iter().map(|s| s.html).collect()
    }

    pub fn callback_answers(&self) -> Vec<(String, Option<String>)> {
        self.callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: !self.no_keyboards,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.stall(html).await;
        self.record(chat_id, html, None, opts)
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let caption = caption.unwrap_or_default();
        self.stall(caption).await;
        self.record(chat_id, caption, Some(media.clone()), opts)
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.callbacks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}
