use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Media, MessagingCapabilities, SendOptions},
    },
    Result,
};

/// MessagingPort decorator that bounds every call with a deadline.
///
/// An elapsed deadline surfaces as [`Error::Timeout`], which the relay engine
/// handles like any other failed send.
pub struct DeadlineMessenger {
    inner: Arc<dyn MessagingPort>,
    limit: Duration,
}

impl DeadlineMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.limit)),
        }
    }
}

#[async_trait]
impl MessagingPort for DeadlineMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.bounded(self.inner.send_text(chat_id, html, opts)).await
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.bounded(self.inner.send_media(chat_id, media, caption, opts))
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.bounded(self.inner.answer_callback_query(callback_id, text))
            .await
    }
}
