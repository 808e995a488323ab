use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{Media, MessagingCapabilities, SendOptions},
    Result,
};

/// Outbound messenger port.
///
/// The relay core only needs these primitives, so the engine can be driven by
/// a fake in tests. Text and captions are HTML; callers escape user content.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, html: &str, opts: SendOptions)
        -> Result<MessageRef>;

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
