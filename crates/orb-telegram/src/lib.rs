//! Telegram adapter (teloxide).
//!
//! Implements the `orb-core` MessagingPort over the Telegram Bot API and turns
//! incoming updates into core events.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod decode;
pub mod handlers;
pub mod router;

use orb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, Media, MediaKind, MessagingCapabilities, SendOptions},
    },
    Result,
};

/// Applies caption, reply target and keyboard to any send-media request.
macro_rules! media_request {
    ($req:expr, $caption:expr, $opts:expr) => {{
        let mut req = $req.parse_mode(ParseMode::Html);
        if let Some(c) = $caption {
            req = req.caption(c.to_string());
        }
        if let Some(r) = $opts.reply_to {
            req = req
                .reply_to_message_id(Self::tg_msg_id(r.message_id))
                .allow_sending_without_reply(true);
        }
        if let Some(kb) = &$opts.keyboard {
            req = req.reply_markup(Self::markup(kb));
        }
        req
    }};
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .iter()
            .map(|b| {
                vec![InlineKeyboardButton::callback(
                    b.label.clone(),
                    b.callback_data.clone(),
                )]
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::debug!(wait = ?d, "telegram asked to retry later");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    fn sent_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: true,
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
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html);
                if let Some(r) = opts.reply_to {
                    req = req
                        .reply_to_message_id(Self::tg_msg_id(r.message_id))
                        .allow_sending_without_reply(true);
                }
                if let Some(kb) = &opts.keyboard {
                    req = req.reply_markup(Self::markup(kb));
                }
                req
            })
            .await?;

        Ok(Self::sent_ref(chat_id, &msg))
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let chat = Self::tg_chat(chat_id);
        let file = InputFile::file_id(media.file_id.clone());

        let msg = match media.kind {
            MediaKind::Photo => {
                self.with_retry(|| {
                    media_request!(self.bot.send_photo(chat, file.clone()), caption, opts)
                })
                .await?
            }
            MediaKind::Video => {
                self.with_retry(|| {
                    media_request!(self.bot.send_video(chat, file.clone()), caption, opts)
                })
                .await?
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    media_request!(self.bot.send_document(chat, file.clone()), caption, opts)
                })
                .await?
            }
            MediaKind::Audio => {
                self.with_retry(|| {
                    media_request!(self.bot.send_audio(chat, file.clone()), caption, opts)
                })
                .await?
            }
        };

        Ok(Self::sent_ref(chat_id, &msg))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
