//! Teloxide endpoints: decode, hand to the relay engine, done.
//!
//! Nothing here returns an error to the dispatcher; the engine reports every
//! failure to the user it concerns.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::decode::{decode_callback, decode_message};
use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let outcome = state.engine.handle(decode_callback(&q)).await;
    tracing::debug!(?outcome, user = q.from.id.0, "callback handled");
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // The relay is a one-on-one bot; group traffic is ignored.
    if !msg.chat.is_private() {
        return Ok(());
    }

    let Some(event) = decode_message(&msg) else {
        tracing::debug!(chat = msg.chat.id.0, "message without sender ignored");
        return Ok(());
    };

    let outcome = state.engine.handle(event).await;
    tracing::debug!(?outcome, chat = msg.chat.id.0, "message handled");
    Ok(())
}
