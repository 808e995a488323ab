use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};

use orb_core::{
    config::Config,
    messaging::{deadline::DeadlineMessenger, port::MessagingPort, throttled::ThrottledMessenger},
    relay::RelayEngine,
    state::RelayState,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
}

fn bot_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Start the bot (the first user becomes its owner)"),
        BotCommand::new("help", "How this bot works"),
        BotCommand::new("broadcast", "Owner: send a message to every visitor"),
        BotCommand::new("stats", "Owner: relay summary"),
    ]
}

/// Run the long-polling dispatcher until Ctrl-C.
///
/// The caller owns `state` and is expected to flush it once this returns.
pub async fn run_polling(cfg: Arc<Config>, state: Arc<RelayState>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "orb started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    match state.owner().await {
        Some(owner) => tracing::info!(owner = owner.id.0, "owner already claimed"),
        None => tracing::info!("no owner yet; the first /start claims the bot"),
    }
    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        tracing::warn!(error = %e, "failed to register bot commands");
    }

    // Deadline sits closest to the wire so queueing in the throttle does not
    // eat into a call's timeout. 429s are still retried once in the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let bounded: Arc<dyn MessagingPort> =
        Arc::new(DeadlineMessenger::new(raw_messenger, cfg.send_timeout));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(bounded, cfg.throttle));

    let engine = RelayEngine::new(state, messenger)
        .with_visitor_acks(cfg.acknowledge_visitors)
        .with_broadcast_pacing(cfg.broadcast_pacing);
    let app = Arc::new(AppState {
        engine: Arc::new(engine),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}
