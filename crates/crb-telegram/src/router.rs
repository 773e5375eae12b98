use std::sync::Arc;

use teloxide::{
    dispatching::{Dispatcher, UpdateHandler},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
};
use tracing::{info, warn};

use crb_core::{
    config::{Config, UpdateMode},
    forwarder::{Disposition, Forwarder},
    messaging::port::RelayPort,
    store::MappingStore,
};

use crate::{convert::inbound_from_message, webhook, TelegramRelay};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<MappingStore>,
    pub forwarder: Arc<Forwarder>,
}

/// Private messages arrive as `message` updates, channel posts as `channel_post`.
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_channel_post().endpoint(handle_message))
}

async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let inbound = inbound_from_message(&msg);
    let chat_id = inbound.chat_id.0;
    match state.forwarder.handle(inbound).await {
        Disposition::Failed(reason) => warn!(chat_id, %reason, "message not relayed"),
        other => tracing::debug!(chat_id, disposition = ?other, "message handled"),
    }
    // Failures are reported to the user by the forwarder; never fail the dispatcher.
    Ok(())
}

/// Run the bot until Ctrl-C. The store must already be initialized.
pub async fn run(cfg: Arc<Config>, store: Arc<MappingStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "bot started");
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!(error = %e, "getMe failed; continuing");
            None
        }
    };
    info!(
        channel = %cfg.channel,
        mapping_file = %store.path().display(),
        mappings = store.count().await,
        "relay configured"
    );

    let port: Arc<dyn RelayPort> = Arc::new(TelegramRelay::new(bot.clone()));
    let mut forwarder = Forwarder::new(store.clone(), port, cfg.channel.clone(), cfg.send_timeout);
    if let Some(name) = bot_username {
        forwarder = forwarder.with_bot_username(name);
    }
    let forwarder = Arc::new(forwarder);
    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store,
        forwarder,
    });

    match &cfg.mode {
        UpdateMode::Webhook { url } => webhook::serve(bot, url.clone(), state).await,
        UpdateMode::Polling => run_polling(bot, state).await,
    }
}

async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("starting in long-polling mode");
    // A leftover webhook would block getUpdates.
    bot.delete_webhook().drop_pending_updates(true).await?;

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("polling stopped");
    Ok(())
}

pub(crate) fn error_handler() -> Arc<LoggingErrorHandler> {
    LoggingErrorHandler::with_custom_text("an error from the update listener")
}
