use std::{future::Future, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use atb_core::relay::MessageRelay;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<MessageRelay>,
}

/// Long-poll Telegram until Ctrl-C or `shutdown` resolves.
///
/// Updates from one chat are handled in order; different chats run concurrently.
pub async fn run_polling(
    bot: Bot,
    relay: Arc<MessageRelay>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telegram bot started"),
        Err(e) => warn!("telegram get_me failed: {e}"),
    }

    let state = Arc::new(AppState { relay });

    let handler = Update::filter_message().endpoint(handlers::handle_message);

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.await;
        // Err means the dispatcher is idle or already stopping.
        if let Ok(stopped) = token.shutdown() {
            stopped.await;
        }
    });

    dispatcher.dispatch().await;
    info!("telegram dispatcher stopped");
    Ok(())
}
