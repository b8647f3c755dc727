use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use atb_core::{
    config::Config,
    greeting::GreetingPicker,
    relay::{MessageRelay, RelaySettings},
};
use atb_openai::{OpenAiClient, OpenAiConfig};
use atb_telegram::TelegramMessenger;

mod health;

#[tokio::main]
async fn main() -> Result<(), atb_core::Error> {
    atb_core::logging::init("atb")?;

    let cfg = Config::load()?;

    let wait = cfg.run_wait;
    if wait.deadline_binds() {
        warn!(
            timeout_ms = wait.timeout.as_millis() as u64,
            poll_budget_ms = wait.poll_budget().as_millis() as u64,
            "run poll cap outlasts the run deadline; the deadline will end waits"
        );
    }

    let conversation = Arc::new(OpenAiClient::new(OpenAiConfig::from(&cfg))?);
    let messenger = Arc::new(TelegramMessenger::from_token(cfg.telegram_token.clone()));
    let bot = messenger.bot();

    let relay = Arc::new(MessageRelay::new(
        conversation,
        messenger,
        GreetingPicker::default(),
        RelaySettings {
            assistant_id: cfg.assistant_id.clone(),
            wait,
            message_limit: cfg.telegram_message_limit,
        },
    ));

    let shutdown = CancellationToken::new();
    let health = match cfg.health_port {
        Some(port) => {
            let listener = health::bind(port)
                .await
                .map_err(|e| atb_core::Error::Config(e.to_string()))?;
            Some(tokio::spawn(health::serve(listener, shutdown.clone())))
        }
        None => {
            info!("PORT not set; health endpoint disabled");
            None
        }
    };

    let bot_stop = shutdown.clone();
    let result = atb_telegram::router::run_polling(bot, relay, async move {
        bot_stop.cancelled().await
    })
    .await;
    shutdown.cancel();

    if let Some(handle) = health {
        match handle.await {
            Ok(Err(e)) => warn!("health endpoint: {e:#}"),
            Err(e) => warn!("health endpoint task: {e}"),
            Ok(Ok(())) => {}
        }
    }

    result.map_err(|e| atb_core::Error::External(format!("telegram bot failed: {e}")))?;
    info!("shutdown complete");
    Ok(())
}
