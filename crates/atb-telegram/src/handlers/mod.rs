//! Telegram update handlers.
//!
//! Each handler converts the teloxide message into core types and hands it to
//! the relay. Failures are logged here and never surfaced to the chat.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Chat, Message},
};
use tracing::{debug, error};

use atb_core::{
    domain::{ChatId, ChatKind},
    messaging::types::{InboundContent, InboundMessage},
};

use crate::router::AppState;

mod commands;

use commands::{parse_command, Command};

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let sender_name = msg
        .from()
        .map(|u| u.first_name.clone())
        .unwrap_or_default();

    let result = match msg.text().and_then(parse_command) {
        Some(Command::Start) => {
            debug!(chat_id = chat_id.0, "received /start");
            state.relay.start(chat_id, &sender_name).await
        }
        Some(Command::Help) => {
            debug!(chat_id = chat_id.0, "received /help");
            state.relay.help(chat_id).await
        }
        None => state.relay.handle_message(to_inbound(&msg, sender_name)).await,
    };

    match result {
        Ok(outcome) => debug!(chat_id = chat_id.0, ?outcome, "message handled"),
        Err(e) => error!(chat_id = chat_id.0, "failed to handle message: {e}"),
    }

    // Handler errors are ours, not Telegram's; the dispatcher keeps going either way.
    Ok(())
}

fn to_inbound(msg: &Message, sender_name: String) -> InboundMessage {
    let content = if let Some(text) = msg.text() {
        InboundContent::Text(text.to_string())
    } else if let Some(photos) = msg.photo() {
        match photos.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height)) {
            Some(best) => InboundContent::Photo {
                file_id: best.file.id.clone(),
            },
            None => InboundContent::Unsupported,
        }
    } else {
        InboundContent::Unsupported
    };

    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        chat_kind: chat_kind(&msg.chat),
        sender_name,
        content,
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}
