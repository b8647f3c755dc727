use crate::domain::{ChatId, ChatKind};

/// Inbound chat message, already stripped of Telegram-specific types.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    /// Sender's first name; used to seed new threads.
    pub sender_name: String,
    pub content: InboundContent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    /// Largest available size of a photo.
    Photo { file_id: String },
    /// Stickers, voice, documents, service messages...
    Unsupported,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_chat_actions: bool,
    pub max_message_len: usize,
}
