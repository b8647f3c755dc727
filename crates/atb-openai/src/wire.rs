//! JSON shapes for the Assistants v2 and chat completions endpoints.
//!
//! Only the fields the bot reads are modelled; everything else is ignored.

use atb_core::{
    conversation::types::{ContentPart, Message, Role, Run, RunStatus, SeedMessage},
    domain::{RunId, ThreadId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct CreateThreadRequest<'a> {
    pub messages: Vec<MessageInput<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageInput<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a SeedMessage> for MessageInput<'a> {
    fn from(seed: &'a SeedMessage) -> Self {
        Self {
            role: seed.role.as_str(),
            content: &seed.text,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunObject {
    pub id: String,
    pub thread_id: String,
    pub status: String,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        Run {
            id: RunId(run.id),
            thread_id: ThreadId(run.thread_id),
            status: RunStatus::parse(&run.status),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default)]
    pub data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageObject {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentObject>,
}

impl From<MessageObject> for Message {
    fn from(msg: MessageObject) -> Self {
        Message {
            id: msg.id,
            role: if msg.role == "user" {
                Role::User
            } else {
                Role::Assistant
            },
            run_id: msg.run_id.map(RunId),
            content: msg.content.into_iter().map(ContentPart::from).collect(),
        }
    }
}

/// One content block. Kept flat so unknown `type`s survive decoding.
#[derive(Debug, Deserialize)]
pub(crate) struct ContentObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextObject>,
    #[serde(default)]
    pub image_file: Option<ImageFileObject>,
    #[serde(default)]
    pub image_url: Option<ImageUrlObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextObject {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageFileObject {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageUrlObject {
    pub url: String,
}

impl From<ContentObject> for ContentPart {
    fn from(c: ContentObject) -> Self {
        match (c.kind.as_str(), c.text, c.image_file, c.image_url) {
            ("text", Some(text), _, _) => ContentPart::Text(text.value),
            ("image_file", _, Some(f), _) => ContentPart::ImageFile { file_id: f.file_id },
            ("image_url", _, _, Some(u)) => ContentPart::ImageUrl { url: u.url },
            _ => ContentPart::Other(c.kind),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ChatContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ChatContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ChatImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatImageUrl<'a> {
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    /// A plain string, or an array of `{type: "text", text}` parts.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

impl ChatCompletionResponse {
    /// Text of the first choice; array content is joined with newlines.
    pub fn first_text(&self) -> Option<String> {
        let content = self.choices.first()?.message.content.as_ref()?;
        match content {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|p| {
                        let text = p.get("text")?;
                        // `text` is a string, or `{value}` in the assistants shape
                        text.as_str()
                            .or_else(|| text.get("value").and_then(|v| v.as_str()))
                    })
                    .collect();
                Some(texts.join("\n"))
            }
            _ => None,
        }
    }
}
