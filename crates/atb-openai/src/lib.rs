//! OpenAI adapter: Assistants v2 threads/runs plus chat-completions vision.

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use atb_core::{
    config::Config,
    conversation::{
        client::ConversationPort,
        types::{Message, Role, Run, SeedMessage},
    },
    domain::{RunId, ThreadId},
    errors::Error,
    Result,
};

use wire::{
    ChatCompletionRequest, ChatCompletionResponse, ChatContentPart, ChatImageUrl, ChatMessage,
    CreateRunRequest, CreateThreadRequest, MessageInput, MessageList, ObjectId, RunObject,
};

pub const VISION_PROMPT: &str = "Hi there Emma, could you please describe this image?";

const ASSISTANTS_BETA: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub vision_model: String,
    pub timeout: Duration,
}

impl From<&Config> for OpenAiConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            api_key: cfg.openai_api_key.clone(),
            base_url: cfg.openai_base_url.clone(),
            vision_model: cfg.vision_model.clone(),
            timeout: cfg.http_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    cfg: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build openai http client: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn assistants(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.cfg.api_key)
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("{what}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, what, &body));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("{what}: invalid response body: {e}")))
    }
}

fn status_error(status: StatusCode, what: &str, body: &str) -> Error {
    let snippet: String = mask_bot_tokens(body)
        .chars()
        .take(ERROR_SNIPPET_CHARS)
        .collect();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::BackendUnavailable(format!("{what}: {status} {snippet}"))
    } else {
        Error::BackendRejected {
            status: status.as_u16(),
            message: format!("{what}: {snippet}"),
        }
    }
}

/// Hide the token in Telegram file URLs (`/bot<id>:<secret>/`) that error bodies echo back.
fn mask_bot_tokens(text: &str) -> String {
    const MARKER: &str = "/bot";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(MARKER) {
        let (head, tail) = rest.split_at(pos + MARKER.len());
        out.push_str(head);
        let end = tail
            .find(|c: char| matches!(c, '/' | '\\' | '"' | '\'') || c.is_whitespace())
            .unwrap_or(tail.len());
        let segment = &tail[..end];
        if segment.contains(':') {
            out.push_str("<redacted>");
        } else {
            out.push_str(segment);
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl ConversationPort for OpenAiClient {
    async fn create_thread(&self, seed: Vec<SeedMessage>) -> Result<ThreadId> {
        let body = CreateThreadRequest {
            messages: seed.iter().map(MessageInput::from).collect(),
        };
        let req = self.assistants(self.http.post(self.url("threads"))).json(&body);
        let thread: ObjectId = self.send_json(req, "create thread").await?;
        debug!(thread_id = %thread.id, "openai thread created");
        Ok(ThreadId(thread.id))
    }

    async fn post_message(&self, thread_id: &ThreadId, role: Role, text: &str) -> Result<()> {
        let body = MessageInput {
            role: role.as_str(),
            content: text,
        };
        let req = self
            .assistants(
                self.http
                    .post(self.url(&format!("threads/{thread_id}/messages"))),
            )
            .json(&body);
        let _: ObjectId = self.send_json(req, "post message").await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &ThreadId, assistant_id: &str) -> Result<Run> {
        let body = CreateRunRequest { assistant_id };
        let req = self
            .assistants(self.http.post(self.url(&format!("threads/{thread_id}/runs"))))
            .json(&body);
        let run: RunObject = self.send_json(req, "create run").await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run> {
        let req = self.assistants(
            self.http
                .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
        );
        let run: RunObject = self.send_json(req, "retrieve run").await?;
        Ok(run.into())
    }

    async fn latest_message(
        &self,
        thread_id: &ThreadId,
        run_id: Option<&RunId>,
    ) -> Result<Option<Message>> {
        let mut query: Vec<(&str, &str)> = vec![("order", "desc"), ("limit", "1")];
        if let Some(run_id) = run_id {
            query.push(("run_id", run_id.0.as_str()));
        }
        let req = self
            .assistants(
                self.http
                    .get(self.url(&format!("threads/{thread_id}/messages"))),
            )
            .query(&query);
        let list: MessageList = self.send_json(req, "list messages").await?;
        Ok(list.data.into_iter().next().map(Message::from))
    }

    async fn describe_image(&self, image_url: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.cfg.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContentPart::Text {
                        text: VISION_PROMPT,
                    },
                    ChatContentPart::ImageUrl {
                        image_url: ChatImageUrl { url: image_url },
                    },
                ],
            }],
        };
        let req = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.cfg.api_key)
            .json(&body);
        let resp: ChatCompletionResponse = self.send_json(req, "describe image").await?;
        resp.first_text().ok_or_else(|| {
            Error::BackendUnavailable("describe image: response has no message content".to_string())
        })
    }
}
