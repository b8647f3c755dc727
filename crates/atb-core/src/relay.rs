use std::sync::Arc;

use tracing::{debug, info, warn, Instrument};

use crate::{
    conversation::{
        client::ConversationPort,
        types::{Message, Role, RunStatus},
    },
    domain::{ChatId, ThreadId},
    formatting::split_message,
    greeting::{GreetingPicker, HELP_TEXT},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InboundContent, InboundMessage},
    },
    registry::ThreadRegistry,
    run_waiter::{wait_for, WaitPolicy},
    Result,
};

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub assistant_id: String,
    pub wait: WaitPolicy,
    pub message_limit: usize,
}

/// Why a message produced no reply although nothing failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Group, supergroup or channel; only private chats are answered.
    NotPrivate,
    NoContent,
    /// The backend answered without any text.
    EmptyReply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Replied { chunks: usize },
    Skipped(SkipReason),
}

/// Inbound chat message → backend run → outbound reply.
pub struct MessageRelay {
    conversation: Arc<dyn ConversationPort>,
    messenger: Arc<dyn MessagingPort>,
    registry: ThreadRegistry,
    greetings: GreetingPicker,
    settings: RelaySettings,
}

impl MessageRelay {
    pub fn new(
        conversation: Arc<dyn ConversationPort>,
        messenger: Arc<dyn MessagingPort>,
        greetings: GreetingPicker,
        settings: RelaySettings,
    ) -> Self {
        Self {
            registry: ThreadRegistry::new(conversation.clone(), greetings.clone()),
            conversation,
            messenger,
            greetings,
            settings,
        }
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    /// Handle one inbound message. Errors are returned, never sent to the user.
    pub async fn handle_message(&self, msg: InboundMessage) -> Result<RelayOutcome> {
        let span = tracing::info_span!("relay", chat_id = msg.chat_id.0);
        async move {
            if !msg.chat_kind.is_private() {
                debug!(kind = ?msg.chat_kind, "ignoring non-private chat");
                return Ok(RelayOutcome::Skipped(SkipReason::NotPrivate));
            }

            match &msg.content {
                InboundContent::Text(text) if !text.trim().is_empty() => {
                    self.relay_text(msg.chat_id, &msg.sender_name, text).await
                }
                InboundContent::Photo { file_id } => {
                    self.describe_photo(msg.chat_id, file_id).await
                }
                _ => Ok(RelayOutcome::Skipped(SkipReason::NoContent)),
            }
        }
        .instrument(span)
        .await
    }

    /// `/start`: greet, then begin a fresh thread seeded with that greeting.
    ///
    /// The thread is reset even when the greeting could not be delivered.
    pub async fn start(&self, chat_id: ChatId, display_name: &str) -> Result<RelayOutcome> {
        let greeting = self.greetings.pick().to_string();
        let sent = self.messenger.send_text(chat_id, &greeting).await;
        if let Err(e) = &sent {
            warn!(chat_id = chat_id.0, "failed to send greeting: {e}");
        }

        self.registry.reset(chat_id, display_name, &greeting).await?;
        sent?;
        Ok(RelayOutcome::Replied { chunks: 1 })
    }

    /// `/help`
    pub async fn help(&self, chat_id: ChatId) -> Result<RelayOutcome> {
        self.messenger.send_text(chat_id, HELP_TEXT).await?;
        Ok(RelayOutcome::Replied { chunks: 1 })
    }

    async fn relay_text(
        &self,
        chat_id: ChatId,
        sender_name: &str,
        text: &str,
    ) -> Result<RelayOutcome> {
        self.typing(chat_id).await;

        let thread_id = self.registry.get_or_create(chat_id, sender_name).await?;
        self.conversation
            .post_message(&thread_id, Role::User, text)
            .await?;

        match self.run_and_fetch_reply(&thread_id).await? {
            Some(reply) => self.deliver(chat_id, &reply.text()).await,
            None => {
                warn!(thread_id = %thread_id, "run completed without a message");
                Ok(RelayOutcome::Skipped(SkipReason::EmptyReply))
            }
        }
    }

    /// Start a run on `thread_id` and return the message it produced.
    ///
    /// A run that is already completed when created skips polling entirely.
    pub async fn run_and_fetch_reply(&self, thread_id: &ThreadId) -> Result<Option<Message>> {
        let run = self
            .conversation
            .start_run(thread_id, &self.settings.assistant_id)
            .await?;
        debug!(run_id = %run.id, status = run.status.as_str(), "run started");

        let conversation = &self.conversation;
        let run_id = &run.id;
        if run.status == RunStatus::Completed {
            return conversation.latest_message(thread_id, Some(run_id)).await;
        }

        wait_for(
            move || async move {
                conversation
                    .get_run(thread_id, run_id)
                    .await
                    .map(|polled| polled.status.readiness())
            },
            move || conversation.latest_message(thread_id, Some(run_id)),
            self.settings.wait,
        )
        .await
    }

    async fn describe_photo(&self, chat_id: ChatId, file_id: &str) -> Result<RelayOutcome> {
        self.typing(chat_id).await;

        // The URL embeds the bot token; keep it out of logs.
        let url = self.messenger.file_url(file_id).await?;
        let description = self.conversation.describe_image(&url).await?;
        self.deliver(chat_id, &description).await
    }

    async fn deliver(&self, chat_id: ChatId, text: &str) -> Result<RelayOutcome> {
        if text.trim().is_empty() {
            return Ok(RelayOutcome::Skipped(SkipReason::EmptyReply));
        }

        let limit = self
            .settings
            .message_limit
            .min(self.messenger.capabilities().max_message_len);
        let chunks = split_message(text, limit);
        for chunk in &chunks {
            self.messenger.send_text(chat_id, chunk).await?;
        }

        info!(chunks = chunks.len(), chars = text.chars().count(), "reply sent");
        Ok(RelayOutcome::Replied {
            chunks: chunks.len(),
        })
    }

    async fn typing(&self, chat_id: ChatId) {
        if !self.messenger.capabilities().supports_chat_actions {
            return;
        }
        if let Err(e) = self
            .messenger
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            debug!("typing indicator failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::types::{ContentPart, Run, SeedMessage};
    use crate::domain::{ChatKind, MessageId, MessageRef, RunId};
    use crate::errors::Error;
    use crate::messaging::types::MessagingCapabilities;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        CreateThread(Vec<SeedMessage>),
        Post(ThreadId, Role, String),
        StartRun(ThreadId, String),
        GetRun(RunId),
        Latest(ThreadId, Option<RunId>),
        Describe(String),
    }

    struct FakeConversation {
        calls: Mutex<Vec<Call>>,
        start_status: RunStatus,
        /// Popped per poll; the last status repeats.
        poll_statuses: Mutex<VecDeque<RunStatus>>,
        reply: Option<Vec<ContentPart>>,
        fail_post: bool,
    }

    impl FakeConversation {
        fn new(start_status: RunStatus, reply: Option<Vec<ContentPart>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                start_status,
                poll_statuses: Mutex::new(VecDeque::new()),
                reply,
                fail_post: false,
            }
        }

        fn completed_with(text: &str) -> Self {
            Self::new(
                RunStatus::Completed,
                Some(vec![ContentPart::Text(text.to_string())]),
            )
        }

        fn polling(statuses: Vec<RunStatus>, text: &str) -> Self {
            let fake = Self::new(
                RunStatus::Queued,
                Some(vec![ContentPart::Text(text.to_string())]),
            );
            *fake.poll_statuses.lock().unwrap() = statuses.into();
            fake
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }
    }

    #[async_trait]
    impl ConversationPort for FakeConversation {
        async fn create_thread(&self, seed: Vec<SeedMessage>) -> Result<ThreadId> {
            self.record(Call::CreateThread(seed));
            let n = self.count(|c| matches!(c, Call::CreateThread(_)));
            Ok(ThreadId(format!("T{n}")))
        }

        async fn post_message(&self, thread_id: &ThreadId, role: Role, text: &str) -> Result<()> {
            self.record(Call::Post(thread_id.clone(), role, text.to_string()));
            if self.fail_post {
                return Err(Error::BackendRejected {
                    status: 400,
                    message: "bad".to_string(),
                });
            }
            Ok(())
        }

        async fn start_run(&self, thread_id: &ThreadId, assistant_id: &str) -> Result<Run> {
            self.record(Call::StartRun(thread_id.clone(), assistant_id.to_string()));
            Ok(Run {
                id: RunId("run_1".to_string()),
                thread_id: thread_id.clone(),
                status: self.start_status.clone(),
            })
        }

        async fn get_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run> {
            self.record(Call::GetRun(run_id.clone()));
            let mut statuses = self.poll_statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap_or(RunStatus::InProgress)
            };
            Ok(Run {
                id: run_id.clone(),
                thread_id: thread_id.clone(),
                status,
            })
        }

        async fn latest_message(
            &self,
            thread_id: &ThreadId,
            run_id: Option<&RunId>,
        ) -> Result<Option<Message>> {
            self.record(Call::Latest(thread_id.clone(), run_id.cloned()));
            Ok(self.reply.clone().map(|content| Message {
                id: "msg_1".to_string(),
                role: Role::Assistant,
                run_id: run_id.cloned(),
                content,
            }))
        }

        async fn describe_image(&self, image_url: &str) -> Result<String> {
            self.record(Call::Describe(image_url.to_string()));
            Ok("a cat on a sofa".to_string())
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        sends: Mutex<Vec<(ChatId, String)>>,
        typing: Mutex<usize>,
        fail_send: bool,
    }

    impl FakeMessenger {
        fn sent(&self) -> Vec<(ChatId, String)> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_chat_actions: true,
                max_message_len: 4096,
            }
        }

        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
            if self.fail_send {
                return Err(Error::TransportSendFailed("blocked by user".to_string()));
            }
            let mut sends = self.sends.lock().unwrap();
            sends.push((chat_id, text.to_string()));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(sends.len() as i32),
            })
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            *self.typing.lock().unwrap() += 1;
            Ok(())
        }

        async fn file_url(&self, file_id: &str) -> Result<String> {
            Ok(format!("https://files.test/{file_id}"))
        }
    }

    fn relay(conv: Arc<FakeConversation>, messenger: Arc<FakeMessenger>) -> MessageRelay {
        relay_with_limit(conv, messenger, 4096)
    }

    fn relay_with_limit(
        conv: Arc<FakeConversation>,
        messenger: Arc<FakeMessenger>,
        message_limit: usize,
    ) -> MessageRelay {
        MessageRelay::new(
            conv,
            messenger,
            GreetingPicker::new(vec!["hey, I'm Emma".to_string()]),
            RelaySettings {
                assistant_id: "asst_1".to_string(),
                wait: WaitPolicy::default(),
                message_limit,
            },
        )
    }

    fn text_from(chat: i64, kind: ChatKind, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(chat),
            chat_kind: kind,
            sender_name: "Ada".to_string(),
            content: InboundContent::Text(text.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_message_creates_thread_and_uses_completed_fast_path() {
        let conv = Arc::new(FakeConversation::completed_with("hi Ada!"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());
        let started = Instant::now();

        let out = relay
            .handle_message(text_from(42, ChatKind::Private, "hello"))
            .await
            .unwrap();

        let t1 = ThreadId("T1".to_string());
        let run = RunId("run_1".to_string());
        assert_eq!(out, RelayOutcome::Replied { chunks: 1 });
        assert_eq!(relay.registry().get(ChatId(42)).await, Some(t1.clone()));
        assert_eq!(
            conv.calls()[1..],
            [
                Call::Post(t1.clone(), Role::User, "hello".to_string()),
                Call::StartRun(t1.clone(), "asst_1".to_string()),
                Call::Latest(t1, Some(run)),
            ]
        );
        assert_eq!(conv.count(|c| matches!(c, Call::GetRun(_))), 0);
        assert_eq!(messenger.sent(), vec![(ChatId(42), "hi Ada!".to_string())]);
        assert_eq!(*messenger.typing.lock().unwrap(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn group_messages_touch_nothing() {
        let conv = Arc::new(FakeConversation::completed_with("x"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        for kind in [ChatKind::Group, ChatKind::Supergroup, ChatKind::Channel] {
            let out = relay
                .handle_message(text_from(-100, kind, "hello all"))
                .await
                .unwrap();
            assert_eq!(out, RelayOutcome::Skipped(SkipReason::NotPrivate));
        }

        assert!(conv.calls().is_empty());
        assert!(messenger.sent().is_empty());
        assert_eq!(*messenger.typing.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_and_unsupported_messages_are_skipped() {
        let conv = Arc::new(FakeConversation::completed_with("x"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        let blank = relay
            .handle_message(text_from(1, ChatKind::Private, "   "))
            .await
            .unwrap();
        let mut sticker = text_from(1, ChatKind::Private, "");
        sticker.content = InboundContent::Unsupported;
        let sticker = relay.handle_message(sticker).await.unwrap();

        assert_eq!(blank, RelayOutcome::Skipped(SkipReason::NoContent));
        assert_eq!(sticker, RelayOutcome::Skipped(SkipReason::NoContent));
        assert!(conv.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_run_is_polled_until_completed() {
        let conv = Arc::new(FakeConversation::polling(
            vec![RunStatus::InProgress, RunStatus::Completed],
            "done thinking",
        ));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());
        let started = Instant::now();

        let out = relay
            .handle_message(text_from(3, ChatKind::Private, "question"))
            .await
            .unwrap();

        assert_eq!(out, RelayOutcome::Replied { chunks: 1 });
        assert_eq!(conv.count(|c| matches!(c, Call::GetRun(_))), 2);
        assert_eq!(messenger.sent()[0].1, "done thinking");
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_sends_nothing() {
        let conv = Arc::new(FakeConversation::polling(
            vec![RunStatus::InProgress, RunStatus::Failed],
            "never",
        ));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        let err = relay
            .handle_message(text_from(3, ChatKind::Private, "question"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RunFailed { ref status } if status == "failed"));
        assert_eq!(conv.count(|c| matches!(c, Call::Latest(..))), 0);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_run_times_out_without_reply() {
        let conv = Arc::new(FakeConversation::polling(vec![RunStatus::Queued], "never"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        let err = relay
            .handle_message(text_from(3, ChatKind::Private, "question"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn backend_rejection_is_returned_not_sent() {
        let mut fake = FakeConversation::completed_with("x");
        fake.fail_post = true;
        let conv = Arc::new(fake);
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        let err = relay
            .handle_message(text_from(8, ChatKind::Private, "hi"))
            .await
            .unwrap_err();

        assert!(err.is_backend());
        assert_eq!(conv.count(|c| matches!(c, Call::StartRun(..))), 0);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn second_message_reuses_the_thread() {
        let conv = Arc::new(FakeConversation::completed_with("ok"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        relay
            .handle_message(text_from(4, ChatKind::Private, "one"))
            .await
            .unwrap();
        relay
            .handle_message(text_from(4, ChatKind::Private, "two"))
            .await
            .unwrap();

        assert_eq!(conv.count(|c| matches!(c, Call::CreateThread(_))), 1);
        assert_eq!(
            conv.count(|c| matches!(c, Call::Post(t, _, _) if t.0 == "T1")),
            2
        );
    }

    #[tokio::test]
    async fn reply_joins_text_parts_and_skips_images() {
        let conv = Arc::new(FakeConversation::new(
            RunStatus::Completed,
            Some(vec![
                ContentPart::Text("A".to_string()),
                ContentPart::ImageFile {
                    file_id: "file-1".to_string(),
                },
                ContentPart::Text("B".to_string()),
            ]),
        ));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv, messenger.clone());

        relay
            .handle_message(text_from(5, ChatKind::Private, "draw"))
            .await
            .unwrap();

        assert_eq!(messenger.sent(), vec![(ChatId(5), "A\nB".to_string())]);
    }

    #[tokio::test]
    async fn image_only_or_missing_reply_is_an_empty_reply() {
        let image_only = Arc::new(FakeConversation::new(
            RunStatus::Completed,
            Some(vec![ContentPart::ImageFile {
                file_id: "file-1".to_string(),
            }]),
        ));
        let missing = Arc::new(FakeConversation::new(RunStatus::Completed, None));

        for conv in [image_only, missing] {
            let messenger = Arc::new(FakeMessenger::default());
            let relay = relay(conv, messenger.clone());
            let out = relay
                .handle_message(text_from(5, ChatKind::Private, "draw"))
                .await
                .unwrap();
            assert_eq!(out, RelayOutcome::Skipped(SkipReason::EmptyReply));
            assert!(messenger.sent().is_empty());
        }
    }

    #[tokio::test]
    async fn long_replies_are_split() {
        let long = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let conv = Arc::new(FakeConversation::completed_with(&long));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay_with_limit(conv, messenger.clone(), 40);

        let out = relay
            .handle_message(text_from(6, ChatKind::Private, "essay please"))
            .await
            .unwrap();

        assert_eq!(out, RelayOutcome::Replied { chunks: 2 });
        let sent = messenger.sent();
        assert_eq!(sent[0].1, "a".repeat(30));
        assert_eq!(sent[1].1, "b".repeat(30));
    }

    #[tokio::test]
    async fn photo_goes_through_image_description() {
        let conv = Arc::new(FakeConversation::completed_with("unused"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        let out = relay
            .handle_message(InboundMessage {
                chat_id: ChatId(11),
                chat_kind: ChatKind::Private,
                sender_name: "Ada".to_string(),
                content: InboundContent::Photo {
                    file_id: "AgAD".to_string(),
                },
            })
            .await
            .unwrap();

        assert_eq!(out, RelayOutcome::Replied { chunks: 1 });
        assert_eq!(
            conv.calls(),
            vec![Call::Describe("https://files.test/AgAD".to_string())]
        );
        assert_eq!(
            messenger.sent(),
            vec![(ChatId(11), "a cat on a sofa".to_string())]
        );
        assert!(relay.registry().is_empty().await);
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let conv = Arc::new(FakeConversation::completed_with("hi"));
        let messenger = Arc::new(FakeMessenger {
            fail_send: true,
            ..Default::default()
        });
        let relay = relay(conv, messenger);

        let err = relay
            .handle_message(text_from(12, ChatKind::Private, "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportSendFailed(_)));
    }

    #[tokio::test]
    async fn start_greets_and_resets_the_thread() {
        let conv = Arc::new(FakeConversation::completed_with("ok"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        relay
            .handle_message(text_from(13, ChatKind::Private, "before"))
            .await
            .unwrap();
        relay.start(ChatId(13), "Ada").await.unwrap();

        assert_eq!(relay.registry().get(ChatId(13)).await.unwrap().0, "T2");
        assert!(messenger
            .sent()
            .contains(&(ChatId(13), "hey, I'm Emma".to_string())));
        let Some(Call::CreateThread(seed)) = conv
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateThread(_)))
            .last()
        else {
            panic!("expected a second thread");
        };
        assert_eq!(
            seed,
            vec![
                SeedMessage::user("Hi, my name is Ada"),
                SeedMessage::assistant("hey, I'm Emma"),
            ]
        );
    }

    #[tokio::test]
    async fn start_resets_thread_even_if_greeting_fails() {
        let conv = Arc::new(FakeConversation::completed_with("ok"));
        let messenger = Arc::new(FakeMessenger {
            fail_send: true,
            ..Default::default()
        });
        let relay = relay(conv, messenger);

        let err = relay.start(ChatId(14), "Ada").await.unwrap_err();

        assert!(matches!(err, Error::TransportSendFailed(_)));
        assert!(relay.registry().get(ChatId(14)).await.is_some());
    }

    #[tokio::test]
    async fn help_sends_fixed_text() {
        let conv = Arc::new(FakeConversation::completed_with("ok"));
        let messenger = Arc::new(FakeMessenger::default());
        let relay = relay(conv.clone(), messenger.clone());

        relay.help(ChatId(15)).await.unwrap();

        assert_eq!(messenger.sent(), vec![(ChatId(15), HELP_TEXT.to_string())]);
        assert!(conv.calls().is_empty());
    }
}
