use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::{
    conversation::{client::ConversationPort, types::SeedMessage},
    domain::{ChatId, ThreadId},
    greeting::GreetingPicker,
    Result,
};

/// Per-chat async locks, created on demand and kept for the process lifetime.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Chat → backend thread mapping.
///
/// In-memory only: entries are never evicted and are lost on restart.
/// Thread creation is serialized per chat, so concurrent first contacts from
/// one chat end up sharing a single thread.
pub struct ThreadRegistry {
    conversation: Arc<dyn ConversationPort>,
    greetings: GreetingPicker,
    threads: Mutex<HashMap<ChatId, ThreadId>>,
    creating: ChatLocks,
}

impl ThreadRegistry {
    pub fn new(conversation: Arc<dyn ConversationPort>, greetings: GreetingPicker) -> Self {
        Self {
            conversation,
            greetings,
            threads: Mutex::new(HashMap::new()),
            creating: ChatLocks::default(),
        }
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<ThreadId> {
        self.threads.lock().await.get(&chat_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.threads.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.lock().await.is_empty()
    }

    /// Return the chat's thread, creating (and seeding) it on first contact.
    pub async fn get_or_create(&self, chat_id: ChatId, display_name: &str) -> Result<ThreadId> {
        if let Some(id) = self.get(chat_id).await {
            return Ok(id);
        }

        let _guard = self.creating.lock_chat(chat_id).await;
        // Another task may have created it while we waited for the lock.
        if let Some(id) = self.get(chat_id).await {
            return Ok(id);
        }

        let greeting = self.greetings.pick().to_string();
        self.create_and_store(chat_id, display_name, &greeting).await
    }

    /// Start over with a fresh thread seeded with `greeting`, replacing any existing mapping.
    pub async fn reset(
        &self,
        chat_id: ChatId,
        display_name: &str,
        greeting: &str,
    ) -> Result<ThreadId> {
        let _guard = self.creating.lock_chat(chat_id).await;
        self.create_and_store(chat_id, display_name, greeting).await
    }

    async fn create_and_store(
        &self,
        chat_id: ChatId,
        display_name: &str,
        greeting: &str,
    ) -> Result<ThreadId> {
        let seed = vec![
            SeedMessage::user(format!("Hi, my name is {display_name}")),
            SeedMessage::assistant(greeting),
        ];
        let thread_id = self.conversation.create_thread(seed).await?;

        let previous = self
            .threads
            .lock()
            .await
            .insert(chat_id, thread_id.clone());
        info!(
            chat_id = chat_id.0,
            thread_id = %thread_id,
            replaced = previous.is_some(),
            "thread created"
        );
        Ok(thread_id)
    }
}
