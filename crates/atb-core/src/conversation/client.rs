use async_trait::async_trait;

use crate::{
    domain::{RunId, ThreadId},
    Result,
};

use super::types::{Message, Role, Run, SeedMessage};

/// Port over the external run-based conversation backend.
///
/// Every call may fail with `Error::BackendUnavailable` or
/// `Error::BackendRejected`; callers treat both as terminal for the current
/// message.
#[async_trait]
pub trait ConversationPort: Send + Sync {
    async fn create_thread(&self, seed: Vec<SeedMessage>) -> Result<ThreadId>;

    async fn post_message(&self, thread_id: &ThreadId, role: Role, text: &str) -> Result<()>;

    async fn start_run(&self, thread_id: &ThreadId, assistant_id: &str) -> Result<Run>;

    /// Re-query a run. The backend has no push notification.
    async fn get_run(&self, thread_id: &ThreadId, run_id: &RunId) -> Result<Run>;

    /// Most recent message on the thread, optionally restricted to one run.
    async fn latest_message(
        &self,
        thread_id: &ThreadId,
        run_id: Option<&RunId>,
    ) -> Result<Option<Message>>;

    /// Describe an image reachable at `image_url` with an image-capable model.
    async fn describe_image(&self, image_url: &str) -> Result<String>;
}
