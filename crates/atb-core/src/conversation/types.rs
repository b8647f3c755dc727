use crate::domain::{RunId, ThreadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A turn used to seed a freshly created thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedMessage {
    pub role: Role,
    pub text: String,
}

impl SeedMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Backend run lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Unknown(String),
}

/// What a single status check tells the waiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
    Failed(String),
}

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            other => RunStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown(s) => s,
        }
    }

    pub fn readiness(&self) -> Readiness {
        match self {
            RunStatus::Completed => Readiness::Ready,
            RunStatus::Failed
            | RunStatus::Expired
            | RunStatus::Cancelled
            | RunStatus::Incomplete => Readiness::Failed(self.as_str().to_string()),
            _ => Readiness::NotReady,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub id: RunId,
    pub thread_id: ThreadId,
    pub status: RunStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    ImageFile { file_id: String },
    ImageUrl { url: String },
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub run_id: Option<RunId>,
    pub content: Vec<ContentPart>,
}

impl Message {
    /// All text segments in order, joined by newlines. Non-text parts are skipped.
    pub fn text(&self) -> String {
        join_text_parts(&self.content)
    }
}

pub fn join_text_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_image_text_joins_text_only() {
        let parts = vec![
            ContentPart::Text("A".to_string()),
            ContentPart::ImageFile {
                file_id: "file-1".to_string(),
            },
            ContentPart::Text("B".to_string()),
        ];
        assert_eq!(join_text_parts(&parts), "A\nB");
    }

    #[test]
    fn no_text_parts_yields_empty_string() {
        let parts = vec![ContentPart::ImageUrl {
            url: "https://x/y.png".to_string(),
        }];
        assert_eq!(join_text_parts(&parts), "");
        assert_eq!(join_text_parts(&[]), "");
    }

    #[test]
    fn status_readiness_mapping() {
        assert_eq!(RunStatus::parse("completed").readiness(), Readiness::Ready);
        for s in ["failed", "expired", "cancelled", "incomplete"] {
            assert_eq!(
                RunStatus::parse(s).readiness(),
                Readiness::Failed(s.to_string())
            );
        }
        for s in ["queued", "in_progress", "requires_action", "cancelling", "brand_new"] {
            assert_eq!(RunStatus::parse(s).readiness(), Readiness::NotReady);
        }
        assert_eq!(RunStatus::parse("brand_new").as_str(), "brand_new");
    }
}
