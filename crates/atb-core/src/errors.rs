use std::time::Duration;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the relay can
/// tell transport failures, backend failures and run outcomes apart.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Network failure, timeout, 5xx / 429 or an unreadable response body.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend refused the request (4xx other than 429).
    #[error("backend rejected request ({status}): {message}")]
    BackendRejected { status: u16, message: String },

    #[error("run ended with status {status}")]
    RunFailed { status: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to deliver reply: {0}")]
    TransportSendFailed(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Backend errors are terminal for the current message; nothing retries them.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::BackendRejected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
