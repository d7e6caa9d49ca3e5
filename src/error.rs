use serde::Serialize;
use std::time::Duration;

/// Failure classification used for retry decisions and failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unresolvable provider/model mapping or missing credentials
    Configuration,
    /// Judge output that is not a valid score
    JudgeParse,
    /// Rate limit, timeout or transport failure
    TransientProvider,
    /// Provider rejected the request outright
    Provider,
    /// Scoring task panicked or was cancelled
    Internal,
}

/// Errors raised while routing and scoring a single example
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("judge parse error: {0}")]
    Parse(String),

    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("provider unavailable: {status} - {message}")]
    Unavailable { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<JudgeError> },
}

pub type JudgeResult<T> = Result<T, JudgeError>;

impl JudgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JudgeError::Configuration(_) => ErrorKind::Configuration,
            JudgeError::Parse(_) => ErrorKind::JudgeParse,
            JudgeError::RateLimited { .. }
            | JudgeError::Timeout { .. }
            | JudgeError::Unavailable { .. }
            | JudgeError::Transport(_) => ErrorKind::TransientProvider,
            JudgeError::Api { .. } | JudgeError::Rejected(_) => ErrorKind::Provider,
            JudgeError::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Whether another attempt of the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            JudgeError::RetriesExhausted { .. } => false,
            other => other.kind() == ErrorKind::TransientProvider,
        }
    }

    /// Server-provided hint for how long to wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            JudgeError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JudgeError::Transport(format!("malformed provider response: {}", err))
        } else if err.is_builder() {
            JudgeError::Configuration(format!("invalid request: {}", err))
        } else {
            JudgeError::Transport(err.to_string())
        }
    }
}
