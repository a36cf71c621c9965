// Error taxonomy for provider fetches and the push channel
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No response at all: unreachable host, refused connection, timeout.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    /// 4xx, including rejected filters.
    #[error("request rejected {status}: {message}")]
    Client { status: u16, message: String },
    /// A response arrived but not in the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Classify an HTTP status with its body.
    pub fn from_status(status: u16, body: &str) -> Self {
        if looks_like_html(body) {
            return FetchError::MalformedResponse(HTML_RESPONSE_MESSAGE.to_string());
        }
        let message = body.trim().to_string();
        if status >= 500 {
            FetchError::Server { status, message }
        } else {
            FetchError::Client { status, message }
        }
    }

    pub fn code(&self) -> String {
        match self {
            FetchError::Transport(_) => "NETWORK_ERROR".to_string(),
            FetchError::Server { .. } => "SERVER_ERROR".to_string(),
            FetchError::Client { status, .. } => format!("HTTP_{status}"),
            FetchError::MalformedResponse(_) => "MALFORMED_RESPONSE".to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FetchError::Transport(_) => "Network error. Please check your connection.".to_string(),
            FetchError::Server { .. } => "Server error. Please try again later.".to_string(),
            FetchError::Client { message, .. } if !message.is_empty() => message.clone(),
            FetchError::Client { .. } => "Request failed".to_string(),
            FetchError::MalformedResponse(message) => message.clone(),
        }
    }
}

pub const HTML_RESPONSE_MESSAGE: &str =
    "Server returned HTML instead of JSON. Check API endpoint URL and server configuration.";

pub fn looks_like_html(body: &str) -> bool {
    body.trim_start().starts_with("<!")
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push channel connect failed: {0}")]
    Connect(String),
    #[error("push channel rejected with status {0}")]
    Status(u16),
}

/// User-facing failure surfaced next to the series.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DisplayError {
    pub code: String,
    pub message: String,
}

impl From<&FetchError> for DisplayError {
    fn from(err: &FetchError) -> Self {
        Self {
            code: err.code(),
            message: err.user_message(),
        }
    }
}
