use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Failure classification shared by the retry policy and the send coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// 401/403. Fatal for the session; requires reconfiguration.
    Auth,
    /// 429 or a body that reports a rate limit.
    RateLimit,
    NotFound,
    MethodNotSupported,
    /// Any other status >= 500.
    ServerError,
    /// Any other 4xx.
    Client,
    /// No response, connection failure or a broken body stream.
    Transport,
    /// A response that arrived but could not be decoded.
    Malformed,
    Cancelled,
    Config,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::MethodNotSupported => "method_not_supported",
            Self::ServerError => "server_error",
            Self::Client => "client",
            Self::Transport => "transport",
            Self::Malformed => "malformed",
            Self::Cancelled => "cancelled",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("agent id is required")]
    MissingAgentId,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The connection dropped after the response started.
    #[error("connection lost mid-stream: {message}")]
    Disconnected { message: String },

    #[error("HTTP {status} {message}")]
    Status { status: StatusCode, message: String },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stream failed: {message}")]
    StreamFailed { message: String },

    #[error("request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Builds a status error, normalizing the body into a readable message.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self::Status {
            status,
            message: parse_error_message(status, body),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingAgentId | Self::InvalidBaseUrl(_) | Self::InvalidHeader { .. } => {
                ErrorClass::Config
            }
            Self::Transport(_) | Self::Disconnected { .. } => ErrorClass::Transport,
            Self::Status { status, message } => {
                let class = classify_status(*status);
                if class == ErrorClass::Client && is_rate_limit_message(message) {
                    ErrorClass::RateLimit
                } else {
                    class
                }
            }
            Self::MalformedBody(_) | Self::Serde(_) => ErrorClass::Malformed,
            Self::StreamFailed { message } if is_rate_limit_message(message) => {
                ErrorClass::RateLimit
            }
            Self::StreamFailed { .. } => ErrorClass::ServerError,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Unknown(_) => ErrorClass::Client,
        }
    }

    /// Human-readable reason for a rate-limit notice.
    pub fn rate_limit_reason(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::StreamFailed { message }
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            _ => "Rate limit reached. Please wait before sending another message.".to_owned(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::MalformedBody(error.to_string());
        }
        if let Some(status) = error.status() {
            return Self::Status {
                status,
                message: error.to_string(),
            };
        }
        Self::Transport(error)
    }
}

/// Maps an HTTP status onto the failure taxonomy.
pub fn classify_status(status: StatusCode) -> ErrorClass {
    match status.as_u16() {
        401 | 403 => ErrorClass::Auth,
        429 => ErrorClass::RateLimit,
        404 => ErrorClass::NotFound,
        405 => ErrorClass::MethodNotSupported,
        code if code >= 500 => ErrorClass::ServerError,
        _ => ErrorClass::Client,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorPayloadFields>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorPayloadFields {
    Object {
        message: Option<String>,
        #[serde(rename = "type")]
        type_: Option<String>,
    },
    Text(String),
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        if let Some(detail) = &self.detail {
            match detail {
                serde_json::Value::String(text) => return non_empty(text),
                serde_json::Value::Null => {}
                other => return Some(other.to_string()),
            }
        }

        match &self.error {
            Some(ErrorPayloadFields::Object { message, type_ }) => {
                if let Some(message) = message.as_deref().and_then(non_empty) {
                    return Some(message);
                }
                if let Some(kind) = type_.as_deref().and_then(non_empty) {
                    return Some(kind);
                }
            }
            Some(ErrorPayloadFields::Text(text)) => {
                if let Some(text) = non_empty(text) {
                    return Some(text);
                }
            }
            None => {}
        }

        self.message.as_deref().and_then(non_empty)
    }
}

/// Extracts the most useful message from an error response body.
///
/// Understands `{"detail": ...}`, `{"error": {"message": ...}}`,
/// `{"error": "..."}` and `{"message": ...}` shapes, falling back to the raw
/// body and finally to the canonical status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    crate::retry::rate_limit_text_regex().is_match(message)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
