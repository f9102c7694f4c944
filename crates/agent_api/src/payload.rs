use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One input message in a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreate {
    pub role: String,
    pub content: String,
}

impl MessageCreate {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

/// Request payload shared by the streaming and batch send endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub messages: Vec<MessageCreate>,
    /// Ask the stream endpoint for token-level assistant deltas. Default: true.
    #[serde(default = "default_true")]
    pub stream_tokens: bool,
    /// Ask the stream endpoint to interleave heartbeat pings. Default: true.
    #[serde(default = "default_true")]
    pub include_pings: bool,
}

fn default_true() -> bool {
    true
}

impl MessageRequest {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![MessageCreate::user(text)],
            stream_tokens: true,
            include_pings: true,
        }
    }

    /// The same logical request shaped for the batch endpoint, which ignores
    /// the stream-only switches.
    pub fn for_batch(&self) -> Value {
        serde_json::json!({ "messages": self.messages })
    }
}

/// Batch send response: an ordered list of the same chunk payloads the stream
/// endpoint emits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub usage: Option<Value>,
    #[serde(default)]
    pub stop_reason: Option<Value>,
}

/// Summary of an agent as returned by the list/retrieve endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}
