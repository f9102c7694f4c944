use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Routing category of a decoded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkCategory {
    Reasoning,
    ToolCall,
    ToolReturn,
    AssistantText,
    UserText,
    Heartbeat,
    SystemAlert,
    Login,
    UsageStats,
    ApprovalRequest,
    StopSignal,
    Unknown,
}

impl ChunkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::ToolCall => "tool_call",
            Self::ToolReturn => "tool_return",
            Self::AssistantText => "assistant_text",
            Self::UserText => "user_text",
            Self::Heartbeat => "heartbeat",
            Self::SystemAlert => "system_alert",
            Self::Login => "login",
            Self::UsageStats => "usage_stats",
            Self::ApprovalRequest => "approval_request",
            Self::StopSignal => "stop_signal",
            Self::Unknown => "unknown",
        }
    }

    /// Side-channel chunks never touch turn accumulation state.
    pub fn is_side_channel(&self) -> bool {
        matches!(self, Self::Heartbeat | Self::SystemAlert | Self::Login)
    }
}

impl fmt::Display for ChunkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool invocation fragment carried by `tool_call_message` and
/// `approval_request_message`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallDelta {
    pub call_id: Option<String>,
    pub name: Option<String>,
    /// A text fragment of JSON arguments, or an already structured value.
    pub arguments: Option<Value>,
}

/// One wire event, identical in shape for streaming and batch responses.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentChunk {
    Reasoning {
        id: Option<String>,
        text: String,
    },
    ToolCall {
        id: Option<String>,
        call: ToolCallDelta,
    },
    ToolReturn {
        call_id: Option<String>,
        result: Value,
        status: Option<String>,
    },
    AssistantMessage {
        id: Option<String>,
        text: String,
    },
    AssistantToken {
        text: String,
    },
    /// Only present in stored history, never in a live response.
    UserMessage {
        text: String,
    },
    UsageStatistics {
        usage: Value,
    },
    Heartbeat,
    SystemAlert {
        message: String,
    },
    Login,
    ApprovalRequest {
        request_id: String,
        call: ToolCallDelta,
    },
    StopReason {
        reason: String,
    },
    /// Tag the decoder does not know; kept for best-effort text recovery.
    Unknown {
        tag: Option<String>,
        payload: Value,
    },
}

impl AgentChunk {
    pub fn category(&self) -> ChunkCategory {
        match self {
            Self::Reasoning { .. } => ChunkCategory::Reasoning,
            Self::ToolCall { .. } => ChunkCategory::ToolCall,
            Self::ToolReturn { .. } => ChunkCategory::ToolReturn,
            Self::AssistantMessage { .. } | Self::AssistantToken { .. } => {
                ChunkCategory::AssistantText
            }
            Self::UserMessage { .. } => ChunkCategory::UserText,
            Self::UsageStatistics { .. } => ChunkCategory::UsageStats,
            Self::Heartbeat => ChunkCategory::Heartbeat,
            Self::SystemAlert { .. } => ChunkCategory::SystemAlert,
            Self::Login => ChunkCategory::Login,
            Self::ApprovalRequest { .. } => ChunkCategory::ApprovalRequest,
            Self::StopReason { .. } => ChunkCategory::StopSignal,
            Self::Unknown { .. } => ChunkCategory::Unknown,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning {
            id: None,
            text: text.into(),
        }
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        name: Option<&str>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: None,
            call: ToolCallDelta {
                call_id: Some(call_id.into()),
                name: name.map(ToOwned::to_owned),
                arguments: Some(Value::String(arguments.into())),
            },
        }
    }

    pub fn tool_return(call_id: impl Into<String>, result: Value) -> Self {
        Self::ToolReturn {
            call_id: Some(call_id.into()),
            result,
            status: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantMessage {
            id: None,
            text: text.into(),
        }
    }

    pub fn token(text: impl Into<String>) -> Self {
        Self::AssistantToken { text: text.into() }
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        Self::StopReason {
            reason: reason.into(),
        }
    }
}

/// A payload that could not be classified. Logged and skipped by callers.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed chunk: {reason}")]
pub struct MalformedChunk {
    pub reason: String,
    pub payload: Value,
}

impl MalformedChunk {
    fn new(reason: impl Into<String>, payload: &Value) -> Self {
        Self {
            reason: reason.into(),
            payload: payload.clone(),
        }
    }
}

fn heartbeat_phrase_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)heart.?beat|keep.?alive|\bping\b")
            .expect("heartbeat regex must compile")
    })
}

/// Decode one JSON payload into a chunk by its discriminant tag.
///
/// The tag is read from `message_type`, then `type`. Payloads without a tag
/// fall back to legacy heuristics: a `token` field is an assistant token and a
/// `reason`/`status` string phrased like a keep-alive is a heartbeat.
pub fn decode_chunk(value: &Value) -> Result<AgentChunk, MalformedChunk> {
    let Some(object) = value.as_object() else {
        return Err(MalformedChunk::new("payload is not a JSON object", value));
    };

    let tag = str_field(object, "message_type").or_else(|| str_field(object, "type"));
    let Some(tag) = tag else {
        return decode_untagged(object, value);
    };

    let id = str_field(object, "id").map(ToOwned::to_owned);
    match tag {
        "reasoning_message" => {
            let text = str_field(object, "reasoning")
                .ok_or_else(|| MalformedChunk::new("reasoning_message without reasoning", value))?;
            Ok(AgentChunk::Reasoning {
                id,
                text: text.to_owned(),
            })
        }
        "tool_call_message" => {
            let call = object
                .get("tool_call")
                .and_then(Value::as_object)
                .map(decode_tool_call)
                .ok_or_else(|| MalformedChunk::new("tool_call_message without tool_call", value))?;
            Ok(AgentChunk::ToolCall { id, call })
        }
        "tool_return_message" => {
            let result = object
                .get("tool_return")
                .cloned()
                .ok_or_else(|| MalformedChunk::new("tool_return_message without tool_return", value))?;
            Ok(AgentChunk::ToolReturn {
                call_id: str_field(object, "tool_call_id").map(ToOwned::to_owned),
                result,
                status: str_field(object, "status").map(ToOwned::to_owned),
            })
        }
        "assistant_message" => {
            let text = object
                .get("content")
                .and_then(content_text)
                .or_else(|| str_field(object, "text").map(ToOwned::to_owned))
                .ok_or_else(|| MalformedChunk::new("assistant_message without content", value))?;
            Ok(AgentChunk::AssistantMessage { id, text })
        }
        "assistant_message_token" => {
            let text = str_field(object, "token")
                .ok_or_else(|| MalformedChunk::new("assistant_message_token without token", value))?;
            Ok(AgentChunk::AssistantToken {
                text: text.to_owned(),
            })
        }
        "user_message" => {
            let text = object
                .get("content")
                .and_then(content_text)
                .map(|text| unwrap_packed_user_text(&text))
                .ok_or_else(|| MalformedChunk::new("user_message without content", value))?;
            Ok(AgentChunk::UserMessage { text })
        }
        "usage_statistics" => Ok(AgentChunk::UsageStatistics {
            usage: value.clone(),
        }),
        "heartbeat" | "ping" => Ok(AgentChunk::Heartbeat),
        "system_alert" => Ok(AgentChunk::SystemAlert {
            message: str_field(object, "message").unwrap_or_default().to_owned(),
        }),
        "login" => Ok(AgentChunk::Login),
        "approval_request_message" => {
            let call = object
                .get("tool_call")
                .and_then(Value::as_object)
                .map(decode_tool_call)
                .unwrap_or_default();
            let request_id = id
                .or_else(|| call.call_id.clone())
                .ok_or_else(|| MalformedChunk::new("approval_request_message without id", value))?;
            Ok(AgentChunk::ApprovalRequest { request_id, call })
        }
        "stop_reason" => {
            let reason = str_field(object, "stop_reason")
                .or_else(|| str_field(object, "value"))
                .unwrap_or("end_turn");
            Ok(AgentChunk::StopReason {
                reason: reason.to_owned(),
            })
        }
        other => Ok(AgentChunk::Unknown {
            tag: Some(other.to_owned()),
            payload: value.clone(),
        }),
    }
}

fn decode_untagged(object: &Map<String, Value>, value: &Value) -> Result<AgentChunk, MalformedChunk> {
    if let Some(token) = str_field(object, "token") {
        return Ok(AgentChunk::AssistantToken {
            text: token.to_owned(),
        });
    }

    let keep_alive = ["reason", "status"]
        .iter()
        .filter_map(|key| str_field(object, key))
        .any(|text| heartbeat_phrase_regex().is_match(text));
    if keep_alive {
        return Ok(AgentChunk::Heartbeat);
    }

    if object.is_empty() {
        return Err(MalformedChunk::new("empty payload", value));
    }

    Ok(AgentChunk::Unknown {
        tag: None,
        payload: value.clone(),
    })
}

fn decode_tool_call(call: &Map<String, Value>) -> ToolCallDelta {
    ToolCallDelta {
        call_id: str_field(call, "tool_call_id")
            .or_else(|| str_field(call, "id"))
            .map(ToOwned::to_owned),
        name: str_field(call, "name").map(ToOwned::to_owned),
        arguments: call.get("arguments").filter(|value| !value.is_null()).cloned(),
    }
}

/// Text of an assistant `content` field: a string, or an array of
/// `{ "type": "text", "text": ... }` parts.
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(part) => str_field(part, "text"),
                    _ => None,
                })
                .collect();
            Some(text)
        }
        _ => None,
    }
}

/// Stored user messages may wrap the typed text in a JSON envelope
/// (`{"type": "user_message", "message": ...}`).
fn unwrap_packed_user_text(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|packed| str_field(packed, "message"))
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| text.to_owned())
}

/// First text-like field of an unknown payload. Used only for best-effort
/// recovery when the wire format drifts.
pub fn text_like_field(payload: &Value) -> Option<&str> {
    let object = payload.as_object()?;
    ["text", "content", "token", "delta", "message"]
        .iter()
        .find_map(|key| str_field(object, key))
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_tool_call_with_either_id_field() {
        let letta = decode_chunk(&json!({
            "message_type": "tool_call_message",
            "tool_call": {"tool_call_id": "call-1", "name": "search_vault", "arguments": "{\"q\""}
        }))
        .expect("tool call should decode");
        let legacy = decode_chunk(&json!({
            "message_type": "tool_call_message",
            "tool_call": {"id": "call-1", "arguments": ":1}"}
        }))
        .expect("tool call should decode");

        assert!(matches!(
            letta,
            AgentChunk::ToolCall { call: ToolCallDelta { call_id: Some(ref id), name: Some(ref name), .. }, .. }
                if id == "call-1" && name == "search_vault"
        ));
        assert!(matches!(
            legacy,
            AgentChunk::ToolCall { call: ToolCallDelta { call_id: Some(ref id), name: None, .. }, .. }
                if id == "call-1"
        ));
    }

    #[test]
    fn assistant_content_parts_are_joined() {
        let chunk = decode_chunk(&json!({
            "message_type": "assistant_message",
            "content": [{"type": "text", "text": "Hel"}, {"type": "text", "text": "lo"}]
        }))
        .expect("assistant message should decode");

        assert_eq!(chunk, AgentChunk::AssistantMessage { id: None, text: "Hello".to_owned() });
    }

    #[test]
    fn untagged_payloads_use_legacy_heuristics() {
        assert_eq!(
            decode_chunk(&json!({"token": "hi"})).expect("token"),
            AgentChunk::AssistantToken { text: "hi".to_owned() }
        );
        assert_eq!(
            decode_chunk(&json!({"reason": "Server keep-alive"})).expect("keep-alive"),
            AgentChunk::Heartbeat
        );
        assert_eq!(
            decode_chunk(&json!({"message_type": "ping"})).expect("ping"),
            AgentChunk::Heartbeat
        );
        assert!(matches!(
            decode_chunk(&json!({"foo": "bar"})),
            Ok(AgentChunk::Unknown { tag: None, .. })
        ));
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        assert!(decode_chunk(&json!("text")).is_err());
        assert!(decode_chunk(&json!({})).is_err());
        assert!(decode_chunk(&json!({"message_type": "reasoning_message"})).is_err());
        assert!(decode_chunk(&json!({"message_type": "tool_return_message"})).is_err());
    }

    #[test]
    fn side_channel_categories() {
        assert!(AgentChunk::Heartbeat.category().is_side_channel());
        assert!(AgentChunk::Login.category().is_side_channel());
        assert!(AgentChunk::SystemAlert { message: String::new() }
            .category()
            .is_side_channel());
        assert!(!AgentChunk::token("x").category().is_side_channel());
    }
}
