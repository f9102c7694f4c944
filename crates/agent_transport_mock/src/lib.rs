//! Deterministic scripted implementation of `conversation::AgentTransport`.
//!
//! Contains no network logic. Used by contract tests and for offline local runs.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_api::{
    AgentChunk, AgentSummary, ApiError, CancellationSignal, MessageRequest, StreamSummary,
};
use conversation::AgentTransport;
use reqwest::StatusCode;
use serde_json::json;

/// Stable transport identifier used for explicit startup selection.
pub const MOCK_TRANSPORT_ID: &str = "mock";

/// A failure the mock reproduces on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// The connection drops mid-stream.
    Disconnect,
    Status { status: u16, body: String },
    Cancelled,
}

impl ScriptedFailure {
    #[must_use]
    pub fn rate_limited(reason: &str) -> Self {
        Self::Status {
            status: 429,
            body: json!({ "detail": reason }).to_string(),
        }
    }

    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn into_error(self) -> ApiError {
        match self {
            Self::Disconnect => ApiError::Disconnected {
                message: "scripted disconnect".to_string(),
            },
            Self::Status { status, body } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                ApiError::from_status(status, &body)
            }
            Self::Cancelled => ApiError::Cancelled,
        }
    }
}

/// One scripted streaming response: chunks delivered in order, then an
/// optional failure.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamScript {
    pub chunks: Vec<AgentChunk>,
    pub failure: Option<ScriptedFailure>,
}

impl StreamScript {
    #[must_use]
    pub fn completes(chunks: Vec<AgentChunk>) -> Self {
        Self {
            chunks,
            failure: None,
        }
    }

    #[must_use]
    pub fn fails_after(chunks: Vec<AgentChunk>, failure: ScriptedFailure) -> Self {
        Self {
            chunks,
            failure: Some(failure),
        }
    }

    #[must_use]
    pub fn fails(failure: ScriptedFailure) -> Self {
        Self::fails_after(Vec::new(), failure)
    }
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Stream { text: String },
    Batch { text: String },
    ListMessages { limit: Option<u32> },
    ListAgents,
}

/// Scripted transport. Unscripted sends get an echo reply.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    streams: Mutex<VecDeque<StreamScript>>,
    batches: Mutex<VecDeque<Result<Vec<AgentChunk>, ScriptedFailure>>>,
    history: Vec<AgentChunk>,
    agents: Vec<AgentSummary>,
    chunk_delay: Duration,
    calls: Mutex<Vec<TransportCall>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stream(self, script: StreamScript) -> Self {
        lock_unpoisoned(&self.streams).push_back(script);
        self
    }

    #[must_use]
    pub fn with_batch(self, chunks: Vec<AgentChunk>) -> Self {
        lock_unpoisoned(&self.batches).push_back(Ok(chunks));
        self
    }

    #[must_use]
    pub fn with_batch_failure(self, failure: ScriptedFailure) -> Self {
        lock_unpoisoned(&self.batches).push_back(Err(failure));
        self
    }

    #[must_use]
    pub fn with_history(mut self, chunks: Vec<AgentChunk>) -> Self {
        self.history = chunks;
        self
    }

    #[must_use]
    pub fn with_agents(mut self, agents: Vec<AgentSummary>) -> Self {
        self.agents = agents;
        self
    }

    /// Pause between streamed chunks, for a visible demo.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        lock_unpoisoned(&self.calls).clone()
    }

    fn record(&self, call: TransportCall) {
        lock_unpoisoned(&self.calls).push(call);
    }
}

impl AgentTransport for ScriptedTransport {
    async fn stream_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
        on_chunk: &mut dyn FnMut(AgentChunk),
    ) -> Result<StreamSummary, ApiError> {
        let text = request_text(request);
        self.record(TransportCall::Stream { text: text.clone() });

        let script = lock_unpoisoned(&self.streams)
            .pop_front()
            .unwrap_or_else(|| StreamScript::completes(echo_reply(&text)));

        let mut summary = StreamSummary::default();
        for chunk in script.chunks {
            if is_cancelled(cancel) {
                return Err(ApiError::Cancelled);
            }
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            if let AgentChunk::StopReason { reason } = &chunk {
                summary.stop_reason = Some(reason.clone());
            }
            summary.chunks += 1;
            on_chunk(chunk);
        }

        match script.failure {
            Some(failure) => Err(failure.into_error()),
            None if is_cancelled(cancel) => Err(ApiError::Cancelled),
            None => Ok(summary),
        }
    }

    async fn send_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentChunk>, ApiError> {
        let text = request_text(request);
        self.record(TransportCall::Batch { text: text.clone() });
        if is_cancelled(cancel) {
            return Err(ApiError::Cancelled);
        }

        match lock_unpoisoned(&self.batches).pop_front() {
            Some(Ok(chunks)) => Ok(chunks),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Ok(echo_reply(&text)),
        }
    }

    async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<AgentChunk>, ApiError> {
        self.record(TransportCall::ListMessages { limit });
        let skip = limit
            .map(|limit| self.history.len().saturating_sub(limit as usize))
            .unwrap_or(0);
        Ok(self.history.iter().skip(skip).cloned().collect())
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        self.record(TransportCall::ListAgents);
        if self.agents.is_empty() {
            return Ok(vec![AgentSummary {
                id: "agent-mock".to_string(),
                name: Some("Mock agent".to_string()),
                description: Some("Scripted offline agent".to_string()),
                model: Some("mock".to_string()),
            }]);
        }
        Ok(self.agents.clone())
    }
}

/// Reply used when no script is queued: a heartbeat, a reasoning step and the
/// echoed text as word tokens.
#[must_use]
pub fn echo_reply(text: &str) -> Vec<AgentChunk> {
    let mut chunks = vec![
        AgentChunk::Heartbeat,
        AgentChunk::reasoning("Repeating the message back."),
    ];

    let reply = format!("You said: {text}");
    let mut pending = String::new();
    for ch in reply.chars() {
        pending.push(ch);
        if ch == ' ' {
            chunks.push(AgentChunk::token(std::mem::take(&mut pending)));
        }
    }
    if !pending.is_empty() {
        chunks.push(AgentChunk::token(pending));
    }

    chunks.push(AgentChunk::stop("end_turn"));
    chunks
}

fn request_text(request: &MessageRequest) -> String {
    request
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
