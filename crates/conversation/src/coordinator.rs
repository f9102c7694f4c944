use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_api::{
    AgentChunk, AgentSummary, ApiError, CancellationSignal, ErrorClass, MessageRequest,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::accumulator::StreamSession;
use crate::liveness::{LivenessTracker, DEFAULT_LIVENESS_WINDOW};
use crate::transport::AgentTransport;
use crate::turn::{ConversationTurn, PresentationSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    pub liveness_window: Duration,
    /// Number of stored messages requested by `load_history`. `None` lets the
    /// server decide.
    pub history_limit: Option<u32>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            history_limit: Some(50),
        }
    }
}

/// Which path produced the presented turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Streaming,
    /// The stream failed at the transport level and the batch endpoint replayed
    /// the request.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub mode: SendMode,
    /// A rate limit was reported to the sink instead of a reply.
    pub rate_limited: bool,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("authentication rejected: {0}")]
    Auth(#[source] ApiError),

    #[error("agent or endpoint not found: {0}")]
    NotFound(#[source] ApiError),

    #[error("endpoint does not support this method: {0}")]
    MethodNotSupported(#[source] ApiError),

    #[error("agent server error: {0}")]
    Server(#[source] ApiError),

    #[error("connection failed: {0}")]
    Transport(#[source] ApiError),

    #[error("send was cancelled")]
    Cancelled,

    #[error("request failed: {0}")]
    Request(#[source] ApiError),
}

impl SendError {
    /// Failure class of the underlying request, if there was one.
    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::EmptyMessage => None,
            Self::Cancelled => Some(ErrorClass::Cancelled),
            Self::Auth(error)
            | Self::NotFound(error)
            | Self::MethodNotSupported(error)
            | Self::Server(error)
            | Self::Transport(error)
            | Self::Request(error) => Some(error.class()),
        }
    }
}

impl From<ApiError> for SendError {
    fn from(error: ApiError) -> Self {
        match error.class() {
            ErrorClass::Auth => Self::Auth(error),
            ErrorClass::NotFound => Self::NotFound(error),
            ErrorClass::MethodNotSupported => Self::MethodNotSupported(error),
            ErrorClass::ServerError => Self::Server(error),
            ErrorClass::Transport => Self::Transport(error),
            ErrorClass::Cancelled => Self::Cancelled,
            ErrorClass::RateLimit
            | ErrorClass::Client
            | ErrorClass::Malformed
            | ErrorClass::Config => Self::Request(error),
        }
    }
}

/// A conversation with one agent.
///
/// Owns the accumulation state of the send in flight and bridges the
/// streaming and batch endpoints.
pub struct Conversation<T> {
    transport: T,
    config: ConversationConfig,
    liveness: LivenessTracker,
    cancel: CancellationSignal,
    active: Option<StreamSession>,
    sends: u64,
}

impl<T: AgentTransport> Conversation<T> {
    /// Must be called inside a Tokio runtime.
    pub fn new(transport: T, config: ConversationConfig) -> Self {
        let liveness = LivenessTracker::spawn(config.liveness_window);
        Self {
            transport,
            config,
            liveness,
            cancel: Arc::new(AtomicBool::new(false)),
            active: None,
            sends: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    /// Flag that aborts the send in flight once set. Cleared at the start of
    /// every send.
    pub fn cancel_signal(&self) -> CancellationSignal {
        Arc::clone(&self.cancel)
    }

    /// Whether a send left accumulation state behind (its future was dropped).
    pub fn has_open_session(&self) -> bool {
        self.active.is_some()
    }

    pub async fn send_message(
        &mut self,
        text: &str,
        sink: &mut dyn PresentationSink,
    ) -> Result<SendOutcome, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        if let Some(mut stale) = self.active.take() {
            warn!(send = stale.send_id(), "discarding session left open by an interrupted send");
            stale.discard(sink);
        }
        self.cancel.store(false, Ordering::Release);

        let mut session = self.open_session();
        session.emit_detached(
            ConversationTurn::UserMessage {
                text: text.to_string(),
            },
            sink,
        );
        let send = session.send_id();
        self.active = Some(session);

        let request = MessageRequest::user_text(text);
        let streamed = {
            let active = &mut self.active;
            let liveness = &self.liveness;
            let mut on_chunk = |chunk: AgentChunk| {
                if matches!(chunk, AgentChunk::Heartbeat) {
                    liveness.heartbeat();
                }
                if let Some(session) = active.as_mut() {
                    session.fold(chunk, &mut *sink);
                }
            };
            self.transport
                .stream_message(&request, Some(&self.cancel), &mut on_chunk)
                .await
        };

        let mut session = self
            .active
            .take()
            .unwrap_or_else(|| StreamSession::new(send));

        match streamed {
            Ok(summary) => {
                session.finish(sink);
                debug!(send, chunks = summary.chunks, malformed = summary.malformed, "stream completed");
                Ok(SendOutcome {
                    mode: SendMode::Streaming,
                    rate_limited: false,
                    stop_reason: summary.stop_reason,
                })
            }
            Err(error) if error.class() == ErrorClass::Transport => {
                warn!(send, %error, "stream failed; replaying through batch endpoint");
                session.discard(sink);
                self.replay_batch(session, &request, sink).await
            }
            Err(error) => Self::fail(session, SendMode::Streaming, error, sink),
        }
    }

    /// Discards the open session without flushing it.
    pub fn teardown(&mut self, sink: &mut dyn PresentationSink) {
        self.cancel.store(true, Ordering::Release);
        if let Some(mut session) = self.active.take() {
            info!(send = session.send_id(), "tearing down open session");
            session.discard(sink);
        }
    }

    /// Presents the agent's stored messages, oldest first. Returns the number
    /// of turns presented.
    pub async fn load_history(&mut self, sink: &mut dyn PresentationSink) -> Result<usize, SendError> {
        let chunks = self.transport.list_messages(self.config.history_limit).await?;
        let mut session = self.open_session();
        session.fold_all(chunks, sink);
        session.finish(sink);
        debug!(turns = session.emitted().len(), "history loaded");
        Ok(session.emitted().len())
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, SendError> {
        Ok(self.transport.list_agents().await?)
    }

    async fn replay_batch(
        &mut self,
        mut session: StreamSession,
        request: &MessageRequest,
        sink: &mut dyn PresentationSink,
    ) -> Result<SendOutcome, SendError> {
        match self.transport.send_message(request, Some(&self.cancel)).await {
            Ok(chunks) => {
                let stop_reason = chunks.iter().rev().find_map(|chunk| match chunk {
                    AgentChunk::StopReason { reason } => Some(reason.clone()),
                    _ => None,
                });
                session.fold_all(chunks, sink);
                session.finish(sink);
                info!(send = session.send_id(), turns = session.emitted().len(), "batch replay completed");
                Ok(SendOutcome {
                    mode: SendMode::Batch,
                    rate_limited: false,
                    stop_reason,
                })
            }
            Err(error) => Self::fail(session, SendMode::Batch, error, sink),
        }
    }

    fn fail(
        mut session: StreamSession,
        mode: SendMode,
        error: ApiError,
        sink: &mut dyn PresentationSink,
    ) -> Result<SendOutcome, SendError> {
        session.discard(sink);
        if error.class() == ErrorClass::RateLimit {
            info!(send = session.send_id(), "send rate limited");
            session.emit_detached(
                ConversationTurn::RateLimitNotice {
                    reason: error.rate_limit_reason(),
                },
                sink,
            );
            return Ok(SendOutcome {
                mode,
                rate_limited: true,
                stop_reason: None,
            });
        }

        warn!(send = session.send_id(), class = %error.class(), %error, "send failed");
        Err(SendError::from(error))
    }

    fn open_session(&mut self) -> StreamSession {
        self.sends += 1;
        StreamSession::new(self.sends)
    }
}
