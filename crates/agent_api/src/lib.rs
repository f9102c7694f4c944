//! Transport-only client primitives for a stateful agent server.
//!
//! This crate owns request building, SSE framing, wire chunk decoding, failure
//! classification and the rate-limit retry policy. It has no notion of
//! conversation turns; folding chunks into turns lives in `conversation`.
//!
//! Streaming and batch sends return the same [`AgentChunk`] values, so one
//! accumulator can consume either.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{AgentApiClient, CancellationSignal, StreamResult, StreamSummary};
pub use config::AgentApiConfig;
pub use error::{classify_status, ApiError, ErrorClass};
pub use events::{decode_chunk, AgentChunk, ChunkCategory, MalformedChunk, ToolCallDelta};
pub use payload::{AgentSummary, MessageRequest};
pub use retry::RetryPolicy;
pub use sse::{SseFrame, SseStreamParser};
pub use url::{normalize_base_url, AgentEndpoints};
