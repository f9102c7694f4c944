//! Folds agent chunks into conversation turns.
//!
//! One [`StreamSession`] exists per send and is driven either chunk by chunk
//! from a stream or over a batch response. [`Conversation`] owns the session
//! of the send in flight and falls back from streaming to batch on transport
//! failure.

pub mod accumulator;
pub mod coordinator;
pub mod correlator;
pub mod liveness;
pub mod transport;
pub mod turn;

pub use accumulator::{AccumulatorPhase, StreamSession};
pub use coordinator::{Conversation, ConversationConfig, SendError, SendMode, SendOutcome};
pub use correlator::{CorrelationError, OpenToolCall, ToolCallCorrelator};
pub use liveness::{LivenessChange, LivenessMonitor, LivenessTracker, DEFAULT_LIVENESS_WINDOW};
pub use transport::AgentTransport;
pub use turn::{
    ConversationTurn, PresentationSink, ToolInteraction, Transcript, TranscriptEntry, TurnEvent,
    TurnHandle,
};
