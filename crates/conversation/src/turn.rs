use std::fmt;

use serde_json::Value;

/// Opaque reference to one emitted turn.
///
/// Handles are unique within a [`crate::Conversation`]: `send` identifies the
/// send that produced the turn and `seq` orders turns within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnHandle {
    send: u64,
    seq: u64,
}

impl TurnHandle {
    pub(crate) fn new(send: u64, seq: u64) -> Self {
        Self { send, seq }
    }

    #[must_use]
    pub fn send_id(&self) -> u64 {
        self.send
    }
}

impl fmt::Display for TurnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.send, self.seq)
    }
}

/// One tool invocation and, once it arrives, its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInteraction {
    pub tool_name: String,
    /// Parsed arguments. `Null` until the accumulated fragments parse.
    pub args: Value,
    pub result: Option<Value>,
    pub reasoning: Option<String>,
    /// True until a matching tool return is applied.
    pub pending: bool,
}

/// One presentable unit of conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationTurn {
    UserMessage {
        text: String,
    },
    AssistantMessage {
        text: String,
        reasoning: Option<String>,
    },
    ToolInteraction(ToolInteraction),
    /// Diagnostic side-channel message. Hidden unless the sink opts in.
    SystemNotice {
        payload: String,
    },
    RateLimitNotice {
        reason: String,
    },
    ApprovalRequest {
        tool_name: String,
        args: Value,
        request_id: String,
    },
}

impl ConversationTurn {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ToolInteraction(_) => "tool_interaction",
            Self::SystemNotice { .. } => "system_notice",
            Self::RateLimitNotice { .. } => "rate_limit_notice",
            Self::ApprovalRequest { .. } => "approval_request",
        }
    }

    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::SystemNotice { .. })
    }
}

/// Lifecycle of a turn as seen by the presentation sink.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Opened {
        handle: TurnHandle,
        turn: ConversationTurn,
    },
    Updated {
        handle: TurnHandle,
        turn: ConversationTurn,
    },
    /// The turn will not change again.
    Finalized {
        handle: TurnHandle,
        turn: ConversationTurn,
    },
    /// A previously presented turn must be removed.
    Retracted {
        handle: TurnHandle,
    },
}

impl TurnEvent {
    #[must_use]
    pub fn handle(&self) -> TurnHandle {
        match self {
            Self::Opened { handle, .. }
            | Self::Updated { handle, .. }
            | Self::Finalized { handle, .. }
            | Self::Retracted { handle } => *handle,
        }
    }
}

/// Receives turn events in emission order.
pub trait PresentationSink {
    fn present(&mut self, event: TurnEvent);
}

impl PresentationSink for Vec<TurnEvent> {
    fn present(&mut self, event: TurnEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub handle: TurnHandle,
    pub turn: ConversationTurn,
    pub finalized: bool,
}

/// A sink that keeps the currently presented turns in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Snapshot of every presented turn, open or finalized.
    #[must_use]
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.entries.iter().map(|entry| entry.turn.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, handle: TurnHandle) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|entry| entry.handle == handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn upsert(&mut self, handle: TurnHandle, turn: ConversationTurn, finalized: bool) {
        match self.entries.iter_mut().find(|entry| entry.handle == handle) {
            Some(entry) => {
                entry.turn = turn;
                entry.finalized = finalized;
            }
            None => self.entries.push(TranscriptEntry {
                handle,
                turn,
                finalized,
            }),
        }
    }
}

impl PresentationSink for Transcript {
    fn present(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::Opened { handle, turn } | TurnEvent::Updated { handle, turn } => {
                self.upsert(handle, turn, false);
            }
            TurnEvent::Finalized { handle, turn } => self.upsert(handle, turn, true),
            TurnEvent::Retracted { handle } => self.entries.retain(|entry| entry.handle != handle),
        }
    }
}
