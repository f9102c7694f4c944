use std::fmt;

use agent_api::events::text_like_field;
use agent_api::{AgentChunk, ToolCallDelta};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::correlator::{OpenToolCall, ToolCallCorrelator};
use crate::turn::{ConversationTurn, PresentationSink, ToolInteraction, TurnEvent, TurnHandle};

/// Where the accumulator is within one logical reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorPhase {
    Idle,
    AccumulatingReasoning,
    AccumulatingToolCall,
    AwaitingToolResult,
    AccumulatingAssistantText,
    Closed,
}

impl AccumulatorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AccumulatingReasoning => "accumulating_reasoning",
            Self::AccumulatingToolCall => "accumulating_tool_call",
            Self::AwaitingToolResult => "awaiting_tool_result",
            Self::AccumulatingAssistantText => "accumulating_assistant_text",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for AccumulatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct OpenAssistant {
    handle: TurnHandle,
    message_id: Option<String>,
    text: String,
    reasoning: Option<String>,
}

impl OpenAssistant {
    fn snapshot(&self) -> ConversationTurn {
        ConversationTurn::AssistantMessage {
            text: self.text.clone(),
            reasoning: self.reasoning.clone(),
        }
    }
}

#[derive(Debug)]
struct OpenInteraction {
    handle: TurnHandle,
    interaction: ToolInteraction,
}

impl OpenInteraction {
    fn snapshot(&self) -> ConversationTurn {
        ConversationTurn::ToolInteraction(self.interaction.clone())
    }
}

/// An approval request whose arguments may still be streaming.
#[derive(Debug)]
struct OpenApproval {
    handle: TurnHandle,
    request_id: String,
    call: OpenToolCall,
}

impl OpenApproval {
    fn snapshot(&self) -> ConversationTurn {
        ConversationTurn::ApprovalRequest {
            tool_name: self.call.name.clone(),
            args: self.call.args.clone(),
            request_id: self.request_id.clone(),
        }
    }

    /// Unparseable arguments are kept as text once no more fragments can arrive.
    fn final_snapshot(&self) -> ConversationTurn {
        let args = if self.call.args.is_null() && !self.call.args_buffer.trim().is_empty() {
            Value::String(self.call.args_buffer.clone())
        } else {
            self.call.args.clone()
        };
        ConversationTurn::ApprovalRequest {
            tool_name: self.call.name.clone(),
            args,
            request_id: self.request_id.clone(),
        }
    }
}

/// Accumulation state for one send.
///
/// Folds chunks one at a time into turns and reports every turn lifecycle
/// change to the sink. The same `fold` serves streamed and batch chunks.
#[derive(Debug)]
pub struct StreamSession {
    send: u64,
    next_seq: u64,
    phase: AccumulatorPhase,
    reasoning: String,
    correlator: ToolCallCorrelator,
    assistant: Option<OpenAssistant>,
    tool: Option<OpenInteraction>,
    approval: Option<OpenApproval>,
    emitted: Vec<TurnHandle>,
}

impl StreamSession {
    #[must_use]
    pub fn new(send: u64) -> Self {
        Self {
            send,
            next_seq: 0,
            phase: AccumulatorPhase::Idle,
            reasoning: String::new(),
            correlator: ToolCallCorrelator::new(),
            assistant: None,
            tool: None,
            approval: None,
            emitted: Vec::new(),
        }
    }

    #[must_use]
    pub fn send_id(&self) -> u64 {
        self.send
    }

    #[must_use]
    pub fn phase(&self) -> AccumulatorPhase {
        self.phase
    }

    #[must_use]
    pub fn reasoning_buffer(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn assistant_buffer(&self) -> Option<&str> {
        self.assistant.as_ref().map(|open| open.text.as_str())
    }

    #[must_use]
    pub fn correlator(&self) -> &ToolCallCorrelator {
        &self.correlator
    }

    /// The in-progress turn, if any.
    #[must_use]
    pub fn current_turn(&self) -> Option<TurnHandle> {
        self.assistant
            .as_ref()
            .map(|open| open.handle)
            .or_else(|| self.tool.as_ref().map(|open| open.handle))
            .or_else(|| self.approval.as_ref().map(|open| open.handle))
    }

    /// Handles of every turn this session has presented and not retracted.
    #[must_use]
    pub fn emitted(&self) -> &[TurnHandle] {
        &self.emitted
    }

    #[must_use]
    pub fn has_open_turn(&self) -> bool {
        self.assistant.is_some() || self.tool.is_some() || self.approval.is_some()
    }

    pub fn fold(&mut self, chunk: AgentChunk, sink: &mut dyn PresentationSink) {
        trace!(category = %chunk.category(), phase = %self.phase, "fold chunk");

        match chunk {
            AgentChunk::Reasoning { text, .. } => {
                self.finalize_assistant(sink);
                self.finalize_approval(sink);
                self.reasoning.push_str(&text);
                self.phase = AccumulatorPhase::AccumulatingReasoning;
            }
            AgentChunk::ToolCall { call, .. } => self.on_tool_call(call, sink),
            AgentChunk::ToolReturn {
                call_id,
                result,
                status,
            } => self.on_tool_return(call_id.as_deref(), result, status.as_deref(), sink),
            AgentChunk::AssistantMessage { id, text } => self.on_assistant_text(id, &text, sink),
            AgentChunk::AssistantToken { text } => self.on_assistant_text(None, &text, sink),
            AgentChunk::UserMessage { text } => {
                self.finalize_open(sink);
                self.clear_buffers();
                self.emit_finalized(ConversationTurn::UserMessage { text }, sink);
                self.phase = AccumulatorPhase::Idle;
            }
            AgentChunk::UsageStatistics { .. } | AgentChunk::StopReason { .. } => {
                self.finalize_open(sink);
                self.clear_buffers();
                self.phase = AccumulatorPhase::Closed;
            }
            AgentChunk::Heartbeat => {}
            AgentChunk::SystemAlert { message } => {
                self.emit_finalized(ConversationTurn::SystemNotice { payload: message }, sink);
            }
            AgentChunk::Login => debug!("dropping login chunk"),
            AgentChunk::ApprovalRequest { request_id, call } => {
                self.on_approval_request(request_id, call, sink);
            }
            AgentChunk::Unknown { tag, payload } => self.on_unknown(tag.as_deref(), &payload, sink),
        }
    }

    /// Folds a pre-fetched ordered list through the same transitions as a stream.
    pub fn fold_all<I>(&mut self, chunks: I, sink: &mut dyn PresentationSink)
    where
        I: IntoIterator<Item = AgentChunk>,
    {
        for chunk in chunks {
            self.fold(chunk, sink);
        }
    }

    /// Finalizes every open turn and clears all buffers.
    pub fn finish(&mut self, sink: &mut dyn PresentationSink) {
        self.finalize_open(sink);
        if !self.reasoning.is_empty() {
            debug!(chars = self.reasoning.len(), "dropping reasoning with no following turn");
        }
        self.clear_buffers();
        self.phase = AccumulatorPhase::Closed;
    }

    /// Retracts every turn this session presented and returns to `Idle`.
    pub fn discard(&mut self, sink: &mut dyn PresentationSink) {
        let emitted = std::mem::take(&mut self.emitted);
        if !emitted.is_empty() {
            debug!(send = self.send, turns = emitted.len(), "retracting partial turns");
        }
        for handle in emitted.into_iter().rev() {
            sink.present(TurnEvent::Retracted { handle });
        }
        self.reset();
    }

    /// Drops all accumulation and returns to `Idle` without notifying the sink.
    pub fn reset(&mut self) {
        self.assistant = None;
        self.tool = None;
        self.approval = None;
        self.clear_buffers();
        self.emitted.clear();
        self.phase = AccumulatorPhase::Idle;
    }

    /// Presents a finalized turn that no later `discard` retracts.
    pub fn emit_detached(
        &mut self,
        turn: ConversationTurn,
        sink: &mut dyn PresentationSink,
    ) -> TurnHandle {
        let handle = self.next_handle();
        sink.present(TurnEvent::Finalized { handle, turn });
        handle
    }

    fn on_tool_call(&mut self, call: ToolCallDelta, sink: &mut dyn PresentationSink) {
        let ToolCallDelta {
            call_id,
            name,
            arguments,
        } = call;

        if self.correlator.continues(call_id.as_deref()) && self.tool.is_some() {
            if let Some(name) = name.as_deref() {
                self.correlator.name_if_missing(name);
            }
            let parsed = match arguments.as_ref() {
                Some(fragment) => match self.correlator.append(fragment) {
                    Ok(parsed) => parsed.cloned(),
                    Err(error) => {
                        warn!(%error, "dropping tool call fragment");
                        None
                    }
                },
                None => None,
            };
            let tool_name = self.correlator.open_call().map(|call| call.name.clone());
            if let Some(open) = self.tool.as_mut() {
                if let Some(args) = parsed {
                    open.interaction.args = args;
                }
                if let Some(tool_name) = tool_name {
                    open.interaction.tool_name = tool_name;
                }
                let turn = open.snapshot();
                sink.present(TurnEvent::Updated {
                    handle: open.handle,
                    turn,
                });
            }
            self.phase = AccumulatorPhase::AccumulatingToolCall;
            return;
        }

        self.finalize_assistant(sink);
        self.finalize_approval(sink);
        if let Some(superseded) =
            self.correlator
                .open(call_id.as_deref(), name.as_deref(), arguments.as_ref())
        {
            warn!(
                open_call = %superseded.id,
                new_call = ?call_id,
                "protocol violation: tool call opened before the previous one resolved"
            );
            self.finalize_tool(sink);
        }

        let (tool_name, args) = self
            .correlator
            .open_call()
            .map(|call| (call.name.clone(), call.args.clone()))
            .unwrap_or_default();
        let interaction = ToolInteraction {
            tool_name,
            args,
            result: None,
            reasoning: self.take_reasoning(),
            pending: true,
        };
        let handle = self.next_handle();
        let open = OpenInteraction {
            handle,
            interaction,
        };
        self.emitted.push(handle);
        sink.present(TurnEvent::Opened {
            handle,
            turn: open.snapshot(),
        });
        self.tool = Some(open);
        self.phase = AccumulatorPhase::AccumulatingToolCall;
    }

    fn on_tool_return(
        &mut self,
        call_id: Option<&str>,
        result: Value,
        status: Option<&str>,
        sink: &mut dyn PresentationSink,
    ) {
        let call = match self.correlator.resolve(call_id) {
            Ok(call) => call,
            Err(error) => {
                warn!(%error, "protocol violation: dropping unmatched tool return");
                return;
            }
        };

        let Some(mut open) = self.tool.take() else {
            warn!(call = %call.id, "tool call resolved without a presented turn");
            return;
        };
        debug!(call = %call.id, tool = %call.name, status = ?status, "tool call resolved");
        open.interaction.result = Some(result);
        open.interaction.pending = false;
        sink.present(TurnEvent::Finalized {
            handle: open.handle,
            turn: open.snapshot(),
        });
        self.phase = AccumulatorPhase::Closed;
    }

    fn on_assistant_text(
        &mut self,
        message_id: Option<String>,
        delta: &str,
        sink: &mut dyn PresentationSink,
    ) {
        let continues = match (&self.assistant, message_id.as_deref()) {
            (None, _) => false,
            (Some(open), Some(id)) => open.message_id.as_deref().map_or(true, |open_id| open_id == id),
            (Some(_), None) => true,
        };

        if continues {
            if let Some(open) = self.assistant.as_mut() {
                open.text.push_str(delta);
                if open.message_id.is_none() {
                    open.message_id = message_id;
                }
                sink.present(TurnEvent::Updated {
                    handle: open.handle,
                    turn: open.snapshot(),
                });
            }
        } else {
            self.finalize_assistant(sink);
            self.finalize_approval(sink);
            let handle = self.next_handle();
            let open = OpenAssistant {
                handle,
                message_id,
                text: delta.to_string(),
                reasoning: self.take_reasoning(),
            };
            self.emitted.push(handle);
            sink.present(TurnEvent::Opened {
                handle,
                turn: open.snapshot(),
            });
            self.assistant = Some(open);
        }
        self.phase = AccumulatorPhase::AccumulatingAssistantText;
    }

    /// Fragments sharing a request id build one approval turn.
    fn on_approval_request(
        &mut self,
        request_id: String,
        call: ToolCallDelta,
        sink: &mut dyn PresentationSink,
    ) {
        let ToolCallDelta { name, arguments, .. } = call;

        let continues = self
            .approval
            .as_ref()
            .is_some_and(|open| open.request_id == request_id);
        if !continues {
            self.finalize_assistant(sink);
            if let Some(open) = self.approval.as_ref() {
                debug!(open = %open.request_id, next = %request_id, "approval request superseded");
            }
            self.finalize_approval(sink);
            let mut call = OpenToolCall::new(request_id.clone(), String::new());
            if let Some(fragment) = arguments.as_ref() {
                call.push_fragment(fragment);
            }
            if let Some(name) = name {
                call.name = name;
            }
            let handle = self.next_handle();
            let open = OpenApproval {
                handle,
                request_id,
                call,
            };
            self.emitted.push(handle);
            sink.present(TurnEvent::Opened {
                handle,
                turn: open.snapshot(),
            });
            self.approval = Some(open);
        } else if let Some(open) = self.approval.as_mut() {
            if let Some(name) = name {
                if open.call.name.is_empty() {
                    open.call.name = name;
                }
            }
            if let Some(fragment) = arguments.as_ref() {
                open.call.push_fragment(fragment);
            }
            sink.present(TurnEvent::Updated {
                handle: open.handle,
                turn: open.snapshot(),
            });
        }
        self.phase = AccumulatorPhase::AwaitingToolResult;
    }

    fn on_unknown(&mut self, tag: Option<&str>, payload: &Value, sink: &mut dyn PresentationSink) {
        let recovered = text_like_field(payload);
        match (self.assistant.as_mut(), recovered) {
            (Some(open), Some(text)) => {
                warn!(
                    target: "wire_drift",
                    tag = tag.unwrap_or("<untagged>"),
                    chars = text.len(),
                    "appending text from unrecognised chunk"
                );
                open.text.push_str(text);
                sink.present(TurnEvent::Updated {
                    handle: open.handle,
                    turn: open.snapshot(),
                });
            }
            _ => {
                debug!(
                    target: "wire_drift",
                    tag = tag.unwrap_or("<untagged>"),
                    "dropping unrecognised chunk"
                );
            }
        }
    }

    fn finalize_open(&mut self, sink: &mut dyn PresentationSink) {
        self.finalize_assistant(sink);
        self.finalize_tool(sink);
        self.finalize_approval(sink);
    }

    fn finalize_approval(&mut self, sink: &mut dyn PresentationSink) {
        if let Some(open) = self.approval.take() {
            sink.present(TurnEvent::Finalized {
                handle: open.handle,
                turn: open.final_snapshot(),
            });
        }
    }

    fn finalize_assistant(&mut self, sink: &mut dyn PresentationSink) {
        if let Some(open) = self.assistant.take() {
            sink.present(TurnEvent::Finalized {
                handle: open.handle,
                turn: open.snapshot(),
            });
        }
    }

    /// Finalizes the open tool turn as it stands. An unresolved call stays pending.
    fn finalize_tool(&mut self, sink: &mut dyn PresentationSink) {
        if let Some(open) = self.tool.take() {
            if open.interaction.pending {
                debug!(tool = %open.interaction.tool_name, "finalizing tool call without a result");
            }
            sink.present(TurnEvent::Finalized {
                handle: open.handle,
                turn: open.snapshot(),
            });
        }
    }

    fn emit_finalized(&mut self, turn: ConversationTurn, sink: &mut dyn PresentationSink) {
        let handle = self.next_handle();
        self.emitted.push(handle);
        sink.present(TurnEvent::Finalized { handle, turn });
    }

    fn take_reasoning(&mut self) -> Option<String> {
        if self.reasoning.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.reasoning))
        }
    }

    fn clear_buffers(&mut self) {
        self.reasoning.clear();
        self.correlator.clear();
    }

    fn next_handle(&mut self) -> TurnHandle {
        self.next_seq += 1;
        TurnHandle::new(self.send, self.next_seq)
    }
}
