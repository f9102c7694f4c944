//! Plain-text rendering of turn events for a line-oriented terminal.

use std::collections::HashMap;
use std::io::Write;

use conversation::{ConversationTurn, PresentationSink, ToolInteraction, TurnEvent, TurnHandle};
use serde_json::Value;
use tracing::warn;

const RETRACTED_MARKER: &str = "[retracted: replaying reply]";

/// Writes assistant text as it streams and prints every other turn once it is
/// final.
pub struct PlainTextSink<W: Write> {
    out: W,
    show_system: bool,
    /// Bytes of assistant text already written for each open turn.
    streamed: HashMap<TurnHandle, usize>,
}

impl<W: Write> PlainTextSink<W> {
    pub fn new(out: W, show_system: bool) -> Self {
        Self {
            out,
            show_system,
            streamed: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_event(&mut self, event: TurnEvent) -> std::io::Result<()> {
        match event {
            TurnEvent::Opened { handle, turn } | TurnEvent::Updated { handle, turn } => {
                if let ConversationTurn::AssistantMessage { text, reasoning } = &turn {
                    self.write_delta(handle, text, reasoning.as_deref())?;
                }
            }
            TurnEvent::Finalized { handle, turn } => {
                if let ConversationTurn::AssistantMessage { text, reasoning } = &turn {
                    if self.streamed.contains_key(&handle) {
                        self.write_delta(handle, text, reasoning.as_deref())?;
                        self.streamed.remove(&handle);
                        writeln!(self.out)?;
                        return self.out.flush();
                    }
                }
                self.write_final(&turn)?;
            }
            TurnEvent::Retracted { handle } => {
                if self.streamed.remove(&handle).is_some() {
                    writeln!(self.out)?;
                    writeln!(self.out, "{RETRACTED_MARKER}")?;
                }
            }
        }
        self.out.flush()
    }

    fn write_delta(
        &mut self,
        handle: TurnHandle,
        text: &str,
        reasoning: Option<&str>,
    ) -> std::io::Result<()> {
        let written = self.streamed.entry(handle).or_insert(0);
        if *written == 0 && !text.is_empty() {
            if let Some(reasoning) = reasoning {
                writeln!(self.out, "  (thinking) {reasoning}")?;
            }
            write!(self.out, "agent> ")?;
        }
        match text.get(*written..) {
            Some(rest) if !rest.is_empty() => {
                write!(self.out, "{rest}")?;
                *written = text.len();
            }
            Some(_) => {}
            None => {
                // Updates only ever extend the text; anything else restarts the line.
                writeln!(self.out)?;
                write!(self.out, "agent> {text}")?;
                *written = text.len();
            }
        }
        Ok(())
    }

    fn write_final(&mut self, turn: &ConversationTurn) -> std::io::Result<()> {
        match turn {
            ConversationTurn::UserMessage { text } => writeln!(self.out, "you> {text}"),
            ConversationTurn::AssistantMessage { text, reasoning } => {
                self.write_reasoning(reasoning.as_deref())?;
                writeln!(self.out, "agent> {text}")
            }
            ConversationTurn::ToolInteraction(interaction) => self.write_tool(interaction),
            ConversationTurn::SystemNotice { payload } => {
                if self.show_system {
                    writeln!(self.out, "[system] {payload}")
                } else {
                    Ok(())
                }
            }
            ConversationTurn::RateLimitNotice { reason } => {
                writeln!(self.out, "[rate limited] {reason}")
            }
            ConversationTurn::ApprovalRequest {
                tool_name,
                args,
                request_id,
            } => writeln!(
                self.out,
                "[approval needed] {tool_name}({}) request {request_id}",
                compact(args)
            ),
        }
    }

    fn write_reasoning(&mut self, reasoning: Option<&str>) -> std::io::Result<()> {
        match reasoning {
            Some(reasoning) => writeln!(self.out, "  (thinking) {reasoning}"),
            None => Ok(()),
        }
    }

    fn write_tool(&mut self, interaction: &ToolInteraction) -> std::io::Result<()> {
        self.write_reasoning(interaction.reasoning.as_deref())?;
        write!(
            self.out,
            "  tool {}({})",
            interaction.tool_name,
            compact(&interaction.args)
        )?;
        match &interaction.result {
            Some(result) => writeln!(self.out, " -> {}", compact(result)),
            None if interaction.pending => writeln!(self.out, " -> (no result)"),
            None => writeln!(self.out),
        }
    }
}

impl<W: Write> PresentationSink for PlainTextSink<W> {
    fn present(&mut self, event: TurnEvent) {
        if let Err(error) = self.write_event(event) {
            warn!(%error, "failed to write turn");
        }
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_api::AgentChunk;
    use conversation::{Conversation, ConversationConfig, StreamSession};
    use agent_transport_mock::{ScriptedFailure, ScriptedTransport, StreamScript};
    use serde_json::json;

    fn rendered(sink: PlainTextSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).expect("utf8 output")
    }

    #[tokio::test]
    async fn streamed_reply_is_written_once() {
        let transport = ScriptedTransport::new().with_stream(StreamScript::completes(vec![
            AgentChunk::token("Hel"),
            AgentChunk::token("lo"),
            AgentChunk::stop("end_turn"),
        ]));
        let mut conversation = Conversation::new(transport, ConversationConfig::default());
        let mut sink = PlainTextSink::new(Vec::new(), false);

        conversation
            .send_message("hi", &mut sink)
            .await
            .expect("send succeeds");

        assert_eq!(rendered(sink), "you> hi\nagent> Hello\n");
    }

    #[test]
    fn assistant_reasoning_renders_like_tool_reasoning() {
        let mut events = Vec::new();
        let mut session = StreamSession::new(1);
        session.fold_all(
            vec![
                AgentChunk::reasoning("Checking notes."),
                AgentChunk::token("Found "),
                AgentChunk::token("it."),
                AgentChunk::stop("end_turn"),
            ],
            &mut events,
        );
        let mut streamed = PlainTextSink::new(Vec::new(), false);
        for event in events {
            streamed.present(event);
        }

        let mut finalized = PlainTextSink::new(Vec::new(), false);
        finalized
            .write_final(&ConversationTurn::AssistantMessage {
                text: "Found it.".to_string(),
                reasoning: Some("Checking notes.".to_string()),
            })
            .expect("write");

        let expected = "  (thinking) Checking notes.\nagent> Found it.\n";
        assert_eq!(rendered(streamed), expected);
        assert_eq!(rendered(finalized), expected);
    }

    #[tokio::test]
    async fn fallback_marks_retracted_output_and_prints_replay() {
        let transport = ScriptedTransport::new()
            .with_stream(StreamScript::fails_after(
                vec![AgentChunk::token("Partial")],
                ScriptedFailure::Disconnect,
            ))
            .with_batch(vec![
                AgentChunk::assistant("Full reply"),
                AgentChunk::stop("end_turn"),
            ]);
        let mut conversation = Conversation::new(transport, ConversationConfig::default());
        let mut sink = PlainTextSink::new(Vec::new(), false);

        conversation
            .send_message("hi", &mut sink)
            .await
            .expect("fallback succeeds");

        let output = rendered(sink);
        assert!(output.contains("agent> Partial\n[retracted: replaying reply]\n"));
        assert!(output.ends_with("agent> Full reply\n"));
    }

    #[test]
    fn tool_interactions_render_on_one_line() {
        let mut sink = PlainTextSink::new(Vec::new(), false);
        let mut events = Vec::new();
        let mut session = StreamSession::new(1);
        session.fold(
            AgentChunk::tool_call("c1", Some("search"), "{\"q\":\"rust\"}"),
            &mut events,
        );
        session.fold(AgentChunk::tool_return("c1", json!("3 hits")), &mut events);
        for event in events {
            sink.present(event);
        }

        assert_eq!(rendered(sink), "  tool search({\"q\":\"rust\"}) -> 3 hits\n");
    }

    #[test]
    fn system_notices_are_hidden_unless_enabled() {
        let notice = ConversationTurn::SystemNotice {
            payload: "memory updated".to_string(),
        };

        let mut hidden = PlainTextSink::new(Vec::new(), false);
        hidden.write_final(&notice).expect("write");
        assert_eq!(rendered(hidden), "");

        let mut shown = PlainTextSink::new(Vec::new(), true);
        shown.write_final(&notice).expect("write");
        assert_eq!(rendered(shown), "[system] memory updated\n");
    }

    #[test]
    fn rate_limit_and_approval_are_labelled() {
        let mut sink = PlainTextSink::new(Vec::new(), false);
        sink.write_final(&ConversationTurn::RateLimitNotice {
            reason: "slow down".to_string(),
        })
        .expect("write");
        sink.write_final(&ConversationTurn::ApprovalRequest {
            tool_name: "shell".to_string(),
            args: json!({"cmd": "ls"}),
            request_id: "req-1".to_string(),
        })
        .expect("write");

        assert_eq!(
            rendered(sink),
            "[rate limited] slow down\n[approval needed] shell({\"cmd\":\"ls\"}) request req-1\n"
        );
    }
}
