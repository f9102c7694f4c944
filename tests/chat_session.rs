use agent_api::{AgentChunk, AgentSummary};
use agent_chat::{parse_command, ChatTransport, Command, PlainTextSink};
use agent_transport_mock::{ScriptedFailure, ScriptedTransport, StreamScript};
use conversation::{Conversation, ConversationConfig, SendMode};
use pretty_assertions::assert_eq;
use serde_json::json;

fn output(sink: PlainTextSink<Vec<u8>>) -> String {
    String::from_utf8(sink.into_inner()).expect("utf8 output")
}

#[tokio::test]
async fn echo_session_renders_user_and_agent_lines() {
    let mut conversation = Conversation::new(
        ChatTransport::Mock(ScriptedTransport::new()),
        ConversationConfig::default(),
    );
    let mut sink = PlainTextSink::new(Vec::new(), false);

    let Command::Send(text) = parse_command("  hello agent ") else {
        panic!("plain text should be sent");
    };
    let outcome = conversation
        .send_message(&text, &mut sink)
        .await
        .expect("echo send succeeds");

    assert_eq!(outcome.mode, SendMode::Streaming);
    assert_eq!(outcome.stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(
        output(sink),
        "you> hello agent\n  (thinking) Repeating the message back.\nagent> You said: hello agent\n"
    );
}

#[tokio::test]
async fn tool_round_trip_then_reply_after_fallback() {
    let transport = ScriptedTransport::new()
        .with_stream(StreamScript::fails_after(
            vec![
                AgentChunk::reasoning("Need the weather."),
                AgentChunk::tool_call("call-1", Some("weather"), "{\"city\":"),
            ],
            ScriptedFailure::Disconnect,
        ))
        .with_batch(vec![
            AgentChunk::reasoning("Need the weather."),
            AgentChunk::tool_call("call-1", Some("weather"), "{\"city\":\"Oslo\"}"),
            AgentChunk::tool_return("call-1", json!("rain")),
            AgentChunk::assistant("Bring an umbrella."),
            AgentChunk::stop("end_turn"),
        ]);
    let mut conversation =
        Conversation::new(ChatTransport::Mock(transport), ConversationConfig::default());
    let mut sink = PlainTextSink::new(Vec::new(), false);

    let outcome = conversation
        .send_message("weather in Oslo?", &mut sink)
        .await
        .expect("fallback succeeds");

    assert_eq!(outcome.mode, SendMode::Batch);
    assert_eq!(
        output(sink),
        "you> weather in Oslo?\n\
         \x20 (thinking) Need the weather.\n\
         \x20 tool weather({\"city\":\"Oslo\"}) -> rain\n\
         agent> Bring an umbrella.\n"
    );
}

#[tokio::test]
async fn rate_limit_prints_notice_and_keeps_session_usable() {
    let transport = ScriptedTransport::new().with_stream(StreamScript::fails(
        ScriptedFailure::rate_limited("Too many requests"),
    ));
    let mut conversation =
        Conversation::new(ChatTransport::Mock(transport), ConversationConfig::default());
    let mut sink = PlainTextSink::new(Vec::new(), false);

    let outcome = conversation
        .send_message("first", &mut sink)
        .await
        .expect("rate limit is reported, not raised");
    assert!(outcome.rate_limited);

    conversation
        .send_message("second", &mut sink)
        .await
        .expect("next send streams normally");

    let rendered = output(sink);
    assert!(rendered.starts_with("you> first\n[rate limited] "));
    assert!(rendered.ends_with(
        "you> second\n  (thinking) Repeating the message back.\nagent> You said: second\n"
    ));
}

#[tokio::test]
async fn history_and_agents_go_through_the_enum() {
    let transport = ScriptedTransport::new()
        .with_history(vec![
            AgentChunk::UserMessage {
                text: "earlier question".to_string(),
            },
            AgentChunk::assistant("earlier answer"),
        ])
        .with_agents(vec![AgentSummary {
            id: "agent-7".to_string(),
            name: Some("Helper".to_string()),
            description: None,
            model: None,
        }]);
    let mut conversation =
        Conversation::new(ChatTransport::Mock(transport), ConversationConfig::default());
    let mut sink = PlainTextSink::new(Vec::new(), false);

    let turns = conversation
        .load_history(&mut sink)
        .await
        .expect("history loads");
    assert_eq!(turns, 2);
    assert_eq!(output(sink), "you> earlier question\nagent> earlier answer\n");

    let agents = conversation.list_agents().await.expect("agents list");
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].id, "agent-7");
}
