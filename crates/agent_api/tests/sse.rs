use agent_api::{AgentChunk, SseFrame, SseStreamParser};
use pretty_assertions::assert_eq;
use serde_json::json;

fn chunks(frames: Vec<SseFrame>) -> Vec<AgentChunk> {
    frames
        .into_iter()
        .filter_map(|frame| match frame {
            SseFrame::Chunk(chunk) => Some(chunk),
            SseFrame::Failed(_) => None,
        })
        .collect()
}

#[test]
fn sse_framing_decodes_every_wire_tag() {
    let payload = concat!(
        "data: {\"message_type\":\"heartbeat\"}\n\n",
        "data: {\"message_type\":\"reasoning_message\",\"reasoning\":\"checking notes\"}\n\n",
        "data: {\"message_type\":\"tool_call_message\",\"tool_call\":{\"tool_call_id\":\"9\",\"name\":\"search_vault\",\"arguments\":\"{\\\"term\\\":\\\"foo\\\"}\"}}\n\n",
        "data: {\"message_type\":\"tool_return_message\",\"tool_call_id\":\"9\",\"tool_return\":[\"a.md\",\"b.md\"],\"status\":\"success\"}\n\n",
        "data: {\"message_type\":\"assistant_message\",\"content\":\"Found 2 matches.\"}\n\n",
        "data: {\"message_type\":\"system_alert\",\"message\":\"context window nearly full\"}\n\n",
        "data: {\"message_type\":\"login\"}\n\n",
        "data: {\"message_type\":\"approval_request_message\",\"id\":\"req-1\",\"tool_call\":{\"name\":\"delete_note\",\"arguments\":\"{}\"}}\n\n",
        "data: {\"message_type\":\"stop_reason\",\"stop_reason\":\"end_turn\"}\n\n",
        "data: {\"message_type\":\"usage_statistics\",\"total_tokens\":42}\n\n",
        "data: [DONE]\n\n",
    );

    let decoded = chunks(SseStreamParser::parse_frames(payload));
    let categories: Vec<&str> = decoded.iter().map(|chunk| chunk.category().as_str()).collect();

    assert_eq!(
        categories,
        vec![
            "heartbeat",
            "reasoning",
            "tool_call",
            "tool_return",
            "assistant_text",
            "system_alert",
            "login",
            "approval_request",
            "stop_signal",
            "usage_stats",
        ]
    );
    assert_eq!(
        decoded[3],
        AgentChunk::ToolReturn {
            call_id: Some("9".to_owned()),
            result: json!(["a.md", "b.md"]),
            status: Some("success".to_owned()),
        }
    );
}

#[test]
fn sse_parser_skips_malformed_and_counts_them() {
    let mut parser = SseStreamParser::default();
    let frames = parser.feed(
        concat!(
            "data: {broken-json\n\n",
            "data: {\"message_type\":\"reasoning_message\"}\n\n",
            "data: {\"message_type\":\"assistant_message_token\",\"token\":\"x\"}\n\n",
        )
        .as_bytes(),
    );

    assert_eq!(chunks(frames), vec![AgentChunk::token("x")]);
    assert_eq!(parser.malformed_count(), 2);
}

#[test]
fn sse_parser_keeps_unknown_tags_for_recovery() {
    let frames = SseStreamParser::parse_frames(
        "data: {\"message_type\":\"hidden_reasoning_message\",\"text\":\"...\"}\n\n",
    );
    assert!(matches!(
        chunks(frames).as_slice(),
        [AgentChunk::Unknown { tag: Some(tag), .. }] if tag == "hidden_reasoning_message"
    ));
}

#[test]
fn sse_parser_handles_split_frames_incrementally() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"message_type\":\"assistant_message_token\",\"tok")
        .is_empty());
    assert!(!parser.is_empty_buffer());
    let frames = parser.feed(b"en\":\"abc\"}\n\n");
    assert_eq!(chunks(frames), vec![AgentChunk::token("abc")]);
}

#[test]
fn sse_parser_skips_comments_and_sentinels() {
    let payload = concat!(
        ": keep-alive comment\n\n",
        "data: [DONE_GEN]\n\n",
        "data: [DONE_STEP]\n\n",
        "data: \n\n",
        "data: {\"message_type\":\"assistant_message_token\",\"token\":\"done\"}\n\n"
    );
    assert_eq!(
        chunks(SseStreamParser::parse_frames(payload)),
        vec![AgentChunk::token("done")]
    );
}

#[test]
fn sse_parser_reassembles_characters_split_across_feeds() {
    let payload = "data: {\"message_type\":\"assistant_message_token\",\"token\":\"café 😀\"}\n\n";
    let bytes = payload.as_bytes();
    let accent = payload.find('é').expect("accent present");
    let emoji = payload.find('😀').expect("emoji present");

    for split in [accent + 1, emoji + 1, emoji + 3] {
        let mut parser = SseStreamParser::default();
        let mut frames = parser.feed(&bytes[..split]);
        assert!(frames.is_empty());
        frames.extend(parser.feed(&bytes[split..]));

        assert_eq!(chunks(frames), vec![AgentChunk::token("café 😀")]);
        assert!(parser.is_empty_buffer());
    }
}

#[test]
fn sse_parser_byte_at_a_time_matches_whole_body() {
    let payload = "data: {\"message_type\":\"assistant_message\",\"content\":\"naïve résumé\"}\n\n";
    let mut parser = SseStreamParser::default();
    let mut frames = Vec::new();
    for byte in payload.as_bytes() {
        frames.extend(parser.feed(std::slice::from_ref(byte)));
    }

    assert_eq!(frames, SseStreamParser::parse_frames(payload));
    assert_eq!(chunks(frames), vec![AgentChunk::assistant("naïve résumé")]);
}
