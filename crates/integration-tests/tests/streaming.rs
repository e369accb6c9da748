use messages::{
    Error, FinishReason, StreamChunk, StreamDecoder, ToolCallTracker,
    provider::{anthropic::AnthropicStreamDecoder, google::GoogleStreamDecoder, openai::OpenAiStreamDecoder},
};
use serde_json::json;

fn decode_all<D: StreamDecoder>(decoder: &mut D, events: &[&str]) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    for event in events {
        chunks.extend(decoder.decode_stream_json(event).unwrap());
    }

    chunks.extend(decoder.finish());
    chunks
}

#[test]
fn openai_tool_call_fragments() {
    let events = [
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Checking"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"get_weather","arguments":""}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":20,"completion_tokens":9,"total_tokens":29}}"#,
    ];

    let chunks = decode_all(&mut OpenAiStreamDecoder::new(), &events);

    insta::assert_json_snapshot!(chunks, @r#"
    [
      {
        "type": "text",
        "delta": "Checking"
      },
      {
        "type": "tool-call-delta",
        "toolCallId": "call_9",
        "toolName": "get_weather",
        "argumentsDelta": ""
      },
      {
        "type": "tool-call-delta",
        "toolCallId": "call_9",
        "argumentsDelta": "{\"city\":"
      },
      {
        "type": "tool-call-delta",
        "toolCallId": "call_9",
        "argumentsDelta": "\"Paris\"}"
      },
      {
        "type": "tool-call",
        "toolCallId": "call_9",
        "toolName": "get_weather",
        "input": {
          "city": "Paris"
        }
      },
      {
        "type": "done",
        "finishReason": "tool-calls",
        "hasToolCalls": true,
        "usage": {
          "inputTokens": 20,
          "outputTokens": 9,
          "totalTokens": 29
        }
      }
    ]
    "#);
}

#[test]
fn openai_stream_cut_short() {
    let events = [
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":"{\"q\": \"ru"}}]}}]}"#,
    ];

    let chunks = decode_all(&mut OpenAiStreamDecoder::new(), &events);

    assert_eq!(chunks.len(), 2);
    assert!(matches!(chunks[0], StreamChunk::ToolCallDelta { .. }));
    assert_eq!(
        chunks[1],
        StreamChunk::Done {
            finish_reason: FinishReason::Other,
            has_tool_calls: false,
            usage: None,
        }
    );
}

#[test]
fn anthropic_thinking_and_tool_use() {
    let events = [
        r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude-sonnet-4","usage":{"input_tokens":25,"output_tokens":1}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Need the weather."}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig_1"}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"ping"}"#,
        r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather","input":{}}}"#,
        r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\": \"Par"}}"#,
        r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"is\"}"}}"#,
        r#"{"type":"content_block_stop","index":1}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":40}}"#,
        r#"{"type":"message_stop"}"#,
    ];

    let chunks = decode_all(&mut AnthropicStreamDecoder::new(), &events);

    insta::assert_json_snapshot!(chunks, @r#"
    [
      {
        "type": "reasoning",
        "delta": "Need the weather."
      },
      {
        "type": "reasoning",
        "delta": "",
        "signature": "sig_1"
      },
      {
        "type": "tool-call-delta",
        "toolCallId": "toolu_1",
        "argumentsDelta": "{\"city\": \"Par"
      },
      {
        "type": "tool-call-delta",
        "toolCallId": "toolu_1",
        "argumentsDelta": "is\"}"
      },
      {
        "type": "tool-call",
        "toolCallId": "toolu_1",
        "toolName": "get_weather",
        "input": {
          "city": "Paris"
        }
      },
      {
        "type": "done",
        "finishReason": "tool-calls",
        "hasToolCalls": true,
        "usage": {
          "inputTokens": 25,
          "outputTokens": 40,
          "totalTokens": 65
        }
      }
    ]
    "#);
}

#[test]
fn anthropic_error_event_ends_the_stream() {
    let events = [
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
    ];

    let chunks = decode_all(&mut AnthropicStreamDecoder::new(), &events);

    assert_eq!(
        chunks,
        vec![
            StreamChunk::Text {
                delta: "Hel".to_string()
            },
            StreamChunk::Done {
                finish_reason: FinishReason::Error,
                has_tool_calls: false,
                usage: None,
            },
        ]
    );
}

#[test]
fn malformed_event_is_an_error() {
    let error = AnthropicStreamDecoder::new()
        .decode_stream_json(r#"{"type":"content_block_delta","index":0"#)
        .unwrap_err();

    assert!(matches!(error, Error::InvalidResponse { provider: "Anthropic", .. }));
}

#[test]
fn gemini_calls_get_tracker_ids() {
    let mut tracker = ToolCallTracker::new();

    let events = [
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Let me check"}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_weather","args":{"city":"Paris"}}}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5,"totalTokenCount":15}}"#,
    ];

    let chunks = {
        let mut decoder = GoogleStreamDecoder::new(&mut tracker);
        decode_all(&mut decoder, &events)
    };

    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks[0],
        StreamChunk::Text {
            delta: "Let me check".to_string()
        }
    );

    let StreamChunk::ToolCall {
        tool_call_id,
        tool_name,
        input,
    } = &chunks[1]
    else {
        unreachable!("expected a tool call, got {:?}", chunks[1]);
    };

    assert_eq!(tool_name, "get_weather");
    assert_eq!(input, &json!({"city": "Paris"}));
    assert!(tool_call_id.starts_with("call_get_weather_1_"), "{tool_call_id}");

    assert!(matches!(
        chunks[2],
        StreamChunk::Done {
            finish_reason: FinishReason::ToolCalls,
            has_tool_calls: true,
            usage: Some(_),
        }
    ));

    // The application's result is paired by name with the streamed call.
    assert_eq!(tracker.correlate("get_weather"), Some(tool_call_id.as_str()));
    assert!(tracker.mark_used(tool_call_id));
    assert_eq!(tracker.pending_count(), 0);
}
