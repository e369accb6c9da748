//! Shared fixtures for the provider switch scenarios.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use indoc::indoc;
use messages::{
    ContentPart, FetchedImage, ImageFetcher, ToolOutput, UnifiedMessage, UnifiedToolDefinition,
    legacy::StoredMessage,
};
use serde_json::json;

/// The canonical four message exchange recorded against an OpenAI model.
pub fn openai_weather_history() -> Vec<UnifiedMessage> {
    vec![
        UnifiedMessage::user("What's the weather in Paris?"),
        UnifiedMessage::assistant(vec![
            ContentPart::text("Let me check."),
            ContentPart::tool_call("call_abc123", "get_weather", json!({"city": "Paris"})),
        ]),
        UnifiedMessage::tool_output(
            "call_abc123",
            "get_weather",
            ToolOutput::Json(json!({"temperature": 18, "unit": "C"})),
        ),
        UnifiedMessage::assistant("It's 18°C in Paris."),
    ]
}

/// A history with two parallel calls of the same function.
pub fn parallel_search_history() -> Vec<UnifiedMessage> {
    vec![
        UnifiedMessage::system("You are a research assistant."),
        UnifiedMessage::user("Compare Rust and Go adoption."),
        UnifiedMessage::assistant(vec![
            ContentPart::tool_call("toolu_01", "search", json!({"query": "rust adoption"})),
            ContentPart::tool_call("toolu_02", "search", json!({"query": "go adoption"})),
        ]),
        UnifiedMessage::user(vec![
            ContentPart::tool_result("toolu_01", "search", ToolOutput::Text("Rust: growing".to_string())),
            ContentPart::tool_result("toolu_02", "search", ToolOutput::Text("Go: stable".to_string())),
        ]),
        UnifiedMessage::assistant("Rust is growing, Go is stable."),
    ]
}

pub fn weather_tool() -> UnifiedToolDefinition {
    UnifiedToolDefinition {
        name: "get_weather".to_string(),
        description: Some("Current weather for a city".to_string()),
        input_schema: json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "city": {"type": "string", "format": "city-name"},
                "unit": {"type": "string", "enum": ["C", "F"], "default": "C"}
            },
            "required": ["city"]
        }),
    }
}

/// Stored records as the conversation store persists them.
pub fn stored_records() -> Vec<StoredMessage> {
    let records = indoc! {r#"
        [
          {"role": "system", "content": "Be concise."},
          {"role": "user", "content": "Weather in Paris and Rome?"},
          {
            "role": "assistant",
            "content": "Checking both.",
            "toolCalls": [
              {"id": "call_1", "name": "get_weather", "input": {"city": "Paris"}},
              {"id": "call_2", "name": "get_weather", "input": "{\"city\":\"Rome\"}"}
            ],
            "toolResults": [
              {"callId": "call_1", "name": "get_weather", "result": "18C", "success": true},
              {"callId": "call_2", "name": "get_weather", "result": "service unavailable", "success": false}
            ]
          },
          {"role": "assistant", "content": "Paris is 18C, Rome is unknown."}
        ]
    "#};

    serde_json::from_str(records).expect("stored record fixture is valid")
}

/// Tool call ids in history order.
pub fn tool_call_ids(messages: &[UnifiedMessage]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|message| message.extract_tool_calls())
        .map(|call| call.id.to_string())
        .collect()
}

/// Ids carried by tool results in history order.
pub fn tool_result_ids(messages: &[UnifiedMessage]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|message| message.tool_results())
        .filter_map(|result| result.tool_call_id.map(str::to_string))
        .collect()
}

/// Ids Anthropic accepts for `tool_use` blocks.
pub fn is_anthropic_tool_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Serves a fixed image body and records what was asked for.
#[derive(Default)]
pub struct RecordingFetcher {
    requested: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    pub const BODY: &'static [u8] = b"\x89PNG fake";

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("fetcher lock").clone()
    }
}

#[async_trait]
impl ImageFetcher for RecordingFetcher {
    async fn fetch(&self, url: &str) -> messages::Result<FetchedImage> {
        self.requested.lock().expect("fetcher lock").push(url.to_string());

        Ok(FetchedImage {
            data: STANDARD.encode(Self::BODY),
            media_type: "image/png".to_string(),
        })
    }
}
