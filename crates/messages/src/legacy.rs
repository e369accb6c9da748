//! Bridges to the message shapes applications already persist.
//!
//! [`Message`] is the chat-completions style record that older code passes around,
//! [`StoredMessage`] is the conversation store's row format where an assistant
//! record carries its own tool calls and their results.

use std::collections::{HashMap, HashSet};

use config::HistoryConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    image::{guess_media_type, parse_data_url},
    provider::reasoning_annotation,
    unified::{ContentPart, MessageContent, Role, ToolOutput, UnifiedMessage, UnifiedResponse},
};

/// Legacy chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: LegacyContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyContent {
    Text(String),
    Blocks(Vec<LegacyBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyBlock {
    Text { text: String },
    ImageUrl { image_url: LegacyImageUrl },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyImageUrl {
    /// Either a remote URL or a base64 `data:` URL.
    pub url: String,
}

/// Lifts a legacy message into the unified model.
pub fn to_unified(message: &Message) -> UnifiedMessage {
    if message.role == Role::Tool {
        let text = match &message.content {
            LegacyContent::Text(text) => text.clone(),
            LegacyContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    LegacyBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        };

        return UnifiedMessage {
            role: Role::Tool,
            content: MessageContent::Text(text),
            tool_call_id: message.tool_call_id.clone(),
            tool_name: message.name.clone(),
        };
    }

    let content = match &message.content {
        LegacyContent::Text(text) => MessageContent::Text(text.clone()),
        LegacyContent::Blocks(blocks) => MessageContent::Parts(blocks.iter().map(block_to_part).collect()),
    };

    UnifiedMessage::new(message.role, content)
}

/// Lowers a unified message into the legacy shape.
///
/// Lossy for parts the legacy shape has no slot for: reasoning becomes a
/// `[Reasoning: …]` text block and tool results inside non-tool messages become
/// their text.
pub fn from_unified(message: &UnifiedMessage) -> Message {
    if message.role == Role::Tool {
        let result = message.tool_results().into_iter().next();

        let (tool_call_id, name, text) = match result {
            Some(result) => (
                result.tool_call_id.map(str::to_string),
                result.tool_name.map(str::to_string),
                result.output.to_text().into_owned(),
            ),
            None => (message.tool_call_id.clone(), message.tool_name.clone(), message.extract_text()),
        };

        return Message {
            role: Role::Tool,
            content: LegacyContent::Text(text),
            tool_call_id,
            name,
        };
    }

    let content = match &message.content {
        MessageContent::Text(text) => LegacyContent::Text(text.clone()),
        MessageContent::Parts(parts) => LegacyContent::Blocks(parts.iter().map(part_to_block).collect()),
    };

    Message {
        role: message.role,
        content,
        tool_call_id: None,
        name: None,
    }
}

fn block_to_part(block: &LegacyBlock) -> ContentPart {
    match block {
        LegacyBlock::Text { text } => ContentPart::text(text.clone()),
        LegacyBlock::ImageUrl { image_url } => match parse_data_url(&image_url.url) {
            Some((media_type, data)) => ContentPart::Image {
                data: data.to_string(),
                media_type: media_type.to_string(),
                url: None,
            },
            None => ContentPart::Image {
                data: String::new(),
                media_type: guess_media_type(&image_url.url).to_string(),
                url: Some(image_url.url.clone()),
            },
        },
        LegacyBlock::ToolUse { id, name, input } => ContentPart::tool_call(id.clone(), name.clone(), input.clone()),
    }
}

fn part_to_block(part: &ContentPart) -> LegacyBlock {
    match part {
        ContentPart::Text { text } => LegacyBlock::Text { text: text.clone() },
        ContentPart::Image { data, media_type, url } => {
            let url = match url {
                Some(url) => url.clone(),
                None => format!("data:{media_type};base64,{data}"),
            };

            LegacyBlock::ImageUrl {
                image_url: LegacyImageUrl { url },
            }
        }
        ContentPart::ToolCall {
            tool_call_id,
            tool_name,
            input,
        } => LegacyBlock::ToolUse {
            id: tool_call_id.clone(),
            name: tool_name.clone(),
            input: input.clone(),
        },
        ContentPart::ToolResult { output, .. } => LegacyBlock::Text {
            text: output.to_text().into_owned(),
        },
        ContentPart::Reasoning { text, .. } => LegacyBlock::Text {
            text: reasoning_annotation(text),
        },
    }
}

/// A conversation record as the application stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StoredToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<StoredToolResult>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub result: Value,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl StoredToolResult {
    fn output(&self) -> ToolOutput {
        let text = || match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        match (&self.result, self.success) {
            (_, false) => ToolOutput::Error(text()),
            (Value::String(text), true) => ToolOutput::Text(text.clone()),
            (value, true) => ToolOutput::Json(value.clone()),
        }
    }

    fn from_output(call_id: Option<&str>, name: Option<&str>, output: &ToolOutput) -> Self {
        let (result, success) = match output {
            ToolOutput::Text(text) => (Value::String(text.clone()), true),
            ToolOutput::Json(value) => (value.clone(), true),
            ToolOutput::Error(text) => (Value::String(text.clone()), false),
        };

        Self {
            call_id: call_id.map(str::to_string),
            name: name.map(str::to_string),
            result,
            success,
        }
    }
}

impl From<UnifiedResponse> for StoredMessage {
    fn from(response: UnifiedResponse) -> Self {
        let tool_calls = stored_calls(&response.content);

        Self {
            role: Role::Assistant,
            content: response.text(),
            tool_calls,
            tool_results: None,
        }
    }
}

/// Rebuilds ordered unified history from stored records.
///
/// Each record's results follow it as `tool` messages. Corrupted pairings are
/// logged and skipped, never fatal.
pub fn reconstruct_history(records: &[StoredMessage], config: &HistoryConfig) -> Vec<UnifiedMessage> {
    let limit = config.max_tool_parts_per_message.max(1);
    let mut messages = Vec::with_capacity(records.len());
    // Kept call ids of every record so far, with their function names.
    let mut known_calls: HashMap<&str, &str> = HashMap::new();
    let mut truncated: HashSet<&str> = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let calls = record.tool_calls.as_deref().unwrap_or_default();
        let results = record.tool_results.as_deref().unwrap_or_default();

        if calls.len() > limit {
            log::warn!(
                "Truncating {} tool calls of stored record {index} to the configured limit of {limit}",
                calls.len()
            );
        }

        if results.len() > limit {
            log::warn!(
                "Truncating {} tool results of stored record {index} to the configured limit of {limit}",
                results.len()
            );
        }

        let (kept_calls, truncated_calls) = calls.split_at(calls.len().min(limit));

        if kept_calls.is_empty() {
            if !record.content.is_empty() || results.is_empty() {
                messages.push(UnifiedMessage::new(record.role, record.content.clone()));
            }
        } else {
            let mut parts = Vec::with_capacity(kept_calls.len() + 1);

            if !record.content.is_empty() {
                parts.push(ContentPart::text(record.content.clone()));
            }

            parts.extend(
                kept_calls
                    .iter()
                    .map(|call| ContentPart::tool_call(call.id.clone(), call.name.clone(), stored_input(call))),
            );

            messages.push(UnifiedMessage::new(record.role, parts));
        }

        if !calls.is_empty() && results.len() > calls.len() {
            log::error!(
                "Corrupted stored record {index}: {} tool results for {} tool calls",
                results.len(),
                calls.len()
            );
        }

        known_calls.extend(kept_calls.iter().map(|call| (call.id.as_str(), call.name.as_str())));

        truncated.extend(truncated_calls.iter().map(|call| call.id.as_str()));
        let mut answered: HashSet<&str> = HashSet::new();

        for result in results.iter().take(limit) {
            let (id, call_name) = match result.call_id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) if truncated.contains(id) => continue,
                Some(id) => match known_calls.get_key_value(id) {
                    Some((&id, &name)) => (id, name),
                    None => {
                        log::error!("Corrupted stored record {index}: tool result for unknown call {id}, skipping it");
                        continue;
                    }
                },
                None => {
                    log::error!("Corrupted stored record {index}: tool result without a call id");

                    // Recover the oldest unanswered call of the same name, if any.
                    let Some(call) = result.name.as_deref().and_then(|name| {
                        kept_calls
                            .iter()
                            .find(|call| call.name == name && !answered.contains(call.id.as_str()))
                    }) else {
                        continue;
                    };

                    (call.id.as_str(), call.name.as_str())
                }
            };

            answered.insert(id);

            let name = result
                .name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(call_name);

            messages.push(UnifiedMessage::tool_output(id, name, result.output()));
        }
    }

    messages
}

/// Folds unified history back into stored records.
///
/// Tool results attach to the preceding assistant record. A result with no
/// assistant record before it is kept in a record of its own.
pub fn to_stored_records(messages: &[UnifiedMessage]) -> Vec<StoredMessage> {
    let mut records: Vec<StoredMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        let results: Vec<_> = message
            .tool_results()
            .iter()
            .map(|result| StoredToolResult::from_output(result.tool_call_id, result.tool_name, &result.output))
            .collect();

        if !results.is_empty() {
            match records.last_mut() {
                Some(record) if record.role == Role::Assistant => {
                    record.tool_results.get_or_insert_with(Vec::new).extend(results);
                }
                _ => {
                    log::warn!("Tool result without a preceding assistant message, storing it separately");

                    records.push(StoredMessage {
                        role: Role::Tool,
                        content: String::new(),
                        tool_calls: None,
                        tool_results: Some(results),
                    });
                }
            }

            // Text sent alongside results in a user turn is kept as its own record.
            let text = message.extract_text();

            if message.role != Role::Tool && !text.is_empty() {
                records.push(StoredMessage {
                    role: message.role,
                    content: text,
                    tool_calls: None,
                    tool_results: None,
                });
            }

            continue;
        }

        records.push(StoredMessage {
            role: message.role,
            content: message.extract_text(),
            tool_calls: stored_calls(&message.content.parts()),
            tool_results: None,
        });
    }

    records
}

fn stored_calls(parts: &[ContentPart]) -> Option<Vec<StoredToolCall>> {
    let calls: Vec<_> = parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => Some(StoredToolCall {
                id: tool_call_id.clone(),
                name: tool_name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect();

    (!calls.is_empty()).then_some(calls)
}

/// Stored inputs were sometimes persisted as the raw arguments string.
fn stored_input(call: &StoredToolCall) -> Value {
    match &call.input {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                log::warn!("Stored tool call {} has unparsable arguments, keeping them verbatim", call.id);
                call.input.clone()
            }
        },
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}
