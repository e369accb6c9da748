use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    provider::{EncodedMessages, Encoder, reasoning_annotation, tool_input_object},
    unified::{ContentPart, MessageContent, Role, ToolResultRef, UnifiedMessage, UnifiedToolDefinition},
};

/// Anthropic only knows two conversational roles. System content lives in a
/// top-level field and tool results travel inside user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnthropicRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicMessage {
    pub role: AnthropicRole,
    pub content: AnthropicMessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnthropicMessageContent {
    Text(String),
    Blocks(Vec<AnthropicBlock>),
}

/// Content block of a request message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        /// Must match `^[a-zA-Z0-9_-]+$`.
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Extended thinking echoed back from an earlier turn.
    Thinking {
        thinking: String,
        signature: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Encodes unified history for the Messages API.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicEncoder;

#[async_trait]
impl Encoder for AnthropicEncoder {
    type Message = AnthropicMessage;
    type System = String;
    type Tool = AnthropicTool;

    async fn encode_messages(&self, messages: &[UnifiedMessage]) -> EncodedMessages<AnthropicMessage, String> {
        let mut system = Vec::new();
        let mut encoded = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::System => {
                    let text = message.extract_text();

                    if !text.is_empty() {
                        system.push(text);
                    }
                }
                Role::User => encode_user_message(message, &mut encoded),
                Role::Assistant => encode_assistant_message(message, &mut encoded),
                Role::Tool => push_tool_results(message.tool_results(), &mut encoded),
            }
        }

        EncodedMessages {
            messages: encoded,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
        }
    }

    fn encode_tools(&self, tools: &[UnifiedToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }
}

fn image_block(data: &str, media_type: &str, url: Option<&str>) -> AnthropicBlock {
    let source = match url {
        Some(url) if !url.is_empty() => AnthropicImageSource::Url { url: url.to_string() },
        _ => AnthropicImageSource::Base64 {
            media_type: media_type.to_string(),
            data: data.to_string(),
        },
    };

    AnthropicBlock::Image { source }
}

fn text_block(text: impl Into<String>) -> AnthropicBlock {
    AnthropicBlock::Text { text: text.into() }
}

fn tool_result_blocks(results: Vec<ToolResultRef<'_>>) -> Vec<AnthropicBlock> {
    results
        .into_iter()
        .map(|result| {
            let tool_use_id = match result.tool_call_id {
                Some(id) => id.to_string(),
                None => {
                    log::warn!(
                        "Tool result for '{}' has no call id, Anthropic will reject the pairing",
                        result.tool_name.unwrap_or("unknown")
                    );
                    String::new()
                }
            };

            AnthropicBlock::ToolResult {
                tool_use_id,
                content: result.output.to_text().into_owned(),
                is_error: result.output.is_error().then_some(true),
            }
        })
        .collect()
}

/// Appends tool results, merging them into a directly preceding user message
/// that only holds results.
fn push_tool_results(results: Vec<ToolResultRef<'_>>, encoded: &mut Vec<AnthropicMessage>) {
    let blocks = tool_result_blocks(results);

    if blocks.is_empty() {
        return;
    }

    if let Some(AnthropicMessage {
        role: AnthropicRole::User,
        content: AnthropicMessageContent::Blocks(previous),
    }) = encoded.last_mut()
        && previous
            .iter()
            .all(|block| matches!(block, AnthropicBlock::ToolResult { .. }))
    {
        previous.extend(blocks);
        return;
    }

    encoded.push(AnthropicMessage {
        role: AnthropicRole::User,
        content: AnthropicMessageContent::Blocks(blocks),
    });
}

fn encode_user_message(message: &UnifiedMessage, encoded: &mut Vec<AnthropicMessage>) {
    let parts = match &message.content {
        MessageContent::Text(text) => {
            encoded.push(AnthropicMessage {
                role: AnthropicRole::User,
                content: AnthropicMessageContent::Text(text.clone()),
            });
            return;
        }
        MessageContent::Parts(parts) => parts,
    };

    // tool_result blocks have to lead the user turn that answers the calls.
    let mut blocks = tool_result_blocks(message.tool_results());

    for part in parts {
        match part {
            ContentPart::Text { text } => blocks.push(text_block(text.clone())),
            ContentPart::Image { data, media_type, url } => blocks.push(image_block(data, media_type, url.as_deref())),
            ContentPart::Reasoning { text, .. } => blocks.push(text_block(reasoning_annotation(text))),
            ContentPart::ToolCall { tool_name, .. } => blocks.push(text_block(format!("[Called tool \"{tool_name}\"]"))),
            ContentPart::ToolResult { .. } => (),
        }
    }

    encoded.push(AnthropicMessage {
        role: AnthropicRole::User,
        content: if blocks.is_empty() {
            AnthropicMessageContent::Text(String::new())
        } else {
            AnthropicMessageContent::Blocks(blocks)
        },
    });
}

fn encode_assistant_message(message: &UnifiedMessage, encoded: &mut Vec<AnthropicMessage>) {
    let parts = match &message.content {
        MessageContent::Text(text) => {
            encoded.push(AnthropicMessage {
                role: AnthropicRole::Assistant,
                content: AnthropicMessageContent::Text(text.clone()),
            });
            return;
        }
        MessageContent::Parts(parts) => parts,
    };

    let mut blocks = Vec::with_capacity(parts.len());

    for part in parts {
        match part {
            ContentPart::Text { text } => blocks.push(text_block(text.clone())),
            ContentPart::Reasoning {
                text,
                signature: Some(signature),
            } => blocks.push(AnthropicBlock::Thinking {
                thinking: text.clone(),
                signature: signature.clone(),
            }),
            ContentPart::Reasoning { text, signature: None } => blocks.push(text_block(reasoning_annotation(text))),
            ContentPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => blocks.push(AnthropicBlock::ToolUse {
                id: tool_call_id.clone(),
                name: tool_name.clone(),
                input: tool_input_object(tool_call_id, input),
            }),
            ContentPart::Image { url, .. } => {
                log::debug!("Assistant image content is not supported by Anthropic, keeping a placeholder");
                blocks.push(text_block(match url {
                    Some(url) => format!("[Image: {url}]"),
                    None => "[Image]".to_string(),
                }));
            }
            ContentPart::ToolResult { .. } => (),
        }
    }

    encoded.push(AnthropicMessage {
        role: AnthropicRole::Assistant,
        content: if blocks.is_empty() {
            AnthropicMessageContent::Text(String::new())
        } else {
            AnthropicMessageContent::Blocks(blocks)
        },
    });

    if parts.iter().any(ContentPart::is_tool_result) {
        push_tool_results(message.tool_results(), encoded);
    }
}
