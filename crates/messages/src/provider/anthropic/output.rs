use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    provider::{Decoder, StreamDecoder, parse_arguments},
    unified::{ContentPart, FinishReason, StreamChunk, UnifiedResponse, Usage},
};

/// Describes the type of content in an Anthropic message.
///
/// Used to distinguish between different content blocks in the response.
#[derive(Debug, Deserialize, PartialEq)]
pub enum ContentType {
    /// Plain text content.
    #[serde(rename = "text")]
    Text,
    /// Tool use request from the model.
    #[serde(rename = "tool_use")]
    ToolUse,
    /// Extended thinking output.
    #[serde(rename = "thinking")]
    Thinking,
    /// Thinking content encrypted by the safety systems.
    #[serde(rename = "redacted_thinking")]
    RedactedThinking,
    /// Any other content type not yet known.
    /// Captures the actual string value for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

/// The reason why the model stopped generating tokens.
#[derive(Debug, Deserialize, PartialEq)]
pub enum StopReason {
    /// The model reached a natural stopping point.
    #[serde(rename = "end_turn")]
    EndTurn,
    /// The generation exceeded the maximum token limit specified in the request.
    #[serde(rename = "max_tokens")]
    MaxTokens,
    /// The model encountered a stop sequence specified in the request.
    #[serde(rename = "stop_sequence")]
    StopSequence,
    /// The model invoked a tool.
    #[serde(rename = "tool_use")]
    ToolUse,
    /// The model paused its turn (for advanced use cases).
    #[serde(rename = "pause_turn")]
    PauseTurn,
    /// The model refused to generate content due to safety concerns.
    #[serde(rename = "refusal")]
    Refusal,
    /// Any other stop reason not yet known.
    /// Captures the actual string value for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

impl From<StopReason> for FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EndTurn | StopReason::StopSequence | StopReason::PauseTurn => FinishReason::Stop,
            StopReason::MaxTokens => FinishReason::Length,
            StopReason::ToolUse => FinishReason::ToolCalls,
            StopReason::Refusal => FinishReason::ContentFilter,
            StopReason::Other(reason) => {
                log::warn!("Unknown stop reason from Anthropic: {reason}");
                FinishReason::Other
            }
        }
    }
}

/// Response from Anthropic Messages API.
///
/// See the [Anthropic API Reference](https://docs.anthropic.com/en/api/messages).
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// Content blocks in the response.
    pub content: Vec<AnthropicContent>,

    /// The reason the model stopped generating.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    /// Billing and rate limit usage information.
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// A content block in an Anthropic message response.
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of this content block.
    pub r#type: ContentType,

    /// Text content if this is a text block.
    #[serde(default)]
    pub text: Option<String>,

    /// Unique identifier for tool use blocks.
    /// Format: "toolu_{alphanumeric}"
    #[serde(default)]
    pub id: Option<String>,

    /// Name of the tool being called.
    #[serde(default)]
    pub name: Option<String>,

    /// Input arguments for the tool as JSON.
    #[serde(default)]
    pub input: Option<Value>,

    /// Thinking text of a thinking block.
    #[serde(default)]
    pub thinking: Option<String>,

    /// Verification token of a thinking block.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Token usage information for an Anthropic API request.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct AnthropicUsage {
    /// Number of tokens in the input prompt.
    /// In streaming message_delta events, this field may be omitted.
    #[serde(default)]
    pub input_tokens: u32,

    /// Number of tokens generated in the response.
    #[serde(default)]
    pub output_tokens: u32,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

/// Decodes Messages API responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicDecoder;

impl Decoder for AnthropicDecoder {
    const PROVIDER: &'static str = "Anthropic";

    type Response = AnthropicResponse;

    fn decode_response(&mut self, response: AnthropicResponse) -> UnifiedResponse {
        let mut content = Vec::with_capacity(response.content.len());

        for block in response.content {
            match block.r#type {
                ContentType::Text => content.push(ContentPart::text(block.text.unwrap_or_default())),
                ContentType::ToolUse => {
                    let id = block.id.unwrap_or_default();
                    let name = block.name.unwrap_or_default();

                    match block.input {
                        Some(input @ Value::Object(_)) => content.push(ContentPart::tool_call(id, name, input)),
                        None => content.push(ContentPart::tool_call(id, name, Value::Object(Default::default()))),
                        Some(_) => log::warn!("Dropping tool_use block {id} to '{name}': input is not a JSON object"),
                    }
                }
                ContentType::Thinking => content.push(ContentPart::reasoning(
                    block.thinking.unwrap_or_default(),
                    block.signature,
                )),
                ContentType::RedactedThinking => {
                    log::debug!("Skipping redacted_thinking block");
                }
                ContentType::Other(kind) => {
                    log::warn!("Skipping unsupported Anthropic content block of type '{kind}'");
                }
            }
        }

        let finish_reason = match response.stop_reason {
            Some(reason) => reason.into(),
            None if content.iter().any(ContentPart::is_tool_call) => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        UnifiedResponse {
            content,
            finish_reason,
            usage: response.usage.map(Usage::from),
            raw_response: None,
        }
    }
}

// Streaming types for Anthropic SSE responses

/// Anthropic streaming event types.
///
/// See: https://docs.anthropic.com/en/api/messages-streaming
///
/// Event flow for a typical streaming response:
/// 1. `message_start` - Initial message metadata with empty content
/// 2. `content_block_start` - Beginning of a content block (text, thinking or tool use)
/// 3. `content_block_delta` - Incremental content updates (multiple)
/// 4. `content_block_stop` - End of the current content block
/// 5. `message_delta` - Final message metadata (stop reason, usage)
/// 6. `message_stop` - End of streaming
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicMessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: AnthropicContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: AnthropicBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: AnthropicMessageDeltaData,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    /// Keep-alive, sent every few seconds during long responses.
    Ping,
    /// The stream ends after an error.
    Error {
        error: AnthropicStreamError,
    },
    /// Event types added to the API after this decoder was written.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessageStart {
    /// Input token count is final here, output tokens are updated by `message_delta`.
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text {
        /// Usually empty, filled through deltas.
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlockDelta {
    TextDelta {
        text: String,
    },
    /// Partial JSON of tool arguments. Concatenate all of them before parsing.
    InputJsonDelta {
        partial_json: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    /// Sent right before the `content_block_stop` of a thinking block.
    SignatureDelta {
        signature: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessageDeltaData {
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicStreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Helper struct for building tool calls incrementally from streaming chunks.
#[derive(Debug)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// Stream tracker for Messages API events.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    /// Tool calls being constructed (block index -> tool call data)
    tool_calls: HashMap<u32, ToolCallBuilder>,
    input_tokens: u32,
    has_tool_calls: bool,
    done: bool,
}

impl AnthropicStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn done(&mut self, finish_reason: FinishReason, usage: Option<Usage>) -> StreamChunk {
        self.done = true;

        StreamChunk::Done {
            finish_reason,
            has_tool_calls: self.has_tool_calls,
            usage,
        }
    }
}

impl StreamDecoder for AnthropicStreamDecoder {
    const PROVIDER: &'static str = "Anthropic";

    type Chunk = AnthropicStreamEvent;

    fn decode_stream_chunk(&mut self, event: AnthropicStreamEvent) -> Vec<StreamChunk> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                }

                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicContentBlock::ToolUse { id, name } => {
                    self.tool_calls.insert(
                        index,
                        ToolCallBuilder {
                            id,
                            name,
                            arguments: String::new(),
                        },
                    );

                    Vec::new()
                }
                AnthropicContentBlock::Text { text } if !text.is_empty() => vec![StreamChunk::Text { delta: text }],
                AnthropicContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                    vec![StreamChunk::Reasoning {
                        delta: thinking,
                        signature: None,
                    }]
                }
                AnthropicContentBlock::Unknown => {
                    log::warn!("Skipping unsupported Anthropic content block at index {index}");
                    Vec::new()
                }
                _ => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicBlockDelta::TextDelta { text } => vec![StreamChunk::Text { delta: text }],
                AnthropicBlockDelta::ThinkingDelta { thinking } => vec![StreamChunk::Reasoning {
                    delta: thinking,
                    signature: None,
                }],
                AnthropicBlockDelta::SignatureDelta { signature } => vec![StreamChunk::Reasoning {
                    delta: String::new(),
                    signature: Some(signature),
                }],
                AnthropicBlockDelta::InputJsonDelta { partial_json } => {
                    let Some(builder) = self.tool_calls.get_mut(&index) else {
                        log::warn!("Received tool arguments for unknown content block {index}");
                        return Vec::new();
                    };

                    builder.arguments.push_str(&partial_json);

                    vec![StreamChunk::ToolCallDelta {
                        tool_call_id: builder.id.clone(),
                        tool_name: None,
                        arguments_delta: partial_json,
                    }]
                }
                AnthropicBlockDelta::Unknown => {
                    log::debug!("Skipping unsupported Anthropic delta at index {index}");
                    Vec::new()
                }
            },

            AnthropicStreamEvent::ContentBlockStop { index } => {
                let Some(builder) = self.tool_calls.remove(&index) else {
                    return Vec::new();
                };

                match parse_arguments(&builder.arguments) {
                    Some(input) => {
                        self.has_tool_calls = true;

                        vec![StreamChunk::ToolCall {
                            tool_call_id: builder.id,
                            tool_name: builder.name,
                            input,
                        }]
                    }
                    None => {
                        log::warn!(
                            "Dropping streamed tool call {} to '{}': arguments are not a complete JSON object",
                            builder.id,
                            builder.name
                        );
                        Vec::new()
                    }
                }
            }

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = match delta.stop_reason {
                    Some(reason) => reason.into(),
                    None if self.has_tool_calls => FinishReason::ToolCalls,
                    None => FinishReason::Stop,
                };

                let usage = usage.map(|usage| {
                    let input_tokens = if usage.input_tokens > 0 {
                        usage.input_tokens
                    } else {
                        self.input_tokens
                    };

                    Usage::new(input_tokens, usage.output_tokens)
                });

                vec![self.done(finish_reason, usage)]
            }

            AnthropicStreamEvent::Error { error } => {
                log::error!("Anthropic stream error: {} - {}", error.error_type, error.message);
                vec![self.done(FinishReason::Error, None)]
            }

            AnthropicStreamEvent::MessageStop | AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Unknown => {
                log::debug!("Skipping unsupported Anthropic stream event");
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }

        if !self.tool_calls.is_empty() {
            log::warn!(
                "Anthropic stream closed with {} unfinished tool call(s), dropping them",
                self.tool_calls.len()
            );
            self.tool_calls.clear();
        }

        log::warn!("Anthropic stream ended without a message_delta event");

        vec![self.done(FinishReason::Other, None)]
    }
}
