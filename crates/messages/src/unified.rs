//! Protocol-agnostic unified message types.
//!
//! This module is the canonical in-memory representation of a conversation. Every
//! encoder reads it, every decoder produces it, and the history normalizer rewrites
//! it when a conversation moves from one provider family to another.
//!
//! ## Key Design Decisions
//!
//! - **Content containers**: a bare string is shorthand for a single text part. All
//!   queries treat both encodings the same way, callers never have to pick one.
//! - **Tool calls**: stored as `tool-call` parts inside assistant content, with
//!   arguments always kept as parsed JSON. Serializing arguments to a string is an
//!   encoder concern.
//! - **Tool results**: either a `tool` role message with string content plus
//!   `tool_call_id`/`tool_name`, or a `tool-result` part. [`UnifiedMessage::tool_results`]
//!   gives a uniform view over both.
//! - **Lenient reads**: a content part with an unknown `type` tag is skipped with a
//!   warning instead of failing the whole message.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message sender role in conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions that guide model behavior.
    ///
    /// Provider handling:
    /// - **OpenAI**: Sent as a message with role "system"
    /// - **Anthropic**: Hoisted to the top-level "system" field
    /// - **Google**: Converted to "systemInstruction"
    System,

    /// End user input.
    User,

    /// Model output. Named "model" by Google.
    Assistant,

    /// Result of a tool execution. Never a call.
    ///
    /// Provider handling:
    /// - **OpenAI**: Separate "tool" role message
    /// - **Anthropic**: `tool_result` block inside a user message
    /// - **Google**: `functionResponse` part inside a user turn
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
            Role::Tool => f.write_str("tool"),
        }
    }
}

/// One conversation turn in the vendor-neutral representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedMessage {
    /// Role of the message sender.
    pub role: Role,

    /// Message content, either a bare string or a list of typed parts.
    pub content: MessageContent,

    /// Call id this message answers. Only set on `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Name of the function whose result this message carries. Only set on `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Container for message content with flexible representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content, equivalent to a single text part.
    Text(String),

    /// Structured content parts, in order.
    Parts(Vec<ContentPart>),
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawContent {
            Text(String),
            Parts(Vec<Value>),
        }

        match RawContent::deserialize(deserializer)? {
            RawContent::Text(text) => Ok(MessageContent::Text(text)),
            RawContent::Parts(values) => Ok(MessageContent::Parts(parts_from_values(values))),
        }
    }
}

/// Parses content parts one by one, skipping the ones that are not understood.
pub(crate) fn parts_from_values(values: Vec<Value>) -> Vec<ContentPart> {
    values
        .into_iter()
        .filter_map(|value| {
            let tag = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("<missing>")
                .to_string();

            match serde_json::from_value::<ContentPart>(value) {
                Ok(part) => Some(part),
                Err(e) => {
                    log::warn!("Skipping unrecognized content part of type '{tag}': {e}");
                    None
                }
            }
        })
        .collect()
}

impl MessageContent {
    /// Content as a list of parts. A non-empty string becomes a single text part,
    /// an empty string becomes an empty list.
    pub fn parts(&self) -> Cow<'_, [ContentPart]> {
        match self {
            MessageContent::Text(text) if text.is_empty() => Cow::Owned(Vec::new()),
            MessageContent::Text(text) => Cow::Owned(vec![ContentPart::text(text.clone())]),
            MessageContent::Parts(parts) => Cow::Borrowed(parts),
        }
    }

    /// Owned variant of [`MessageContent::parts`].
    pub fn into_parts(self) -> Vec<ContentPart> {
        match self {
            MessageContent::Text(text) if text.is_empty() => Vec::new(),
            MessageContent::Text(text) => vec![ContentPart::text(text)],
            MessageContent::Parts(parts) => parts,
        }
    }

    /// True for an empty string or an empty part list.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

/// Content part types for structured messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },

    /// Image content for multi-modal interactions.
    ///
    /// Both the inline payload and the original URL may be present. Providers that
    /// accept references get the URL, the others get the base64 payload.
    Image {
        /// Base64 payload without the `data:` prefix. Empty when only the URL is known.
        #[serde(default)]
        data: String,
        /// MIME type, e.g. "image/png".
        media_type: String,
        /// Original location of the image.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Tool invocation requested by the assistant.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        /// Parsed arguments. Never a serialized JSON string.
        input: Value,
    },

    /// Outcome of a tool invocation.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: ToolOutput,
    },

    /// Vendor "thinking" content.
    Reasoning {
        text: String,
        /// Opaque verification token that must be echoed back unchanged.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentPart::ToolCall {
            tool_call_id: id.into(),
            tool_name: name.into(),
            input,
        }
    }

    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, output: ToolOutput) -> Self {
        ContentPart::ToolResult {
            tool_call_id: id.into(),
            tool_name: name.into(),
            output,
        }
    }

    pub fn reasoning(text: impl Into<String>, signature: Option<String>) -> Self {
        ContentPart::Reasoning {
            text: text.into(),
            signature,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ContentPart::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentPart::ToolResult { .. })
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, ContentPart::Reasoning { .. })
    }

    /// Get the text content if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ToolOutput {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolOutput {
    /// Textual rendering used by providers that only accept strings.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            ToolOutput::Text(text) | ToolOutput::Error(text) => Cow::Borrowed(text),
            ToolOutput::Json(Value::String(text)) => Cow::Borrowed(text),
            ToolOutput::Json(value) => Cow::Owned(value.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }
}

/// Borrowed view of a tool call found in a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolCallRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a Value,
}

/// Uniform view of a tool result, whether it was stored as a `tool` message with
/// string content or as a `tool-result` part.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultRef<'a> {
    pub tool_call_id: Option<&'a str>,
    pub tool_name: Option<&'a str>,
    pub output: Cow<'a, ToolOutput>,
}

impl UnifiedMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A `tool` message with plain string content.
    pub fn tool(tool_call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    /// A `tool` message carrying a typed output as a `tool-result` part.
    pub fn tool_output(tool_call_id: impl Into<String>, tool_name: impl Into<String>, output: ToolOutput) -> Self {
        let tool_call_id = tool_call_id.into();
        let tool_name = tool_name.into();

        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::tool_result(
                tool_call_id.clone(),
                tool_name.clone(),
                output,
            )]),
            tool_call_id: Some(tool_call_id),
            tool_name: Some(tool_name),
        }
    }

    /// True iff the content is structured and contains a tool-call part.
    pub fn has_tool_calls(&self) -> bool {
        match &self.content {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts.iter().any(ContentPart::is_tool_call),
        }
    }

    /// True for `tool` messages and for any message carrying a tool-result part.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
            || matches!(&self.content, MessageContent::Parts(parts) if parts.iter().any(ContentPart::is_tool_result))
    }

    /// Concatenation of all text parts, in order. Empty when there is no text.
    pub fn extract_text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }

    /// All tool calls in this message, in order.
    pub fn extract_tool_calls(&self) -> Vec<ToolCallRef<'_>> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolCall {
                        tool_call_id,
                        tool_name,
                        input,
                    } => Some(ToolCallRef {
                        id: tool_call_id,
                        name: tool_name,
                        input,
                    }),
                    _ => None,
                })
                .collect(),
        }
    }

    /// All tool results carried by this message.
    ///
    /// `tool-result` parts win when present. Otherwise a `tool` message yields one
    /// result built from its text and its `tool_call_id`/`tool_name` fields.
    pub fn tool_results(&self) -> Vec<ToolResultRef<'_>> {
        let message_id = self.tool_call_id.as_deref().filter(|id| !id.is_empty());
        let message_name = self.tool_name.as_deref().filter(|name| !name.is_empty());

        if let MessageContent::Parts(parts) = &self.content {
            let results: Vec<_> = parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::ToolResult {
                        tool_call_id,
                        tool_name,
                        output,
                    } => Some(ToolResultRef {
                        tool_call_id: Some(tool_call_id.as_str()).filter(|id| !id.is_empty()).or(message_id),
                        tool_name: Some(tool_name.as_str()).filter(|name| !name.is_empty()).or(message_name),
                        output: Cow::Borrowed(output),
                    }),
                    _ => None,
                })
                .collect();

            if !results.is_empty() {
                return results;
            }
        }

        if self.role != Role::Tool {
            return Vec::new();
        }

        vec![ToolResultRef {
            tool_call_id: message_id,
            tool_name: message_name,
            output: Cow::Owned(ToolOutput::Text(self.extract_text())),
        }]
    }
}

/// Tool/function definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedToolDefinition {
    /// Function name, unique among the offered tools.
    pub name: String,

    /// What the function does, used by the model to decide when to call it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// Unified response from a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedResponse {
    /// Generated content parts, in provider order.
    pub content: Vec<ContentPart>,

    /// Normalized reason why generation stopped.
    pub finish_reason: FinishReason,

    /// Token usage, when the provider reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// The provider body this response was decoded from, if it was decoded from JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl UnifiedResponse {
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(ContentPart::is_tool_call)
    }

    /// Concatenated text of the response.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentPart::as_text).collect()
    }

    /// Converts the response into an assistant message to append to the history.
    pub fn into_message(self) -> UnifiedMessage {
        UnifiedMessage::assistant(self.content)
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Reason why the model stopped generating.
///
/// Every vendor-specific value maps onto one of these; values nobody recognizes
/// become [`FinishReason::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::ToolCalls => write!(f, "tool-calls"),
            FinishReason::ContentFilter => write!(f, "content-filter"),
            FinishReason::Error => write!(f, "error"),
            FinishReason::Other => write!(f, "other"),
        }
    }
}

/// Streaming event in the unified representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamChunk {
    /// Text to append to the response.
    Text { delta: String },

    /// Thinking content to append. The signature arrives once, at the end of the block.
    Reasoning {
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// A fully materialized tool call. Only emitted once its arguments parsed.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },

    /// A fragment of tool call arguments, as raw JSON text.
    ToolCallDelta {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        arguments_delta: String,
    },

    /// Terminal event.
    Done {
        finish_reason: FinishReason,
        has_tool_calls: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}
