use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    provider::{Decoder, StreamDecoder},
    tracker::ToolCallTracker,
    unified::{ContentPart, FinishReason, StreamChunk, UnifiedResponse, Usage},
};

/// Role of a content turn. Gemini calls the assistant "model".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoogleRole {
    User,
    #[default]
    Model,
}

/// Content of a conversation turn, shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleContent {
    #[serde(default)]
    pub parts: Vec<GooglePart>,
    #[serde(default)]
    pub role: GoogleRole,
}

/// A part of a content turn. Exactly one of the payload fields is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Marks `text` as a thought summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GoogleBlob>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GoogleFunctionCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GoogleFunctionResponse>,
}

impl GooglePart {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Inline media bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBlob {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionCall {
    /// Only set by some Vertex deployments. Never sent.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    pub name: String,
    /// Always a JSON object.
    pub response: Value,
}

/// Response body of `generateContent`, and of each `streamGenerateContent` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerateResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
    #[serde(default)]
    pub prompt_feedback: Option<GooglePromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleContent>,
    #[serde(default)]
    pub finish_reason: Option<GoogleFinishReason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: Option<u32>,
}

impl From<GoogleUsageMetadata> for Usage {
    fn from(usage: GoogleUsageMetadata) -> Self {
        let mut unified = Usage::new(usage.prompt_token_count, usage.candidates_token_count);

        if let Some(total) = usage.total_token_count {
            unified.total_tokens = total;
        }

        unified
    }
}

/// Why Gemini stopped generating.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoogleFinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Other,
    Blocklist,
    ProhibitedContent,
    Spii,
    MalformedFunctionCall,
    /// Any other finish reason not yet known.
    /// Captures the actual string value for forward compatibility.
    #[serde(untagged)]
    Unknown(String),
}

impl GoogleFinishReason {
    /// Gemini reports `STOP` for turns that end with function calls.
    fn into_unified(self, has_tool_calls: bool) -> FinishReason {
        match self {
            GoogleFinishReason::Stop if has_tool_calls => FinishReason::ToolCalls,
            GoogleFinishReason::Stop => FinishReason::Stop,
            GoogleFinishReason::MaxTokens => FinishReason::Length,
            GoogleFinishReason::Safety
            | GoogleFinishReason::Recitation
            | GoogleFinishReason::Blocklist
            | GoogleFinishReason::ProhibitedContent
            | GoogleFinishReason::Spii => FinishReason::ContentFilter,
            GoogleFinishReason::MalformedFunctionCall => FinishReason::Error,
            GoogleFinishReason::FinishReasonUnspecified | GoogleFinishReason::Language | GoogleFinishReason::Other => {
                FinishReason::Other
            }
            GoogleFinishReason::Unknown(reason) => {
                log::warn!("Unknown finish reason from Google: {reason}");
                FinishReason::Other
            }
        }
    }
}

/// Converts response parts to unified parts, generating ids for function calls.
fn convert_parts(parts: Vec<GooglePart>, tracker: &mut ToolCallTracker) -> Vec<ContentPart> {
    let mut content = Vec::with_capacity(parts.len());

    for part in parts {
        if let Some(call) = part.function_call {
            let id = match call.id.filter(|id| !id.is_empty()) {
                Some(id) => id,
                None => tracker.generate_id(&call.name),
            };

            let input = match call.args {
                Value::Null => Value::Object(Default::default()),
                args @ Value::Object(_) => args,
                other => {
                    log::warn!("Dropping Gemini function call '{}': args are not a JSON object: {other}", call.name);
                    continue;
                }
            };

            // A signature on a call travels as an empty reasoning part right before it.
            if let Some(signature) = part.thought_signature {
                content.push(ContentPart::reasoning("", Some(signature)));
            }

            content.push(ContentPart::tool_call(id, call.name, input));
        } else if let Some(text) = part.text {
            if part.thought == Some(true) {
                content.push(ContentPart::reasoning(text, part.thought_signature));
            } else if !text.is_empty() {
                content.push(ContentPart::text(text));
            }
        } else if let Some(blob) = part.inline_data {
            content.push(ContentPart::Image {
                data: blob.data,
                media_type: blob.mime_type,
                url: None,
            });
        } else if part.function_response.is_some() {
            log::warn!("Skipping unexpected functionResponse part in a Gemini response");
        } else {
            log::debug!("Skipping empty Gemini response part");
        }
    }

    content
}

/// Decodes `generateContent` responses.
///
/// Ids of generated function calls are registered in the borrowed tracker, so the
/// results the application sends back can be correlated by name.
pub struct GoogleDecoder<'t> {
    tracker: &'t mut ToolCallTracker,
}

impl<'t> GoogleDecoder<'t> {
    pub fn new(tracker: &'t mut ToolCallTracker) -> Self {
        Self { tracker }
    }
}

impl Decoder for GoogleDecoder<'_> {
    const PROVIDER: &'static str = "Google";

    type Response = GoogleGenerateResponse;

    fn decode_response(&mut self, response: GoogleGenerateResponse) -> UnifiedResponse {
        let usage = response.usage_metadata.map(Usage::from);

        let Some(candidate) = response.candidates.into_iter().next() else {
            let blocked = response.prompt_feedback.and_then(|feedback| feedback.block_reason);

            let finish_reason = match blocked {
                Some(reason) => {
                    log::warn!("Gemini blocked the prompt: {reason}");
                    FinishReason::ContentFilter
                }
                None => {
                    log::warn!("Gemini response without candidates");
                    FinishReason::Other
                }
            };

            return UnifiedResponse {
                content: Vec::new(),
                finish_reason,
                usage,
                raw_response: None,
            };
        };

        let content = convert_parts(
            candidate.content.map(|content| content.parts).unwrap_or_default(),
            self.tracker,
        );

        let has_tool_calls = content.iter().any(ContentPart::is_tool_call);

        let finish_reason = match candidate.finish_reason {
            Some(reason) => reason.into_unified(has_tool_calls),
            None if has_tool_calls => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        UnifiedResponse {
            content,
            finish_reason,
            usage,
            raw_response: None,
        }
    }
}

/// Stream tracker for `streamGenerateContent` events.
///
/// Function calls arrive whole, so they are emitted as `tool-call` right away.
pub struct GoogleStreamDecoder<'t> {
    tracker: &'t mut ToolCallTracker,
    usage: Option<Usage>,
    has_tool_calls: bool,
    done: bool,
}

impl<'t> GoogleStreamDecoder<'t> {
    pub fn new(tracker: &'t mut ToolCallTracker) -> Self {
        Self {
            tracker,
            usage: None,
            has_tool_calls: false,
            done: false,
        }
    }

    fn done(&mut self, finish_reason: FinishReason) -> StreamChunk {
        self.done = true;

        StreamChunk::Done {
            finish_reason,
            has_tool_calls: self.has_tool_calls,
            usage: self.usage,
        }
    }
}

impl StreamDecoder for GoogleStreamDecoder<'_> {
    const PROVIDER: &'static str = "Google";

    type Chunk = GoogleGenerateResponse;

    fn decode_stream_chunk(&mut self, chunk: GoogleGenerateResponse) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();

        if self.done {
            log::debug!("Ignoring Gemini chunk received after the stream finished");
            return chunks;
        }

        if let Some(usage) = chunk.usage_metadata {
            self.usage = Some(usage.into());
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            if let Some(reason) = chunk.prompt_feedback.and_then(|feedback| feedback.block_reason) {
                log::warn!("Gemini blocked the prompt: {reason}");
                chunks.push(self.done(FinishReason::ContentFilter));
            }

            return chunks;
        };

        let parts = candidate.content.map(|content| content.parts).unwrap_or_default();

        for part in convert_parts(parts, self.tracker) {
            match part {
                ContentPart::Text { text } => chunks.push(StreamChunk::Text { delta: text }),
                ContentPart::Reasoning { text, signature } => {
                    chunks.push(StreamChunk::Reasoning { delta: text, signature })
                }
                ContentPart::ToolCall {
                    tool_call_id,
                    tool_name,
                    input,
                } => {
                    self.has_tool_calls = true;
                    chunks.push(StreamChunk::ToolCall {
                        tool_call_id,
                        tool_name,
                        input,
                    });
                }
                ContentPart::Image { .. } | ContentPart::ToolResult { .. } => {
                    log::debug!("Skipping non-text Gemini part in stream");
                }
            }
        }

        if let Some(reason) = candidate.finish_reason {
            let finish_reason = reason.into_unified(self.has_tool_calls);
            chunks.push(self.done(finish_reason));
        }

        chunks
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        if self.done {
            return Vec::new();
        }

        log::warn!("Gemini stream ended without a finish reason");

        vec![self.done(FinishReason::Other)]
    }
}
