use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    provider::{Decoder, StreamDecoder, parse_arguments},
    unified::{ContentPart, FinishReason, StreamChunk, UnifiedResponse, Usage},
};

/// Response body of a non-streaming chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<OpenAiFinishReason>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,

    /// Thinking output of reasoning models served through compatible APIs.
    #[serde(default)]
    pub reasoning_content: Option<String>,

    #[serde(default)]
    pub refusal: Option<String>,

    #[serde(default)]
    pub tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseToolCall {
    pub id: String,
    pub function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
pub struct ResponseFunction {
    pub name: String,
    /// JSON-encoded arguments, possibly invalid.
    #[serde(default)]
    pub arguments: String,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAiFinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// Legacy function calling.
    FunctionCall,
    /// Any other finish reason not yet known.
    /// Captures the actual string value for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

impl From<OpenAiFinishReason> for FinishReason {
    fn from(reason: OpenAiFinishReason) -> Self {
        match reason {
            OpenAiFinishReason::Stop => FinishReason::Stop,
            OpenAiFinishReason::Length => FinishReason::Length,
            OpenAiFinishReason::ToolCalls | OpenAiFinishReason::FunctionCall => FinishReason::ToolCalls,
            OpenAiFinishReason::ContentFilter => FinishReason::ContentFilter,
            OpenAiFinishReason::Other(reason) => {
                log::warn!("Unknown finish reason from OpenAI: {reason}");
                FinishReason::Other
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let mut unified = Usage::new(usage.prompt_tokens, usage.completion_tokens);

        if let Some(total) = usage.total_tokens {
            unified.total_tokens = total;
        }

        unified
    }
}

/// Decodes chat completion responses. Only the first choice is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiDecoder;

impl Decoder for OpenAiDecoder {
    const PROVIDER: &'static str = "OpenAI";

    type Response = ChatCompletionResponse;

    fn decode_response(&mut self, response: ChatCompletionResponse) -> UnifiedResponse {
        let usage = response.usage.map(Usage::from);

        let Some(choice) = response.choices.into_iter().min_by_key(|choice| choice.index) else {
            log::warn!("OpenAI response without choices");

            return UnifiedResponse {
                content: Vec::new(),
                finish_reason: FinishReason::Other,
                usage,
                raw_response: None,
            };
        };

        let ResponseMessage {
            content: text,
            reasoning_content,
            refusal,
            tool_calls,
        } = choice.message;

        let mut content = Vec::new();

        if let Some(reasoning) = reasoning_content.filter(|text| !text.is_empty()) {
            content.push(ContentPart::reasoning(reasoning, None));
        }

        if let Some(text) = text.filter(|text| !text.is_empty()) {
            content.push(ContentPart::text(text));
        }

        if let Some(refusal) = refusal.filter(|text| !text.is_empty()) {
            content.push(ContentPart::text(refusal));
        }

        for call in tool_calls {
            match parse_arguments(&call.function.arguments) {
                Some(input) => content.push(ContentPart::tool_call(call.id, call.function.name, input)),
                None => log::warn!(
                    "Dropping tool call {} to '{}' with invalid arguments",
                    call.id,
                    call.function.name
                ),
            }
        }

        let has_tool_calls = content.iter().any(ContentPart::is_tool_call);

        let finish_reason = match choice.finish_reason {
            Some(reason) => reason.into(),
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

/// One server-sent event of a streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Only present in the trailing chunk when usage reporting was requested.
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<OpenAiFinishReason>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallChunk>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallChunk {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionChunk>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionChunk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Helper struct for building tool calls incrementally from streaming chunks.
#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// Stream tracker for chat completion chunks.
///
/// Argument fragments are accumulated per tool call index. Completed calls are
/// emitted when the choice finishes. The terminal `done` event waits for the
/// trailing usage chunk, or for [`StreamDecoder::finish`].
#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder {
    tool_calls: BTreeMap<u32, ToolCallBuilder>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    has_tool_calls: bool,
    done: bool,
}

impl OpenAiStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush_tool_calls(&mut self, chunks: &mut Vec<StreamChunk>) {
        for (_, builder) in std::mem::take(&mut self.tool_calls) {
            match parse_arguments(&builder.arguments) {
                Some(input) => {
                    self.has_tool_calls = true;

                    chunks.push(StreamChunk::ToolCall {
                        tool_call_id: builder.id,
                        tool_name: builder.name,
                        input,
                    });
                }
                None => log::warn!(
                    "Dropping streamed tool call {} to '{}': arguments are not a complete JSON object",
                    builder.id,
                    builder.name
                ),
            }
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

impl StreamDecoder for OpenAiStreamDecoder {
    const PROVIDER: &'static str = "OpenAI";

    type Chunk = ChatCompletionChunk;

    fn decode_stream_chunk(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();

        if self.done {
            log::debug!("Ignoring OpenAI chunk received after the stream finished");
            return chunks;
        }

        for choice in chunk.choices {
            let ChunkDelta {
                content,
                reasoning_content,
                tool_calls,
            } = choice.delta;

            if let Some(delta) = reasoning_content.filter(|text| !text.is_empty()) {
                chunks.push(StreamChunk::Reasoning { delta, signature: None });
            }

            if let Some(delta) = content.filter(|text| !text.is_empty()) {
                chunks.push(StreamChunk::Text { delta });
            }

            for call in tool_calls {
                let builder = self.tool_calls.entry(call.index).or_default();

                if let Some(id) = call.id.filter(|id| !id.is_empty()) {
                    builder.id = id;
                }

                let (name, arguments) = match call.function {
                    Some(function) => (function.name.filter(|name| !name.is_empty()), function.arguments),
                    None => (None, None),
                };

                // Some compatible vendors repeat the full name in every delta.
                if let Some(name) = &name
                    && builder.name.is_empty()
                {
                    builder.name = name.clone();
                }

                let arguments = arguments.unwrap_or_default();
                builder.arguments.push_str(&arguments);

                if name.is_some() || !arguments.is_empty() {
                    chunks.push(StreamChunk::ToolCallDelta {
                        tool_call_id: builder.id.clone(),
                        tool_name: name,
                        arguments_delta: arguments,
                    });
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.flush_tool_calls(&mut chunks);
                self.finish_reason = Some(reason.into());
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        if let Some(finish_reason) = self.finish_reason
            && self.usage.is_some()
        {
            let done = self.done(finish_reason);
            chunks.push(done);
        }

        chunks
    }

    fn finish(&mut self) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();

        if self.done {
            return chunks;
        }

        self.flush_tool_calls(&mut chunks);

        let finish_reason = self.finish_reason.unwrap_or_else(|| {
            log::warn!("OpenAI stream ended without a finish reason");
            FinishReason::Other
        });

        let done = self.done(finish_reason);
        chunks.push(done);

        chunks
    }
}
