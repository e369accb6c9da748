//! OpenAI Chat Completions format, also spoken by most OpenAI-compatible vendors.

mod input;
mod output;

pub use self::{
    input::{
        OpenAiContent, OpenAiContentPart, OpenAiEncoder, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl,
        OpenAiMessage, OpenAiRole, OpenAiTool, OpenAiToolCall, ToolType,
    },
    output::{
        ChatCompletionChunk, ChatCompletionResponse, OpenAiDecoder, OpenAiFinishReason, OpenAiStreamDecoder,
        OpenAiUsage,
    },
};
