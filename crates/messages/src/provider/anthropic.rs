//! Anthropic Messages format.

mod input;
mod output;

pub use self::{
    input::{
        AnthropicBlock, AnthropicEncoder, AnthropicImageSource, AnthropicMessage, AnthropicMessageContent,
        AnthropicRole, AnthropicTool,
    },
    output::{
        AnthropicDecoder, AnthropicResponse, AnthropicStreamDecoder, AnthropicStreamEvent, AnthropicUsage, StopReason,
    },
};
