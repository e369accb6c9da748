//! Provider-agnostic conversation messages.
//!
//! A conversation is kept in one canonical shape, [`UnifiedMessage`], and moved in
//! and out of the OpenAI, Anthropic and Google wire formats by the codecs in
//! [`provider`]. When the model of a conversation changes family mid-session,
//! [`normalize_history`] rewrites the tool call history so the new vendor accepts it.

mod error;
mod family;
pub mod history;
mod http_client;
mod image;
pub mod legacy;
pub mod provider;
mod tracker;
mod unified;

pub use error::{ConversionError, Error, Result};
pub use family::ProviderFamily;
pub use history::{HistoryNormalizer, fallback_to_text_conversion, normalize_history};
pub use image::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use provider::{Decoder, EncodedMessages, Encoder, StreamDecoder};
pub use tracker::{ToolCallEntry, ToolCallTracker};
pub use unified::{
    ContentPart, FinishReason, MessageContent, Role, StreamChunk, ToolCallRef, ToolOutput, ToolResultRef,
    UnifiedMessage, UnifiedResponse, UnifiedToolDefinition, Usage,
};
