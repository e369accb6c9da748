//! Vendor wire formats.
//!
//! Each vendor module has an `input` half (unified messages to request payloads)
//! and an `output` half (response bodies and stream events to unified values).

pub mod anthropic;
pub mod google;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::Error,
    unified::{StreamChunk, UnifiedMessage, UnifiedResponse, UnifiedToolDefinition},
};

/// Messages ready to be placed into a vendor request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedMessages<M, S> {
    pub messages: Vec<M>,
    /// Top-level system slot, for vendors that keep it out of the message list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<S>,
}

/// Converts unified history into a vendor's request shape.
#[async_trait]
pub trait Encoder: Send + Sync {
    type Message: Serialize + Send;
    type System: Serialize + Send;
    type Tool: Serialize + Send;

    /// Encodes a whole history. Total: content the vendor cannot represent is
    /// degraded to text or dropped with a warning, never an error.
    async fn encode_messages(&self, messages: &[UnifiedMessage]) -> EncodedMessages<Self::Message, Self::System>;

    fn encode_tools(&self, tools: &[UnifiedToolDefinition]) -> Vec<Self::Tool>;
}

/// Converts a complete vendor response into a [`UnifiedResponse`].
pub trait Decoder {
    /// Vendor name used in error messages.
    const PROVIDER: &'static str;

    type Response: DeserializeOwned;

    fn decode_response(&mut self, response: Self::Response) -> UnifiedResponse;

    /// Deserializes a raw body and decodes it, keeping the body as `raw_response`.
    fn decode_json(&mut self, body: Value) -> crate::Result<UnifiedResponse> {
        let response = Self::Response::deserialize(&body).map_err(|source| Error::InvalidResponse {
            provider: Self::PROVIDER,
            source,
        })?;

        let mut unified = self.decode_response(response);
        unified.raw_response = Some(body);

        Ok(unified)
    }
}

/// Stateful decoder for one streamed response.
///
/// An empty vector means the event carried nothing the caller has to act on.
pub trait StreamDecoder {
    const PROVIDER: &'static str;

    type Chunk: DeserializeOwned;

    fn decode_stream_chunk(&mut self, chunk: Self::Chunk) -> Vec<StreamChunk>;

    /// Called once the transport is exhausted. Emits the terminal `done` event
    /// if the vendor never sent one.
    fn finish(&mut self) -> Vec<StreamChunk>;

    /// Parses the data field of one server-sent event and decodes it.
    fn decode_stream_json(&mut self, data: &str) -> crate::Result<Vec<StreamChunk>> {
        let chunk = serde_json::from_str(data).map_err(|source| Error::InvalidResponse {
            provider: Self::PROVIDER,
            source,
        })?;

        Ok(self.decode_stream_chunk(chunk))
    }
}

/// Tool arguments as a JSON object.
///
/// Arguments that arrive as a serialized string are parsed once. Anything that
/// still is not an object is replaced by an empty object.
pub(crate) fn tool_input_object(id: &str, input: &Value) -> Value {
    match input {
        Value::Object(_) => input.clone(),
        Value::Null => Value::Object(Default::default()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                log::warn!("Tool call {id} carries arguments that are not a JSON object, sending an empty object");
                Value::Object(Default::default())
            }
        },
        _ => {
            log::warn!("Tool call {id} carries arguments that are not a JSON object, sending an empty object");
            Value::Object(Default::default())
        }
    }
}

/// Parses accumulated streamed or stringified arguments. Empty input means no arguments.
pub(crate) fn parse_arguments(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return Some(Value::Object(Default::default()));
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Text annotation used by vendors that cannot carry reasoning natively.
pub(crate) fn reasoning_annotation(text: &str) -> String {
    format!("[Reasoning: {text}]")
}

/// Builds a text body out of plain text and bracketed annotations.
///
/// Text is appended as is. Annotations sit on their own line.
#[derive(Debug, Default)]
pub(crate) struct TextBuffer {
    text: String,
    after_annotation: bool,
}

impl TextBuffer {
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.after_annotation {
            self.text.push('\n');
            self.after_annotation = false;
        }

        self.text.push_str(text);
    }

    pub fn push_annotation(&mut self, annotation: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }

        self.text.push_str(annotation);
        self.after_annotation = true;
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
