//! Provider-switch policy for conversation history.
//!
//! A history recorded against one provider family carries that family's tool call
//! ids and placement conventions. Before handing it to another family the tool
//! calls are re-identified and their results re-paired. When that is impossible
//! the history is degraded to plain text, so a conversation can always continue.

mod fallback;

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
};

use config::{DEFAULT_MAX_TOOL_PARTS_PER_MESSAGE, HistoryConfig};
use serde_json::Value;

pub use self::fallback::{MAX_TOOL_RESULT_CHARS, fallback_to_text_conversion};
use crate::{
    error::ConversionError,
    family::ProviderFamily,
    tracker::ToolCallTracker,
    unified::{ContentPart, MessageContent, Role, UnifiedMessage},
};

/// Normalizes history with the default per-message tool part limit.
///
/// Returns the input untouched when it holds no tool traffic or when the previous
/// model belongs to the target family.
pub fn normalize_history(
    messages: &[UnifiedMessage],
    target: ProviderFamily,
    source: Option<ProviderFamily>,
) -> Cow<'_, [UnifiedMessage]> {
    HistoryNormalizer::default().normalize(messages, target, source)
}

/// Re-identifies tool calls for an OpenAI-family target.
pub fn convert_history_for_openai(messages: &[UnifiedMessage]) -> Result<Vec<UnifiedMessage>, ConversionError> {
    HistoryNormalizer::default().convert(messages, ProviderFamily::OpenAi)
}

/// Re-identifies tool calls for an Anthropic-family target.
pub fn convert_history_for_anthropic(messages: &[UnifiedMessage]) -> Result<Vec<UnifiedMessage>, ConversionError> {
    HistoryNormalizer::default().convert(messages, ProviderFamily::Anthropic)
}

/// Re-pairs tool results with their calls by function name for a Google-family target.
pub fn convert_history_for_google(messages: &[UnifiedMessage]) -> Result<Vec<UnifiedMessage>, ConversionError> {
    HistoryNormalizer::default().convert(messages, ProviderFamily::Google)
}

/// History normalizer with a configurable per-message tool part limit.
#[derive(Debug, Clone, Copy)]
pub struct HistoryNormalizer {
    max_tool_parts: usize,
}

impl Default for HistoryNormalizer {
    fn default() -> Self {
        Self {
            max_tool_parts: DEFAULT_MAX_TOOL_PARTS_PER_MESSAGE,
        }
    }
}

impl HistoryNormalizer {
    pub fn new(config: &HistoryConfig) -> Self {
        Self::with_max_tool_parts(config.max_tool_parts_per_message)
    }

    pub fn with_max_tool_parts(max_tool_parts: usize) -> Self {
        Self {
            max_tool_parts: max_tool_parts.max(1),
        }
    }

    pub fn max_tool_parts(&self) -> usize {
        self.max_tool_parts
    }

    /// Prepares `messages` for a model of the `target` family.
    ///
    /// Never fails: a history that cannot be converted is degraded with
    /// [`fallback_to_text_conversion`].
    pub fn normalize<'a>(
        &self,
        messages: &'a [UnifiedMessage],
        target: ProviderFamily,
        source: Option<ProviderFamily>,
    ) -> Cow<'a, [UnifiedMessage]> {
        let has_tool_traffic = messages
            .iter()
            .any(|message| message.has_tool_calls() || message.is_tool_result());

        if !has_tool_traffic {
            return Cow::Borrowed(messages);
        }

        if source == Some(target) {
            log::debug!("History already uses {target} conventions, passing it through");
            return Cow::Borrowed(messages);
        }

        match self.convert(messages, target) {
            Ok(converted) => Cow::Owned(converted),
            Err(e) => {
                log::warn!("Falling back to text history for {target}: {e}");
                Cow::Owned(fallback_to_text_conversion(messages))
            }
        }
    }

    /// Converts tool call history for `target`, failing on anything that cannot
    /// be paired reliably.
    pub fn convert(
        &self,
        messages: &[UnifiedMessage],
        target: ProviderFamily,
    ) -> Result<Vec<UnifiedMessage>, ConversionError> {
        let pairing = match target {
            ProviderFamily::Google => Pairing::ByName,
            ProviderFamily::OpenAi | ProviderFamily::Anthropic => Pairing::ById,
        };

        let mut conversion = Conversion {
            pairing,
            max_tool_parts: self.max_tool_parts,
            tracker: ToolCallTracker::new(),
            id_map: HashMap::new(),
            call_names: HashMap::new(),
            truncated: HashSet::new(),
        };

        let mut converted = Vec::with_capacity(messages.len());

        for message in messages {
            if let Some(message) = conversion.message(message)? {
                converted.push(message);
            }
        }

        if conversion.tracker.has_pending_calls() {
            log::debug!(
                "{} tool call(s) in the history never received a result",
                conversion.tracker.pending_count()
            );
        }

        Ok(converted)
    }
}

/// How results find their call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pairing {
    /// Through the old id to new id map.
    ById,
    /// Oldest unanswered call of the same function name.
    ByName,
}

/// State of one conversion pass. Lives for exactly one call.
struct Conversion {
    pairing: Pairing,
    max_tool_parts: usize,
    tracker: ToolCallTracker,
    /// Original call id to regenerated id.
    id_map: HashMap<String, String>,
    /// Original call id to function name.
    call_names: HashMap<String, String>,
    /// Original ids of calls dropped by the per-message limit.
    truncated: HashSet<String>,
}

impl Conversion {
    fn message(&mut self, message: &UnifiedMessage) -> Result<Option<UnifiedMessage>, ConversionError> {
        match (message.role, &message.content) {
            (Role::Tool, MessageContent::Text(text)) => {
                let resolved = self.resolve_result(message.tool_call_id.as_deref(), message.tool_name.as_deref())?;

                Ok(resolved.map(|(id, name)| UnifiedMessage::tool(id, name, text.clone())))
            }
            (_, MessageContent::Text(_)) => Ok(Some(message.clone())),
            (Role::Tool, MessageContent::Parts(parts)) if !parts.iter().any(ContentPart::is_tool_result) => {
                let resolved = self.resolve_result(message.tool_call_id.as_deref(), message.tool_name.as_deref())?;

                Ok(resolved.map(|(id, name)| UnifiedMessage {
                    role: Role::Tool,
                    content: MessageContent::Parts(parts.clone()),
                    tool_call_id: Some(id),
                    tool_name: Some(name),
                }))
            }
            (role, MessageContent::Parts(parts)) => {
                let parts = self.parts(message, parts)?;

                // Every result of a tool message was dropped with its truncated call.
                if role == Role::Tool && parts.is_empty() {
                    return Ok(None);
                }

                let (tool_call_id, tool_name) = match role {
                    Role::Tool => first_result_ids(&parts),
                    _ => (None, None),
                };

                Ok(Some(UnifiedMessage {
                    role,
                    content: MessageContent::Parts(parts),
                    tool_call_id,
                    tool_name,
                }))
            }
        }
    }

    fn parts(&mut self, message: &UnifiedMessage, parts: &[ContentPart]) -> Result<Vec<ContentPart>, ConversionError> {
        let total_calls = parts.iter().filter(|part| part.is_tool_call()).count();
        let total_results = parts.iter().filter(|part| part.is_tool_result()).count();

        if total_calls > self.max_tool_parts {
            log::warn!(
                "Truncating {total_calls} tool calls of a {} message to the configured limit of {}",
                message.role,
                self.max_tool_parts
            );
        }

        if total_results > self.max_tool_parts {
            log::warn!(
                "Truncating {total_results} tool results of a {} message to the configured limit of {}",
                message.role,
                self.max_tool_parts
            );
        }

        let mut calls = 0;
        let mut results = 0;
        let mut converted = Vec::with_capacity(parts.len());

        for part in parts {
            match part {
                ContentPart::ToolCall {
                    tool_call_id,
                    tool_name,
                    input,
                } => {
                    calls += 1;

                    if calls > self.max_tool_parts {
                        self.truncated.insert(tool_call_id.clone());
                        continue;
                    }

                    converted.push(self.call(tool_call_id, tool_name, input)?);
                }
                ContentPart::ToolResult {
                    tool_call_id,
                    tool_name,
                    output,
                } => {
                    results += 1;

                    if results > self.max_tool_parts {
                        continue;
                    }

                    // Parts without their own identity inherit the message's.
                    let id = Some(tool_call_id.as_str())
                        .filter(|id| !id.is_empty())
                        .or(message.tool_call_id.as_deref());
                    let name = Some(tool_name.as_str())
                        .filter(|name| !name.is_empty())
                        .or(message.tool_name.as_deref());

                    if let Some((id, name)) = self.resolve_result(id, name)? {
                        converted.push(ContentPart::tool_result(id, name, output.clone()));
                    }
                }
                other => converted.push(other.clone()),
            }
        }

        Ok(converted)
    }

    fn call(&mut self, old_id: &str, name: &str, input: &Value) -> Result<ContentPart, ConversionError> {
        if name.trim().is_empty() {
            return Err(ConversionError::MissingToolName(old_id.to_string()));
        }

        let input = match input {
            Value::Object(_) => input.clone(),
            Value::Null => Value::Object(Default::default()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value @ Value::Object(_)) => value,
                Ok(_) => {
                    return Err(ConversionError::InvalidToolInput {
                        id: old_id.to_string(),
                        reason: "arguments string does not hold a JSON object".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConversionError::InvalidToolInput {
                        id: old_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            },
            other => {
                return Err(ConversionError::InvalidToolInput {
                    id: old_id.to_string(),
                    reason: format!("expected a JSON object, found {other}"),
                });
            }
        };

        let new_id = self.tracker.generate_id(name);

        if !old_id.is_empty() {
            self.id_map.insert(old_id.to_string(), new_id.clone());
            self.call_names.insert(old_id.to_string(), name.to_string());
        }

        Ok(ContentPart::tool_call(new_id, name, input))
    }

    /// Finds the regenerated id and the function name of a result.
    ///
    /// `None` means the result answers a call that was truncated away and must be
    /// dropped with it.
    fn resolve_result(
        &mut self,
        old_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<(String, String)>, ConversionError> {
        let old_id = old_id.filter(|id| !id.is_empty());
        let name = name.filter(|name| !name.is_empty());

        if let Some(old_id) = old_id
            && self.truncated.contains(old_id)
        {
            log::debug!("Dropping tool result {old_id}, its call was truncated");
            return Ok(None);
        }

        let new_id = match (self.pairing, old_id, name) {
            (Pairing::ById, Some(old_id), _) => self
                .id_map
                .get(old_id)
                .cloned()
                .ok_or_else(|| ConversionError::OrphanToolResult(old_id.to_string()))?,
            (Pairing::ByName, Some(old_id), None) => {
                let name = self
                    .call_names
                    .get(old_id)
                    .cloned()
                    .ok_or_else(|| ConversionError::OrphanToolResult(old_id.to_string()))?;

                self.correlate(&name)?
            }
            (_, _, Some(name)) => self.correlate(name)?,
            (_, None, None) => return Err(ConversionError::UnidentifiedToolResult),
        };

        let name = match self.tracker.entry(&new_id) {
            Some(entry) => entry.function_name.clone(),
            None => match name {
                Some(name) => name.to_string(),
                None => old_id
                    .and_then(|id| self.call_names.get(id).cloned())
                    .unwrap_or_default(),
            },
        };

        if !self.tracker.mark_used(&new_id) {
            log::debug!("Tool call {new_id} received more than one result");
        }

        Ok(Some((new_id, name)))
    }

    fn correlate(&self, name: &str) -> Result<String, ConversionError> {
        self.tracker
            .correlate(name)
            .map(str::to_string)
            .ok_or_else(|| ConversionError::UncorrelatedToolResult(name.to_string()))
    }
}

fn first_result_ids(parts: &[ContentPart]) -> (Option<String>, Option<String>) {
    parts
        .iter()
        .find_map(|part| match part {
            ContentPart::ToolResult {
                tool_call_id,
                tool_name,
                ..
            } => Some((Some(tool_call_id.clone()), Some(tool_name.clone()))),
            _ => None,
        })
        .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::unified::ToolOutput;

    fn openai_history() -> Vec<UnifiedMessage> {
        vec![
            UnifiedMessage::user("What's the weather in Paris and Rome?"),
            UnifiedMessage::assistant(vec![
                ContentPart::text("Let me check."),
                ContentPart::tool_call("call_abc", "get_weather", json!({"city": "Paris"})),
                ContentPart::tool_call("call_def", "get_weather", json!({"city": "Rome"})),
            ]),
            UnifiedMessage::tool("call_abc", "get_weather", "18C"),
            UnifiedMessage::tool("call_def", "get_weather", "24C"),
            UnifiedMessage::assistant("Paris is 18C, Rome is 24C."),
        ]
    }

    fn call_ids(messages: &[UnifiedMessage]) -> Vec<String> {
        messages
            .iter()
            .flat_map(|message| message.extract_tool_calls())
            .map(|call| call.id.to_string())
            .collect()
    }

    fn result_ids(messages: &[UnifiedMessage]) -> Vec<String> {
        messages
            .iter()
            .flat_map(|message| message.tool_results())
            .filter_map(|result| result.tool_call_id.map(str::to_string))
            .collect()
    }

    #[test]
    fn plain_history_is_borrowed() {
        let messages = vec![UnifiedMessage::user("hi"), UnifiedMessage::assistant("hello")];

        let normalized = normalize_history(&messages, ProviderFamily::Google, Some(ProviderFamily::OpenAi));

        assert!(matches!(normalized, Cow::Borrowed(_)));
    }

    #[test]
    fn same_family_is_borrowed() {
        let messages = openai_history();

        let normalized = normalize_history(&messages, ProviderFamily::OpenAi, Some(ProviderFamily::OpenAi));

        let Cow::Borrowed(slice) = normalized else {
            unreachable!("same family must pass through");
        };
        assert!(std::ptr::eq(slice, messages.as_slice()));
    }

    #[test]
    fn unknown_source_is_converted() {
        let messages = openai_history();

        let normalized = normalize_history(&messages, ProviderFamily::OpenAi, None);

        assert!(matches!(normalized, Cow::Owned(_)));
    }

    #[test]
    fn ids_are_regenerated_consistently() {
        for target in [ProviderFamily::OpenAi, ProviderFamily::Anthropic, ProviderFamily::Google] {
            let messages = openai_history();
            let normalized = normalize_history(&messages, target, Some(ProviderFamily::Anthropic));

            let calls = call_ids(&normalized);
            let results = result_ids(&normalized);

            assert_eq!(calls.len(), 2, "{target}");
            assert_eq!(calls, results, "{target}");
            assert!(calls.iter().all(|id| id.starts_with("call_get_weather_")), "{target}");
            assert!(!calls.contains(&"call_abc".to_string()), "{target}");
        }
    }

    #[test]
    fn tool_messages_with_text_parts_are_paired() {
        let messages = vec![
            UnifiedMessage::user("Search for rust"),
            UnifiedMessage::assistant(vec![ContentPart::tool_call("call_1", "search", json!({"q": "rust"}))]),
            UnifiedMessage {
                role: Role::Tool,
                content: MessageContent::Parts(vec![ContentPart::text("results")]),
                tool_call_id: Some("call_1".to_string()),
                tool_name: Some("search".to_string()),
            },
        ];

        for target in [ProviderFamily::Anthropic, ProviderFamily::Google] {
            let normalized = normalize_history(&messages, target, Some(ProviderFamily::OpenAi));
            let calls = call_ids(&normalized);
            let tool = &normalized[2];

            assert_eq!(calls.len(), 1, "{target}");
            assert_eq!(tool.tool_call_id.as_deref(), Some(calls[0].as_str()), "{target}");
            assert_eq!(tool.tool_name.as_deref(), Some("search"), "{target}");
            assert_eq!(tool.content, MessageContent::Parts(vec![ContentPart::text("results")]));
            assert_eq!(calls, result_ids(&normalized), "{target}");
        }
    }

    #[test]
    fn google_pairs_by_name_in_order() {
        let messages = vec![
            UnifiedMessage::assistant(vec![
                ContentPart::tool_call("", "search", json!({"q": "a"})),
                ContentPart::tool_call("", "fetch", json!({"url": "x"})),
                ContentPart::tool_call("", "search", json!({"q": "b"})),
            ]),
            UnifiedMessage::user(vec![
                ContentPart::tool_result("", "search", ToolOutput::Text("A".to_string())),
                ContentPart::tool_result("", "fetch", ToolOutput::Text("X".to_string())),
                ContentPart::tool_result("", "search", ToolOutput::Text("B".to_string())),
            ]),
        ];

        let converted = convert_history_for_google(&messages).unwrap();

        assert_eq!(call_ids(&converted), result_ids(&converted));
    }

    #[test]
    fn orphan_result_falls_back_to_text() {
        let messages = vec![
            UnifiedMessage::user("hi"),
            UnifiedMessage::tool("call_missing", "search", "result"),
        ];

        assert_eq!(
            convert_history_for_anthropic(&messages).unwrap_err(),
            ConversionError::OrphanToolResult("call_missing".to_string())
        );

        let normalized = normalize_history(&messages, ProviderFamily::Anthropic, Some(ProviderFamily::OpenAi));

        assert_eq!(
            normalized.as_ref(),
            &[
                UnifiedMessage::user("hi"),
                UnifiedMessage::assistant("[Tool \"search\" returned: result]"),
            ]
        );
    }

    #[test]
    fn uncorrelated_google_result_is_an_error() {
        let messages = vec![UnifiedMessage::tool_output("", "search", ToolOutput::Text("r".to_string()))];

        assert_eq!(
            convert_history_for_google(&messages).unwrap_err(),
            ConversionError::UncorrelatedToolResult("search".to_string())
        );
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let empty_name = vec![UnifiedMessage::assistant(vec![ContentPart::tool_call(
            "call_1",
            " ",
            json!({}),
        )])];

        assert_eq!(
            convert_history_for_openai(&empty_name).unwrap_err(),
            ConversionError::MissingToolName("call_1".to_string())
        );

        let bad_input = vec![UnifiedMessage::assistant(vec![ContentPart::tool_call(
            "call_1",
            "search",
            json!("{not json"),
        )])];

        assert!(matches!(
            convert_history_for_openai(&bad_input),
            Err(ConversionError::InvalidToolInput { .. })
        ));
    }

    #[test]
    fn string_inputs_are_parsed_once() {
        let messages = vec![UnifiedMessage::assistant(vec![ContentPart::tool_call(
            "call_1",
            "search",
            json!("{\"q\":\"rust\"}"),
        )])];

        let converted = convert_history_for_anthropic(&messages).unwrap();

        assert_eq!(converted[0].extract_tool_calls()[0].input, &json!({"q": "rust"}));
    }

    #[test]
    fn results_without_identity_are_rejected() {
        let mut message = UnifiedMessage::tool("", "", "r");
        message.tool_call_id = None;
        message.tool_name = None;

        assert_eq!(
            convert_history_for_openai(&[message]).unwrap_err(),
            ConversionError::UnidentifiedToolResult
        );
    }

    #[test]
    fn truncation_drops_calls_and_their_results() {
        let normalizer = HistoryNormalizer::with_max_tool_parts(2);

        let messages = vec![
            UnifiedMessage::assistant(vec![
                ContentPart::tool_call("a", "f", json!({})),
                ContentPart::tool_call("b", "f", json!({})),
                ContentPart::tool_call("c", "f", json!({})),
            ]),
            UnifiedMessage::tool("a", "f", "1"),
            UnifiedMessage::tool("b", "f", "2"),
            UnifiedMessage::tool("c", "f", "3"),
        ];

        let normalized = normalizer.normalize(&messages, ProviderFamily::Anthropic, Some(ProviderFamily::OpenAi));

        assert_eq!(normalized.len(), 3);
        assert_eq!(call_ids(&normalized).len(), 2);
        assert_eq!(call_ids(&normalized), result_ids(&normalized));
    }

    #[test]
    fn limit_comes_from_configuration() {
        let normalizer = HistoryNormalizer::new(&HistoryConfig {
            max_tool_parts_per_message: 120,
        });

        assert_eq!(normalizer.max_tool_parts(), 120);
        assert_eq!(HistoryNormalizer::default().max_tool_parts(), 50);
    }

    #[test]
    fn degraded_history_short_circuits() {
        let messages = vec![UnifiedMessage::tool("call_missing", "search", "result")];

        let first = normalize_history(&messages, ProviderFamily::Google, Some(ProviderFamily::OpenAi)).into_owned();
        let second = normalize_history(&first, ProviderFamily::Anthropic, Some(ProviderFamily::Google));

        assert!(matches!(second, Cow::Borrowed(_)));
    }
}
