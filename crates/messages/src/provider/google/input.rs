use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    image::ImageFetcher,
    provider::{
        EncodedMessages, Encoder,
        google::output::{GoogleBlob, GoogleContent, GoogleFunctionCall, GoogleFunctionResponse, GooglePart, GoogleRole},
        reasoning_annotation, tool_input_object,
    },
    unified::{ContentPart, Role, ToolOutput, ToolResultRef, UnifiedMessage, UnifiedToolDefinition},
};

/// Tool configuration for function calling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    /// A list of function declarations that the model can call.
    pub function_declarations: Vec<GoogleFunctionDeclaration>,
}

/// Declaration of a function that the model can call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoogleFunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The parameters of this function in the JSON Schema subset Gemini accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl From<&UnifiedToolDefinition> for GoogleFunctionDeclaration {
    fn from(tool: &UnifiedToolDefinition) -> Self {
        let mut parameters = tool.input_schema.clone();
        strip_unsupported_schema_fields(&mut parameters);

        Self {
            name: tool.name.clone(),
            description: tool.description.clone().filter(|description| !description.is_empty()),
            parameters: (!parameters.is_null()).then_some(parameters),
        }
    }
}

/// Recursively removes JSON Schema fields Gemini rejects.
fn strip_unsupported_schema_fields(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };

    map.remove("additionalProperties");
    map.remove("$schema");
    map.remove("default");

    // Gemini only supports "enum" and "date-time" formats on strings.
    let is_string = map.get("type").and_then(Value::as_str) == Some("string");
    let unsupported_format = map
        .get("format")
        .and_then(Value::as_str)
        .is_some_and(|format| format != "enum" && format != "date-time");

    if is_string && unsupported_format {
        map.remove("format");
    }

    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        for property in properties.values_mut() {
            strip_unsupported_schema_fields(property);
        }
    }

    if let Some(items) = map.get_mut("items") {
        strip_unsupported_schema_fields(items);
    }
}

/// Encodes unified history for `generateContent`.
///
/// Images given only by URL are downloaded through the configured fetcher, Gemini
/// does not accept remote references. Without a fetcher such images are dropped.
#[derive(Default, Clone)]
pub struct GoogleEncoder {
    images: Option<Arc<dyn ImageFetcher>>,
}

impl GoogleEncoder {
    pub fn new(images: Option<Arc<dyn ImageFetcher>>) -> Self {
        Self { images }
    }
}

impl std::fmt::Debug for GoogleEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleEncoder")
            .field("inline_remote_images", &self.images.is_some())
            .finish()
    }
}

#[async_trait]
impl Encoder for GoogleEncoder {
    type Message = GoogleContent;
    type System = GoogleContent;
    type Tool = GoogleTool;

    async fn encode_messages(&self, messages: &[UnifiedMessage]) -> EncodedMessages<GoogleContent, GoogleContent> {
        let mut contents: Vec<GoogleContent> = Vec::new();
        let mut system = Vec::new();
        let mut tool_call_names: HashMap<String, String> = HashMap::new();

        for message in messages {
            let (role, parts) = match message.role {
                Role::System => {
                    let text = message.extract_text();

                    if !text.is_empty() {
                        system.push(text);
                    }

                    continue;
                }
                Role::Tool => (
                    GoogleRole::User,
                    function_responses(message.tool_results(), &tool_call_names),
                ),
                Role::User => (GoogleRole::User, self.convert_parts(message, &mut tool_call_names).await),
                Role::Assistant => (GoogleRole::Model, self.convert_parts(message, &mut tool_call_names).await),
            };

            push_content(&mut contents, role, parts);
        }

        let system = (!system.is_empty()).then(|| GoogleContent {
            parts: vec![GooglePart::text(system.join("\n\n"))],
            role: GoogleRole::User,
        });

        EncodedMessages {
            messages: contents,
            system,
        }
    }

    fn encode_tools(&self, tools: &[UnifiedToolDefinition]) -> Vec<GoogleTool> {
        if tools.is_empty() {
            return Vec::new();
        }

        vec![GoogleTool {
            function_declarations: tools.iter().map(GoogleFunctionDeclaration::from).collect(),
        }]
    }
}

impl GoogleEncoder {
    async fn convert_parts(
        &self,
        message: &UnifiedMessage,
        tool_call_names: &mut HashMap<String, String>,
    ) -> Vec<GooglePart> {
        let content = message.content.parts();
        let mut parts = Vec::with_capacity(content.len());
        // A textless signature belongs to the function call that follows it.
        let mut call_signature: Option<String> = None;

        for part in content.iter() {
            if !part.is_tool_call()
                && let Some(signature) = call_signature.take()
            {
                parts.push(thought_part(String::new(), signature));
            }

            match part {
                ContentPart::Text { text } => {
                    if !text.is_empty() {
                        parts.push(GooglePart::text(text.clone()));
                    }
                }
                ContentPart::Reasoning {
                    text,
                    signature: Some(signature),
                } => {
                    if text.is_empty() {
                        call_signature = Some(signature.clone());
                    } else {
                        parts.push(thought_part(text.clone(), signature.clone()));
                    }
                }
                ContentPart::Reasoning { text, signature: None } => {
                    if !text.is_empty() {
                        parts.push(GooglePart::text(reasoning_annotation(text)));
                    }
                }
                ContentPart::Image { data, media_type, url } => {
                    if let Some(blob) = self.inline_image(data, media_type, url.as_deref()).await {
                        parts.push(GooglePart {
                            inline_data: Some(blob),
                            ..Default::default()
                        });
                    }
                }
                ContentPart::ToolCall {
                    tool_call_id,
                    tool_name,
                    input,
                } => {
                    tool_call_names.insert(tool_call_id.clone(), tool_name.clone());

                    parts.push(GooglePart {
                        function_call: Some(GoogleFunctionCall {
                            id: None,
                            name: tool_name.clone(),
                            args: tool_input_object(tool_call_id, input),
                        }),
                        thought_signature: call_signature.take(),
                        ..Default::default()
                    });
                }
                ContentPart::ToolResult { .. } => (),
            }
        }

        if let Some(signature) = call_signature {
            parts.push(thought_part(String::new(), signature));
        }

        if content.iter().any(ContentPart::is_tool_result) {
            parts.extend(function_responses(message.tool_results(), tool_call_names));
        }

        parts
    }

    async fn inline_image(&self, data: &str, media_type: &str, url: Option<&str>) -> Option<GoogleBlob> {
        if !data.is_empty() {
            return Some(GoogleBlob {
                mime_type: media_type.to_string(),
                data: data.to_string(),
            });
        }

        let url = url.filter(|url| !url.is_empty())?;

        let Some(fetcher) = &self.images else {
            log::warn!("Dropping image {url}: Gemini needs inline bytes and remote inlining is disabled");
            return None;
        };

        match fetcher.fetch(url).await {
            Ok(image) => Some(GoogleBlob {
                mime_type: image.media_type,
                data: image.data,
            }),
            Err(e) => {
                log::warn!("Dropping image {url}: {e}");
                None
            }
        }
    }
}

fn thought_part(text: String, signature: String) -> GooglePart {
    GooglePart {
        text: Some(text),
        thought: Some(true),
        thought_signature: Some(signature),
        ..Default::default()
    }
}

/// Function response payload. Gemini only accepts JSON objects.
fn tool_result_value(output: &ToolOutput) -> Value {
    match output {
        ToolOutput::Json(value @ Value::Object(_)) => value.clone(),
        ToolOutput::Json(value) => json!({ "result": value }),
        ToolOutput::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => value,
            _ => json!({ "result": text }),
        },
        ToolOutput::Error(error) => json!({ "error": error }),
    }
}

fn function_responses(results: Vec<ToolResultRef<'_>>, tool_call_names: &HashMap<String, String>) -> Vec<GooglePart> {
    results
        .into_iter()
        .map(|result| {
            let name = result
                .tool_name
                .map(str::to_string)
                .or_else(|| result.tool_call_id.and_then(|id| tool_call_names.get(id).cloned()))
                .unwrap_or_else(|| {
                    log::warn!(
                        "Could not find function name for tool call id {}, using it as the name",
                        result.tool_call_id.unwrap_or("<missing>")
                    );
                    result.tool_call_id.unwrap_or("unknown").to_string()
                });

            GooglePart {
                function_response: Some(GoogleFunctionResponse {
                    name,
                    response: tool_result_value(&result.output),
                }),
                ..Default::default()
            }
        })
        .collect()
}

/// Appends a turn, merging it into the previous one when the role repeats.
fn push_content(contents: &mut Vec<GoogleContent>, role: GoogleRole, mut parts: Vec<GooglePart>) {
    if let Some(last) = contents.last_mut()
        && last.role == role
    {
        // A turn made only of an empty text part is a placeholder, drop it when merging.
        if last.parts == [GooglePart::text("")] {
            last.parts.clear();
        }

        if !parts.is_empty() {
            last.parts.append(&mut parts);
        }

        return;
    }

    if parts.is_empty() {
        parts.push(GooglePart::text(""));
    }

    contents.push(GoogleContent { parts, role });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::{
        error::Error,
        image::FetchedImage,
        provider::{Decoder, google::GoogleDecoder},
        tracker::ToolCallTracker,
    };

    struct StubFetcher {
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> crate::Result<FetchedImage> {
            self.requested.lock().unwrap().push(url.to_string());

            if self.fail {
                return Err(Error::ImageFetch {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                });
            }

            Ok(FetchedImage {
                data: "aW1n".to_string(),
                media_type: "image/png".to_string(),
            })
        }
    }

    fn stub(fail: bool) -> Arc<StubFetcher> {
        Arc::new(StubFetcher {
            requested: Mutex::new(Vec::new()),
            fail,
        })
    }

    #[tokio::test]
    async fn calls_and_results_are_paired_by_name() {
        let messages = vec![
            UnifiedMessage::system("Be terse."),
            UnifiedMessage::user("Weather?"),
            UnifiedMessage::assistant(vec![ContentPart::tool_call(
                "call_1",
                "get_weather",
                json!({"city": "Paris"}),
            )]),
            UnifiedMessage::tool("call_1", "get_weather", "{\"temp\": 18}"),
            UnifiedMessage::tool("call_2", "get_weather", "sunny"),
        ];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        insta::assert_json_snapshot!(encoded, @r#"
        {
          "messages": [
            {
              "parts": [
                {
                  "text": "Weather?"
                }
              ],
              "role": "user"
            },
            {
              "parts": [
                {
                  "functionCall": {
                    "name": "get_weather",
                    "args": {
                      "city": "Paris"
                    }
                  }
                }
              ],
              "role": "model"
            },
            {
              "parts": [
                {
                  "functionResponse": {
                    "name": "get_weather",
                    "response": {
                      "temp": 18
                    }
                  }
                },
                {
                  "functionResponse": {
                    "name": "get_weather",
                    "response": {
                      "result": "sunny"
                    }
                  }
                }
              ],
              "role": "user"
            }
          ],
          "system": {
            "parts": [
              {
                "text": "Be terse."
              }
            ],
            "role": "user"
          }
        }
        "#);
    }

    #[tokio::test]
    async fn thought_signatures_are_echoed() {
        let mut tracker = ToolCallTracker::new();

        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "plan", "thought": true, "thoughtSignature": "SIG_A"},
                        {"functionCall": {"name": "search"}, "thoughtSignature": "SIG_B"}
                    ]
                },
                "finishReason": "STOP"
            }]
        });

        let response = GoogleDecoder::new(&mut tracker).decode_json(body).unwrap();

        let messages = vec![UnifiedMessage::user("Find it"), response.into_message()];
        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        insta::assert_json_snapshot!(encoded.messages[1], @r#"
        {
          "parts": [
            {
              "text": "plan",
              "thought": true,
              "thoughtSignature": "SIG_A"
            },
            {
              "thoughtSignature": "SIG_B",
              "functionCall": {
                "name": "search",
                "args": {}
              }
            }
          ],
          "role": "model"
        }
        "#);
    }

    #[tokio::test]
    async fn unattached_signature_stays_a_thought() {
        let messages = vec![UnifiedMessage::assistant(vec![
            ContentPart::reasoning("", Some("SIG".to_string())),
            ContentPart::text("Done."),
        ])];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        assert_eq!(
            encoded.messages[0].parts,
            vec![
                GooglePart {
                    text: Some(String::new()),
                    thought: Some(true),
                    thought_signature: Some("SIG".to_string()),
                    ..Default::default()
                },
                GooglePart::text("Done."),
            ]
        );
    }

    #[tokio::test]
    async fn result_name_comes_from_call_when_missing() {
        let mut result = UnifiedMessage::tool("call_1", "", "ok");
        result.tool_name = None;

        let messages = vec![
            UnifiedMessage::assistant(vec![ContentPart::tool_call("call_1", "lookup", json!({}))]),
            result,
        ];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        let response = encoded.messages[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "lookup");
        assert_eq!(response.response, json!({"result": "ok"}));
    }

    #[tokio::test]
    async fn error_outputs_are_wrapped() {
        let messages = vec![UnifiedMessage::tool_output(
            "call_1",
            "lookup",
            ToolOutput::Error("not found".to_string()),
        )];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        let response = encoded.messages[0].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.response, json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn remote_images_are_inlined() {
        let fetcher = stub(false);
        let encoder = GoogleEncoder::new(Some(fetcher.clone() as Arc<dyn ImageFetcher>));

        let messages = vec![UnifiedMessage::user(vec![
            ContentPart::text("What is it?"),
            ContentPart::Image {
                data: String::new(),
                media_type: "image/jpeg".to_string(),
                url: Some("https://example.com/cat.jpg".to_string()),
            },
        ])];

        let encoded = encoder.encode_messages(&messages).await;

        assert_eq!(
            encoded.messages[0].parts[1].inline_data,
            Some(GoogleBlob {
                mime_type: "image/png".to_string(),
                data: "aW1n".to_string(),
            })
        );
        assert_eq!(*fetcher.requested.lock().unwrap(), vec!["https://example.com/cat.jpg"]);
    }

    #[tokio::test]
    async fn failed_images_are_dropped() {
        let encoder = GoogleEncoder::new(Some(stub(true) as Arc<dyn ImageFetcher>));

        let messages = vec![UnifiedMessage::user(vec![
            ContentPart::text("What is it?"),
            ContentPart::Image {
                data: String::new(),
                media_type: "image/jpeg".to_string(),
                url: Some("https://example.com/cat.jpg".to_string()),
            },
        ])];

        let encoded = encoder.encode_messages(&messages).await;

        assert_eq!(encoded.messages[0].parts, vec![GooglePart::text("What is it?")]);
    }

    #[tokio::test]
    async fn consecutive_roles_merge_and_empty_turns_stay_valid() {
        let messages = vec![
            UnifiedMessage::user("one"),
            UnifiedMessage::user("two"),
            UnifiedMessage::assistant(""),
        ];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        assert_eq!(encoded.messages.len(), 2);
        assert_eq!(encoded.messages[0].parts, vec![GooglePart::text("one"), GooglePart::text("two")]);
        assert_eq!(encoded.messages[1].parts, vec![GooglePart::text("")]);
        assert_eq!(encoded.messages[1].role, GoogleRole::Model);
    }

    #[tokio::test]
    async fn reasoning_is_kept_as_text() {
        let messages = vec![UnifiedMessage::assistant(vec![ContentPart::reasoning("hmm", None)])];

        let encoded = GoogleEncoder::default().encode_messages(&messages).await;

        assert_eq!(encoded.messages[0].parts, vec![GooglePart::text("[Reasoning: hmm]")]);
    }

    #[test]
    fn schemas_are_cleaned() {
        let tools = GoogleEncoder::default().encode_tools(&[UnifiedToolDefinition {
            name: "create_event".to_string(),
            description: Some(String::new()),
            input_schema: json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "email": {"type": "string", "format": "email"},
                    "when": {"type": "string", "format": "date-time", "default": "now"},
                    "tags": {"type": "array", "items": {"type": "object", "additionalProperties": true}}
                }
            }),
        }]);

        insta::assert_json_snapshot!(tools, @r#"
        [
          {
            "functionDeclarations": [
              {
                "name": "create_event",
                "parameters": {
                  "properties": {
                    "email": {
                      "type": "string"
                    },
                    "tags": {
                      "items": {
                        "type": "object"
                      },
                      "type": "array"
                    },
                    "when": {
                      "format": "date-time",
                      "type": "string"
                    }
                  },
                  "type": "object"
                }
              }
            ]
          }
        ]
        "#);
    }
}
