use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    provider::{EncodedMessages, Encoder, TextBuffer, reasoning_annotation},
    unified::{ContentPart, MessageContent, Role, ToolResultRef, UnifiedMessage, UnifiedToolDefinition},
};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAiRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the `messages` array of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiMessage {
    pub role: OpenAiRole,

    /// Always present. Assistant turns that only call tools carry an empty string.
    pub content: OpenAiContent,

    /// Calls requested by the assistant, with arguments as a JSON string.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<OpenAiToolCall>,

    /// Call answered by a `tool` message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: OpenAiRole, text: String) -> Self {
        Self {
            role,
            content: OpenAiContent::Text(text),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Message content: a plain string, or typed parts for multimodal user input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiImageUrl {
    /// A remote URL or a `data:` URL.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    pub r#type: ToolType,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// Tool definition in the `{type: "function", function: {...}}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiTool {
    pub r#type: ToolType,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Encodes unified history for the Chat Completions API.
///
/// System messages stay in the list, tool results become `tool` messages and
/// reasoning is kept as a text annotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiEncoder;

#[async_trait]
impl Encoder for OpenAiEncoder {
    type Message = OpenAiMessage;
    type System = String;
    type Tool = OpenAiTool;

    async fn encode_messages(&self, messages: &[UnifiedMessage]) -> EncodedMessages<OpenAiMessage, String> {
        let mut encoded = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::System => encoded.push(OpenAiMessage::text(OpenAiRole::System, flatten_text(&message.content))),
                Role::User => encode_user_message(message, &mut encoded),
                Role::Assistant => encode_assistant_message(message, &mut encoded),
                Role::Tool => push_tool_results(message.tool_results(), &mut encoded),
            }
        }

        EncodedMessages {
            messages: encoded,
            system: None,
        }
    }

    fn encode_tools(&self, tools: &[UnifiedToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|tool| OpenAiTool {
                r#type: ToolType::Function,
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect()
    }
}

fn flatten_text(content: &MessageContent) -> String {
    let mut buffer = TextBuffer::default();

    for part in content.parts().iter() {
        match part {
            ContentPart::Text { text } => buffer.push_text(text),
            // Signature carriers from other vendors have no text to show.
            ContentPart::Reasoning { text, .. } if text.is_empty() => (),
            ContentPart::Reasoning { text, .. } => buffer.push_annotation(&reasoning_annotation(text)),
            ContentPart::ToolResult { tool_name, output, .. } => {
                buffer.push_annotation(&format!("[Tool \"{tool_name}\" returned: {}]", output.to_text()))
            }
            ContentPart::ToolCall { tool_name, .. } => buffer.push_annotation(&format!("[Called tool \"{tool_name}\"]")),
            ContentPart::Image { .. } => buffer.push_annotation("[Image]"),
        }
    }

    buffer.into_string()
}

fn image_url(data: &str, media_type: &str, url: Option<&str>) -> String {
    match url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => format!("data:{media_type};base64,{data}"),
    }
}

fn encode_user_message(message: &UnifiedMessage, encoded: &mut Vec<OpenAiMessage>) {
    let parts = match &message.content {
        MessageContent::Text(text) => {
            encoded.push(OpenAiMessage::text(OpenAiRole::User, text.clone()));
            return;
        }
        MessageContent::Parts(parts) => parts,
    };

    // Results answer the preceding assistant turn, so they go first.
    let results = message.tool_results();
    let had_results = !results.is_empty();
    push_tool_results(results, encoded);

    let has_images = parts.iter().any(ContentPart::is_image);

    if has_images {
        let mut content = Vec::new();

        for part in parts {
            match part {
                ContentPart::Text { text } => content.push(OpenAiContentPart::Text { text: text.clone() }),
                ContentPart::Image { data, media_type, url } => content.push(OpenAiContentPart::ImageUrl {
                    image_url: OpenAiImageUrl {
                        url: image_url(data, media_type, url.as_deref()),
                    },
                }),
                ContentPart::Reasoning { text, .. } => content.push(OpenAiContentPart::Text {
                    text: reasoning_annotation(text),
                }),
                ContentPart::ToolCall { tool_name, .. } => content.push(OpenAiContentPart::Text {
                    text: format!("[Called tool \"{tool_name}\"]"),
                }),
                ContentPart::ToolResult { .. } => (),
            }
        }

        encoded.push(OpenAiMessage {
            role: OpenAiRole::User,
            content: OpenAiContent::Parts(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });

        return;
    }

    let remaining: Vec<ContentPart> = parts.iter().filter(|part| !part.is_tool_result()).cloned().collect();

    if had_results && remaining.is_empty() {
        return;
    }

    encoded.push(OpenAiMessage::text(
        OpenAiRole::User,
        flatten_text(&MessageContent::Parts(remaining)),
    ));
}

fn encode_assistant_message(message: &UnifiedMessage, encoded: &mut Vec<OpenAiMessage>) {
    let mut buffer = TextBuffer::default();
    let mut tool_calls = Vec::new();

    for part in message.content.parts().iter() {
        match part {
            ContentPart::Text { text } => buffer.push_text(text),
            ContentPart::Reasoning { text, .. } if text.is_empty() => (),
            ContentPart::Reasoning { text, .. } => buffer.push_annotation(&reasoning_annotation(text)),
            ContentPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => {
                let arguments = match input {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };

                tool_calls.push(OpenAiToolCall {
                    id: tool_call_id.clone(),
                    r#type: ToolType::Function,
                    function: OpenAiFunctionCall {
                        name: tool_name.clone(),
                        arguments,
                    },
                });
            }
            ContentPart::Image { url, .. } => {
                log::debug!("Assistant image content is not supported by OpenAI, keeping a placeholder");
                buffer.push_annotation(&match url {
                    Some(url) => format!("[Image: {url}]"),
                    None => "[Image]".to_string(),
                });
            }
            ContentPart::ToolResult { .. } => (),
        }
    }

    encoded.push(OpenAiMessage {
        role: OpenAiRole::Assistant,
        content: OpenAiContent::Text(buffer.into_string()),
        tool_calls,
        tool_call_id: None,
    });

    // Results stored inline with the call still need their own messages.
    if let MessageContent::Parts(parts) = &message.content
        && parts.iter().any(ContentPart::is_tool_result)
    {
        push_tool_results(message.tool_results(), encoded);
    }
}

fn push_tool_results(results: Vec<ToolResultRef<'_>>, encoded: &mut Vec<OpenAiMessage>) {
    for result in results {
        let tool_call_id = match result.tool_call_id {
            Some(id) => id.to_string(),
            None => {
                log::warn!(
                    "Tool result for '{}' has no call id, OpenAI will reject the pairing",
                    result.tool_name.unwrap_or("unknown")
                );
                String::new()
            }
        };

        encoded.push(OpenAiMessage {
            role: OpenAiRole::Tool,
            content: OpenAiContent::Text(result.output.to_text().into_owned()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id),
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::unified::ToolOutput;

    async fn encode(messages: &[UnifiedMessage]) -> EncodedMessages<OpenAiMessage, String> {
        OpenAiEncoder.encode_messages(messages).await
    }

    #[tokio::test]
    async fn tool_calls_and_results() {
        let messages = vec![
            UnifiedMessage::system("Be brief."),
            UnifiedMessage::user("Weather in Paris?"),
            UnifiedMessage::assistant(vec![
                ContentPart::text("Checking."),
                ContentPart::tool_call("call_1", "get_weather", json!({"city": "Paris"})),
            ]),
            UnifiedMessage::tool("call_1", "get_weather", "18C"),
        ];

        insta::assert_json_snapshot!(encode(&messages).await, @r#"
        {
          "messages": [
            {
              "role": "system",
              "content": "Be brief."
            },
            {
              "role": "user",
              "content": "Weather in Paris?"
            },
            {
              "role": "assistant",
              "content": "Checking.",
              "tool_calls": [
                {
                  "id": "call_1",
                  "type": "function",
                  "function": {
                    "name": "get_weather",
                    "arguments": "{\"city\":\"Paris\"}"
                  }
                }
              ]
            },
            {
              "role": "tool",
              "content": "18C",
              "tool_call_id": "call_1"
            }
          ]
        }
        "#);
    }

    #[tokio::test]
    async fn call_only_assistant_has_empty_content() {
        let messages = vec![UnifiedMessage::assistant(vec![ContentPart::tool_call(
            "call_1",
            "ping",
            json!({}),
        )])];

        let encoded = OpenAiEncoder.encode_messages(&messages).await;

        assert_eq!(encoded.messages[0].content, OpenAiContent::Text(String::new()));
        assert_eq!(encoded.messages[0].tool_calls[0].function.arguments, "{}");
    }

    #[tokio::test]
    async fn reasoning_is_annotated() {
        let messages = vec![UnifiedMessage::assistant(vec![
            ContentPart::reasoning("the user wants a number", Some("sig".to_string())),
            ContentPart::text("42"),
        ])];

        let encoded = OpenAiEncoder.encode_messages(&messages).await;

        assert_eq!(
            encoded.messages[0].content,
            OpenAiContent::Text("[Reasoning: the user wants a number]\n42".to_string())
        );
    }

    #[tokio::test]
    async fn images_prefer_urls() {
        let messages = vec![UnifiedMessage::user(vec![
            ContentPart::text("What is this?"),
            ContentPart::Image {
                data: "AAAA".to_string(),
                media_type: "image/png".to_string(),
                url: Some("https://example.com/a.png".to_string()),
            },
            ContentPart::Image {
                data: "BBBB".to_string(),
                media_type: "image/gif".to_string(),
                url: None,
            },
        ])];

        insta::assert_json_snapshot!(encode(&messages).await, @r#"
        {
          "messages": [
            {
              "role": "user",
              "content": [
                {
                  "type": "text",
                  "text": "What is this?"
                },
                {
                  "type": "image_url",
                  "image_url": {
                    "url": "https://example.com/a.png"
                  }
                },
                {
                  "type": "image_url",
                  "image_url": {
                    "url": "data:image/gif;base64,BBBB"
                  }
                }
              ]
            }
          ]
        }
        "#);
    }

    #[tokio::test]
    async fn user_tool_result_parts_become_tool_messages() {
        let messages = vec![UnifiedMessage::user(vec![
            ContentPart::tool_result("call_1", "search", ToolOutput::Json(json!({"hits": 2}))),
            ContentPart::tool_result("call_2", "search", ToolOutput::Error("timeout".to_string())),
        ])];

        let encoded = OpenAiEncoder.encode_messages(&messages).await;

        assert_eq!(encoded.messages.len(), 2);
        assert_eq!(encoded.messages[0].role, OpenAiRole::Tool);
        assert_eq!(encoded.messages[0].content, OpenAiContent::Text("{\"hits\":2}".to_string()));
        assert_eq!(encoded.messages[1].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(encoded.messages[1].content, OpenAiContent::Text("timeout".to_string()));
    }

    #[test]
    fn tools_use_function_envelope() {
        let tools = OpenAiEncoder.encode_tools(&[UnifiedToolDefinition {
            name: "search".to_string(),
            description: Some("Search the web".to_string()),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        }]);

        insta::assert_json_snapshot!(tools, @r#"
        [
          {
            "type": "function",
            "function": {
              "name": "search",
              "description": "Search the web",
              "parameters": {
                "type": "object",
                "properties": {
                  "q": {
                    "type": "string"
                  }
                }
              }
            }
          }
        ]
        "#);
    }
}
