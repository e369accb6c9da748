use std::sync::Arc;

use config::ImageConfig;
use messages::{
    EncodedMessages, Encoder, HttpImageFetcher, ImageFetcher, ProviderFamily, UnifiedMessage, UnifiedToolDefinition,
    provider::{anthropic::AnthropicEncoder, google::GoogleEncoder, openai::OpenAiEncoder},
};
use serde::Serialize;
use serde_json::Value;

/// Request fields for the target vendor.
#[derive(Debug, Serialize)]
struct Payload<M, S, T> {
    #[serde(flatten)]
    encoded: EncodedMessages<M, S>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<T>,
}

/// Encodes messages and tools with the encoder of `target`.
pub async fn encode(
    target: ProviderFamily,
    messages: &[UnifiedMessage],
    tools: &[UnifiedToolDefinition],
    images: &ImageConfig,
) -> anyhow::Result<Value> {
    match target {
        ProviderFamily::OpenAi => payload(&OpenAiEncoder, messages, tools).await,
        ProviderFamily::Anthropic => payload(&AnthropicEncoder, messages, tools).await,
        ProviderFamily::Google => {
            let fetcher = if images.inline_remote {
                Some(Arc::new(HttpImageFetcher::new(images)?) as Arc<dyn ImageFetcher>)
            } else {
                None
            };

            payload(&GoogleEncoder::new(fetcher), messages, tools).await
        }
    }
}

async fn payload<E>(encoder: &E, messages: &[UnifiedMessage], tools: &[UnifiedToolDefinition]) -> anyhow::Result<Value>
where
    E: Encoder,
    E::Message: Serialize,
    E::System: Serialize,
    E::Tool: Serialize,
{
    let payload = Payload {
        encoded: encoder.encode_messages(messages).await,
        tools: encoder.encode_tools(tools),
    };

    Ok(serde_json::to_value(payload)?)
}

#[cfg(test)]
mod tests {
    use messages::{ContentPart, ToolOutput};
    use serde_json::json;

    use super::*;

    fn conversation() -> Vec<UnifiedMessage> {
        vec![
            UnifiedMessage::system("Be brief."),
            UnifiedMessage::user("Weather in Paris?"),
            UnifiedMessage::assistant(vec![ContentPart::tool_call(
                "call_1",
                "get_weather",
                json!({"city": "Paris"}),
            )]),
            UnifiedMessage::tool_output("call_1", "get_weather", ToolOutput::Text("18C".to_string())),
        ]
    }

    fn tools() -> Vec<UnifiedToolDefinition> {
        vec![UnifiedToolDefinition {
            name: "get_weather".to_string(),
            description: Some("Current weather".to_string()),
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {"city": {"type": "string"}}
            }),
        }]
    }

    #[tokio::test]
    async fn anthropic_payload() {
        let payload = encode(
            ProviderFamily::Anthropic,
            &conversation(),
            &tools(),
            &ImageConfig::default(),
        )
        .await
        .unwrap();

        insta::assert_json_snapshot!(payload, @r#"
        {
          "messages": [
            {
              "content": "Weather in Paris?",
              "role": "user"
            },
            {
              "content": [
                {
                  "id": "call_1",
                  "input": {
                    "city": "Paris"
                  },
                  "name": "get_weather",
                  "type": "tool_use"
                }
              ],
              "role": "assistant"
            },
            {
              "content": [
                {
                  "content": "18C",
                  "tool_use_id": "call_1",
                  "type": "tool_result"
                }
              ],
              "role": "user"
            }
          ],
          "system": "Be brief.",
          "tools": [
            {
              "description": "Current weather",
              "input_schema": {
                "additionalProperties": false,
                "properties": {
                  "city": {
                    "type": "string"
                  }
                },
                "type": "object"
              },
              "name": "get_weather"
            }
          ]
        }
        "#);
    }

    #[tokio::test]
    async fn google_payload_without_tools() {
        let config = ImageConfig {
            inline_remote: false,
            ..Default::default()
        };

        let payload = encode(ProviderFamily::Google, &conversation(), &[], &config)
            .await
            .unwrap();

        assert!(payload.get("tools").is_none());
        assert_eq!(payload["system"]["parts"][0]["text"], "Be brief.");
        assert_eq!(payload["messages"][1]["role"], "model");
        assert_eq!(
            payload["messages"][2]["parts"][0]["functionResponse"]["name"],
            "get_weather"
        );
    }
}
