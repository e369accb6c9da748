use std::borrow::Cow;

use crate::unified::{ContentPart, MessageContent, Role, ToolOutput, UnifiedMessage};

/// Number of characters of a tool result kept in its text annotation.
pub const MAX_TOOL_RESULT_CHARS: usize = 500;

/// Rewrites a history so that no tool structure survives.
///
/// Tool calls and results become bracketed annotations in assistant text, which
/// any provider accepts. Applying it twice yields the same messages as applying it
/// once.
pub fn fallback_to_text_conversion(messages: &[UnifiedMessage]) -> Vec<UnifiedMessage> {
    messages.iter().filter_map(degrade).collect()
}

fn degrade(message: &UnifiedMessage) -> Option<UnifiedMessage> {
    match message.role {
        Role::Tool => {
            let annotations: Vec<_> = message
                .tool_results()
                .into_iter()
                .map(|result| result_annotation(result.tool_name, &result.output))
                .collect();

            if annotations.is_empty() {
                return None;
            }

            Some(UnifiedMessage::assistant(annotations.join("\n")))
        }
        Role::Assistant => match &message.content {
            MessageContent::Text(text) => Some(UnifiedMessage::assistant(text.clone())),
            MessageContent::Parts(parts) => {
                let segments: Vec<Cow<'_, str>> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(Cow::Borrowed(text.as_str())),
                        ContentPart::ToolCall { tool_name, .. } => Some(Cow::Owned(call_annotation(tool_name))),
                        ContentPart::ToolResult { tool_name, output, .. } => {
                            Some(Cow::Owned(result_annotation(Some(tool_name.as_str()), output)))
                        }
                        _ => None,
                    })
                    .collect();

                Some(UnifiedMessage::assistant(segments.join("\n")))
            }
        },
        Role::System | Role::User => match &message.content {
            MessageContent::Parts(parts) if parts.iter().any(|p| p.is_tool_call() || p.is_tool_result()) => {
                let parts = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::ToolCall { tool_name, .. } => ContentPart::text(call_annotation(tool_name)),
                        ContentPart::ToolResult { tool_name, output, .. } => {
                            ContentPart::text(result_annotation(Some(tool_name.as_str()), output))
                        }
                        other => other.clone(),
                    })
                    .collect::<Vec<_>>();

                Some(UnifiedMessage::new(message.role, parts))
            }
            _ => Some(message.clone()),
        },
    }
}

fn call_annotation(name: &str) -> String {
    format!("[Called tool \"{}\"]", display_name(Some(name)))
}

fn result_annotation(name: Option<&str>, output: &ToolOutput) -> String {
    let text = output.to_text();
    let cut = text.char_indices().nth(MAX_TOOL_RESULT_CHARS).map(|(index, _)| index);

    let text = match cut {
        Some(cut) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    };

    format!("[Tool \"{}\" returned: {text}]", display_name(name))
}

fn display_name(name: Option<&str>) -> &str {
    name.filter(|name| !name.is_empty()).unwrap_or("unknown")
}
