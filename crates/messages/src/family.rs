use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire-format family a model belongs to.
///
/// Several vendors speak one of these three formats, so the family is what decides
/// how history is encoded, not the vendor name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderFamily {
    /// Derives the family from a free-text model name.
    ///
    /// Accepts routed names such as `anthropic/claude-sonnet-4` as well as bare
    /// names. Anything unrecognized is treated as OpenAI-compatible.
    pub fn from_model_name(model: &str) -> Self {
        let model = model.trim().to_ascii_lowercase();
        let bare = model.rsplit('/').next().unwrap_or(&model);

        if bare.starts_with("claude") || model.contains("anthropic") {
            ProviderFamily::Anthropic
        } else if bare.starts_with("gemini")
            || bare.starts_with("gemma")
            || model.contains("google")
            || model.contains("vertex")
        {
            ProviderFamily::Google
        } else {
            ProviderFamily::OpenAi
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFamily::OpenAi => f.write_str("openai"),
            ProviderFamily::Anthropic => f.write_str("anthropic"),
            ProviderFamily::Google => f.write_str("google"),
        }
    }
}
