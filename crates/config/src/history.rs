//! History normalization settings.

use serde::Deserialize;

/// Upper bound applied when a stored message carries an unusual number of tool parts.
pub const DEFAULT_MAX_TOOL_PARTS_PER_MESSAGE: usize = 50;

/// Configuration for rebuilding and converting stored conversation history.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Maximum number of tool calls, or tool results, reconstructed per message.
    ///
    /// Anything above the limit is truncated and logged. Agents that legitimately
    /// issue many parallel calls should raise this value.
    pub max_tool_parts_per_message: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_tool_parts_per_message: DEFAULT_MAX_TOOL_PARTS_PER_MESSAGE,
        }
    }
}
