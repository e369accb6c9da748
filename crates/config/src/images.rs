use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Settings for fetching referenced images when a provider only accepts inline bytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Whether URL-only images are downloaded and inlined. When disabled they are dropped.
    pub inline_remote: bool,

    /// Timeout for a single image download.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,

    /// Largest accepted image body, in bytes.
    pub max_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            inline_remote: true,
            timeout: Duration::from_secs(10),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}
