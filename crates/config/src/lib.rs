mod error;
mod history;
mod images;
mod loader;

use std::path::Path;

use serde::Deserialize;

pub use error::Error;
pub use history::{DEFAULT_MAX_TOOL_PARTS_PER_MESSAGE, HistoryConfig};
pub use images::ImageConfig;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// History normalization settings.
    pub history: HistoryConfig,
    /// Image inlining settings used by encoders that need raw bytes.
    pub images: ImageConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        loader::load(path)
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml(content: &str) -> crate::Result<Config> {
        loader::parse(content)
    }
}
