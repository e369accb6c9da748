use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the message normalization layer.
///
/// Most operations in this crate are total and degrade instead of failing. The
/// variants below only escape through decoding raw provider JSON and image
/// downloads. Structured history conversion reports [`ConversionError`] on its own.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider body did not match the expected response shape.
    #[error("Invalid {provider} response: {source}")]
    InvalidResponse {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A referenced image could not be downloaded for inlining.
    #[error("Failed to fetch image from {url}: {reason}")]
    ImageFetch { url: String, reason: String },

    /// The HTTP client used for image downloads could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Reasons a structured provider-switch conversion gives up.
#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    /// A tool result references a call id that no earlier assistant message issued.
    #[error("Tool result references unknown call id '{0}'")]
    OrphanToolResult(String),

    /// A tool result for the named function has no pending call to pair with.
    #[error("No pending call of '{0}' to correlate a tool result with")]
    UncorrelatedToolResult(String),

    /// A tool call without a function name.
    #[error("Tool call '{0}' has an empty function name")]
    MissingToolName(String),

    /// Tool call arguments that are neither an object nor a JSON string holding one.
    #[error("Tool call '{id}' has invalid arguments: {reason}")]
    InvalidToolInput { id: String, reason: String },

    /// A tool result that carries neither a call id nor a function name.
    #[error("Tool result without call id or function name")]
    UnidentifiedToolResult,
}
