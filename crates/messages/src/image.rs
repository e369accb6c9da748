//! Image inlining for providers that refuse image references.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use config::ImageConfig;
use reqwest::header::CONTENT_TYPE;

use crate::{error::Error, http_client::default_http_client_builder};

/// An image downloaded for inlining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Base64 payload.
    pub data: String,
    pub media_type: String,
}

/// Downloads images referenced by URL.
///
/// This is the only suspension point of the encoders. Dropping the encode future
/// cancels the download.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> crate::Result<FetchedImage>;
}

/// [`ImageFetcher`] backed by a pooled reqwest client.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(config: &ImageConfig) -> crate::Result<Self> {
        let client = default_http_client_builder(config.timeout)
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    fn error(&self, url: &str, reason: impl ToString) -> Error {
        Error::ImageFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> crate::Result<FetchedImage> {
        if let Some((media_type, data)) = parse_data_url(url) {
            return Ok(FetchedImage {
                data: data.to_string(),
                media_type: media_type.to_string(),
            });
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| self.error(url, e))?;

        if let Some(length) = response.content_length().filter(|length| *length > self.max_bytes as u64) {
            return Err(self.error(url, format!("body of {length} bytes exceeds the limit of {}", self.max_bytes)));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| value.starts_with("image/"))
            .map(str::to_string)
            .unwrap_or_else(|| guess_media_type(url).to_string());

        // Chunked bodies carry no length up front, the limit is enforced while reading.
        let mut bytes = Vec::new();

        while let Some(chunk) = response.chunk().await.map_err(|e| self.error(url, e))? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.error(url, format!("body exceeds the limit of {} bytes", self.max_bytes)));
            }

            bytes.extend_from_slice(&chunk);
        }

        log::debug!("Inlined image from {url} ({} bytes, {media_type})", bytes.len());

        Ok(FetchedImage {
            data: BASE64_STANDARD.encode(&bytes),
            media_type,
        })
    }
}

/// Splits a base64 `data:` URL into media type and payload.
pub(crate) fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;

    Some((media_type, data))
}

/// Best effort media type from a URL's file extension.
pub(crate) fn guess_media_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
