//! Source image retrieval.

use async_trait::async_trait;

use crate::error::PipelineError;

/// Loads raw image bytes from a URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Fetches `http(s)://` URLs with reqwest and reads `file://` URLs from disk.
#[derive(Debug, Clone, Default)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        if let Some(path) = url.strip_prefix("file://") {
            return tokio::fs::read(path)
                .await
                .map_err(|e| PipelineError::Fetch(format!("{url}: {e}")));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PipelineError::Fetch(format!("unsupported image URL '{url}'")));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch(format!("{url}: HTTP {}", status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(format!("{url}: {e}")))?;
        tracing::debug!(url, bytes = bytes.len(), "Fetched source image");
        Ok(bytes.to_vec())
    }
}
