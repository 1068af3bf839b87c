//! REST client for the Gemini `generateContent` endpoint.

use async_trait::async_trait;
use heirloom_core::rate_limit::RateLimiter;

use crate::codec::{decode_response, request_body, GenerateContentResponse};
use crate::config::GeminiConfig;
use crate::error::GenerationError;
use crate::types::{GenerationOutput, GenerationRequest};

/// Sends an image plus instruction to a generative model.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// One outbound generation call. Returning zero images is a valid,
    /// non-error outcome.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError>;

    /// Model used when the request does not override it.
    fn default_model(&self) -> &str;
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    limiter: RateLimiter,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, config: &GeminiConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            limiter: RateLimiter::new(config.requests_per_second),
        }
    }

    /// `<api_url>/models/<model>:generateContent`
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.api_url)
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let model = request
            .params
            .model
            .clone()
            .unwrap_or_else(|| self.model.clone());
        let body = request_body(&request);

        self.limiter.wait_if_needed().await;
        tracing::debug!(%model, image_only = request.image_only, "Calling generateContent");

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let parsed: GenerateContentResponse = response.json().await?;

        let output = decode_response(parsed, &model)?;
        tracing::debug!(
            %model,
            images = output.images.len(),
            has_text = output.text.is_some(),
            "Generation finished"
        );
        Ok(output)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_model() {
        let mut config = GeminiConfig::new("key");
        config.api_url = "https://example.test/v1beta/".into();
        let client = GeminiClient::new(&config);
        assert_eq!(
            client.endpoint("gemini-x"),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
        assert_eq!(client.default_model(), "gemini-2.5-flash-image-preview");
    }
}
