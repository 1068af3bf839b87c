/// Errors from the generation API layer.
///
/// A response that simply contains no image is not an error; see
/// [`crate::GenerationOutput::images`].
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("Gemini API error ({status}): {body}")]
    Api {
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("Failed to decode Gemini response: {0}")]
    Decode(String),
}
