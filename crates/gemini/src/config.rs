pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 2.0;

/// Generation API settings loaded from environment variables.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_url: String,
    /// Model used when a request does not name one.
    pub model: String,
    pub requests_per_second: f64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.into(),
            model: DEFAULT_MODEL.into(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default                                             |
    /// |------------------------------|-----------------------------------------------------|
    /// | `GEMINI_API_KEY`             | required (falls back to `GOOGLE_API_KEY`)           |
    /// | `GEMINI_API_URL`             | `https://generativelanguage.googleapis.com/v1beta`  |
    /// | `GEMINI_MODEL`               | `gemini-2.5-flash-image-preview`                    |
    /// | `GEMINI_REQUESTS_PER_SECOND` | `2`                                                 |
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .expect("GEMINI_API_KEY (or GOOGLE_API_KEY) must be set");

        let api_url = std::env::var("GEMINI_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

        let requests_per_second: f64 = std::env::var("GEMINI_REQUESTS_PER_SECOND")
            .unwrap_or_else(|_| DEFAULT_REQUESTS_PER_SECOND.to_string())
            .parse()
            .expect("GEMINI_REQUESTS_PER_SECOND must be a number");

        Self {
            api_key,
            api_url,
            model,
            requests_per_second,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}
