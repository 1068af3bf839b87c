/// Errors from the record-store layer.
///
/// Nothing here is retried automatically; the caller's enclosing step fails.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Airtable returned a non-2xx status code.
    #[error("Airtable API error ({status}): {body}")]
    Api {
        status: u16,
        body: String,
    },

    /// A record did not have the shape an adapter expects.
    #[error("Unexpected record shape: {0}")]
    Schema(String),

    /// The configured API URL, base id or table name does not form a URL.
    #[error("Invalid Airtable URL: {0}")]
    InvalidUrl(String),
}

impl RecordStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecordStoreError::Api { status: 404, .. })
    }
}
