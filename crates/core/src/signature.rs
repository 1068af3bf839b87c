//! Webhook HMAC-SHA256 signing and verification.
//!
//! The record store signs the raw request body with a shared secret and
//! sends the lowercase hex digest in a header. Verification decodes the
//! header and compares MACs in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Compute the hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// How incoming webhook bodies are authenticated.
#[derive(Clone)]
pub enum WebhookVerifier {
    /// Require a valid HMAC-SHA256 signature under the shared secret.
    Hmac { secret: String },
    /// No secret configured: every request is accepted. Development only.
    Permissive,
}

impl WebhookVerifier {
    /// Build a verifier from an optional secret; empty secrets count as absent.
    pub fn from_secret(secret: Option<String>) -> Self {
        match secret {
            Some(secret) if !secret.trim().is_empty() => WebhookVerifier::Hmac { secret },
            _ => WebhookVerifier::Permissive,
        }
    }

    pub fn is_permissive(&self) -> bool {
        matches!(self, WebhookVerifier::Permissive)
    }

    /// Check `signature` (hex, as sent in the header) against `body`.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), CoreError> {
        let secret = match self {
            WebhookVerifier::Permissive => return Ok(()),
            WebhookVerifier::Hmac { secret } => secret,
        };

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Unauthorized("Missing signature".into()))?;
        let expected = hex::decode(signature)
            .ok_or_else(|| CoreError::Unauthorized("Invalid signature".into()))?;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| CoreError::Unauthorized("Invalid signature".into()))
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookVerifier::Hmac { .. } => f.write_str("WebhookVerifier::Hmac(<redacted>)"),
            WebhookVerifier::Permissive => f.write_str("WebhookVerifier::Permissive"),
        }
    }
}

// ---------------------------------------------------------------------------
// hex helpers (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string (either case). Returns `None` on odd length or
    /// non-hex characters.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
