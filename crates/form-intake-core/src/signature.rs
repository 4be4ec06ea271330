//! Webhook signature verification.
//!
//! Provides HMAC-SHA256 signature verification for Typeform webhooks using
//! constant-time comparison to prevent timing attacks.
//!
//! Typeform signs each delivery with HMAC-SHA256 over the raw request body,
//! keyed by a shared secret, and sends the digest Base64-encoded (not hex)
//! in the `Typeform-Signature` header as `sha256=<base64-digest>`. The
//! verifier reproduces that encoding bit-exactly; any deviation silently
//! breaks all authentication.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Literal prefix carried by every Typeform signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

// ============================================================================
// Secret access
// ============================================================================

/// Source of the shared webhook signing secret.
///
/// The secret is resolved at verification time, not at construction time, so
/// implementations may read it fresh from the environment or fetch it from a
/// secret store on every request. The secret must never be logged or echoed
/// back to callers.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Return the shared signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError`] when the secret is absent or unavailable.
    /// Callers must treat any secret failure identically to a signature
    /// mismatch so that the response does not leak which check failed.
    async fn webhook_secret(&self) -> Result<Zeroizing<String>, SecretError>;
}

/// Error type for secret retrieval
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not configured: {key}")]
    NotConfigured { key: String },

    #[error("Secret provider unavailable: {0}")]
    ProviderUnavailable(String),
}

// ============================================================================
// SignatureVerifier
// ============================================================================

/// Verifies Typeform webhook signatures using HMAC-SHA256.
///
/// The verifier operates over the complete raw request body exactly as
/// received, before any JSON parsing, because re-serializing the payload
/// could change byte layout (key order, whitespace) and invalidate the
/// signature.
///
/// # Security
///
/// - Uses constant-time comparison to prevent timing attacks
/// - Never logs secrets or signature values
/// - A missing secret, a missing signature, and a mismatch are all reported
///   as the same non-authentic verdict by callers
#[derive(Clone)]
pub struct SignatureVerifier {
    secrets: Arc<dyn SecretProvider>,
}

impl SignatureVerifier {
    /// Create a new signature verifier.
    ///
    /// # Arguments
    ///
    /// * `secrets` - Provider for retrieving the shared signing secret
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self { secrets }
    }

    /// Verify a claimed webhook signature against the raw body bytes.
    ///
    /// Computes `sha256=<base64(HMAC-SHA256(secret, payload))>` and compares
    /// it to the claimed value in constant time.
    ///
    /// # Arguments
    ///
    /// * `payload` - The raw request body bytes, exactly as received
    /// * `claimed` - The `Typeform-Signature` header value
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Signature is authentic
    /// * `Ok(false)` - Signature does not match (tampered payload, wrong
    ///   secret, wrong encoding, or wrong prefix)
    /// * `Err` - The secret could not be retrieved
    pub async fn verify(&self, payload: &[u8], claimed: &str) -> Result<bool, SecretError> {
        let secret = self.secrets.webhook_secret().await?;
        let expected = compute_signature(payload, &secret);
        Ok(constant_time_eq(expected.as_bytes(), claimed.as_bytes()))
    }
}

// Security: don't expose the secret source in debug output
impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secrets", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Signature computation
// ============================================================================

/// Compute the expected signature string for a payload.
///
/// Produces the literal prefix `sha256=` followed by the standard-Base64
/// encoding of the HMAC-SHA256 digest of `payload`, keyed by the UTF-8 bytes
/// of `secret`. This is the exact format Typeform places in the
/// `Typeform-Signature` header.
pub fn compute_signature(payload: &[u8], secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();

    format!("{}{}", SIGNATURE_PREFIX, STANDARD.encode(digest))
}

/// Constant-time comparison of two byte slices.
///
/// Uses the `subtle` crate for cryptographically secure comparison. The
/// length check is performed first; leaking the length is acceptable because
/// a correctly formatted signature always has a fixed length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
