//! Webhook Signature Verifier
//!
//! Validates that an inbound release notification originated from the
//! registered source, using the per-repository shared secret and an
//! HMAC-SHA256 keyed hash. Comparison is constant-time; absent or malformed
//! signatures are treated as a plain mismatch, never as an error.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fixed algorithm prefix carried by the signature header
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifier for shared-secret webhook signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookVerifier;

impl WebhookVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Check `provided_signature` against the HMAC-SHA256 of `raw_body`.
    ///
    /// Returns `false` when the header is missing, the prefix or hex encoding
    /// is malformed, or the digest does not match. The caller must treat
    /// `false` as "reject with 401", not as "retry".
    pub fn verify(&self, raw_body: &[u8], provided_signature: Option<&str>, secret: &str) -> bool {
        let Some(provided) = provided_signature else {
            return false;
        };
        let Some(hex_digest) = provided.strip_prefix(SIGNATURE_PREFIX) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };

        // HMAC accepts keys of any length, so construction cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(raw_body);

        // verify_slice is a constant-time comparison; a length mismatch takes
        // the same path as a content mismatch.
        mac.verify_slice(&expected).is_ok()
    }

    /// Produce the `sha256=<hex>` signature for a body, as the source host
    /// computes it. Used by tests and the connect-flow self-check.
    pub fn sign(&self, raw_body: &[u8], secret: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(raw_body);
        format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        )
    }
}

/// Mint a fresh shared secret for a webhook registration.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
