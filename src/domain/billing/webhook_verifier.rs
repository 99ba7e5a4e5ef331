//! Gateway webhook signature verification.
//!
//! The gateway signs the raw request body with HMAC-SHA512 keyed by the
//! account secret and sends the lowercase hex digest in a header.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Verifies webhook bodies against the shared secret.
pub struct WebhookSignatureVerifier {
    secret: SecretString,
}

impl WebhookSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Returns true only when `signature` is the hex HMAC-SHA512 of `body`.
    ///
    /// Never fails: a missing header, non-hex text, a wrong length, or a
    /// mismatch all read as "not verified".
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> bool {
        let Some(signature) = signature else {
            return false;
        };
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        match self.digest(body) {
            Some(expected) => constant_time_compare(&expected, &provided),
            None => false,
        }
    }

    /// Hex signature for `body`, as the gateway would send it.
    pub fn sign(&self, body: &[u8]) -> String {
        self.digest(body).map(hex::encode).unwrap_or_default()
    }

    fn digest(&self, body: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha512::new_from_slice(self.secret.expose_secret().as_bytes()).ok()?;
        mac.update(body);
        Some(mac.finalize().into_bytes().to_vec())
    }
}

/// Constant-time equality; unequal lengths fail fast since the length of a
/// SHA-512 digest is public.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
