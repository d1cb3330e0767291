//! Webhook signature verification (HMAC-SHA256).
//!
//! GitHub signs each delivery over the raw request body with the shared
//! webhook secret and sends the result as `X-Hub-Signature-256: sha256=<hex>`.
//! Verification happens before any payload parsing; a delivery that fails it
//! must not mutate any state.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Decodes a `sha256=<hex>` signature header into raw bytes.
///
/// Returns `None` for a missing prefix, a different algorithm, or invalid
/// hex. Never panics.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Renders a raw signature in GitHub's header format (`sha256=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a delivery against its signature header.
///
/// The comparison is constant-time (via `Mac::verify_slice`); malformed
/// headers simply fail verification.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(claimed) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&claimed).is_ok()
}
