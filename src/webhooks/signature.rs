//! Webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery with HMAC-SHA256 keyed by the shared webhook
//! secret and sends the digest in the `X-Hub-Signature-256` header as
//! `sha256=<hex>`.
//!
//! Verification runs over the exact, unparsed request body and must succeed
//! before the body is handed to any JSON parser. A missing header or a missing
//! secret is a verification failure, never an error.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parses a signature header (e.g., "sha256=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
/// Never panics.
///
/// # Examples
///
/// ```
/// use searx_instances_bot::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload using the given secret.
///
/// Used by tests and tooling to produce valid deliveries.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a GitHub-style header value (`sha256=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a webhook signature against the raw payload and shared secret.
///
/// Returns `true` only if both the header and the secret are present, the
/// header is well formed, and the digest matches. The digest comparison is
/// constant-time.
///
/// # Arguments
///
/// * `payload` - The raw request body, exactly as received
/// * `signature_header` - The `X-Hub-Signature-256` header value, if any
/// * `secret` - The configured webhook secret, if any
///
/// # Examples
///
/// ```
/// use searx_instances_bot::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let payload = b"Hello, World!";
/// let secret = b"my-secret-key";
/// let header = format_signature_header(&compute_signature(payload, secret));
///
/// assert!(verify_signature(payload, Some(&header), Some(secret)));
/// assert!(!verify_signature(payload, Some(&header), Some(b"wrong-secret")));
/// assert!(!verify_signature(payload, None, Some(secret)));
/// assert!(!verify_signature(payload, Some(&header), None));
/// ```
pub fn verify_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: Option<&[u8]>,
) -> bool {
    let (Some(header), Some(secret)) = (signature_header, secret) else {
        return false;
    };

    let Some(expected_signature) = parse_signature_header(header) else {
        return false;
    };

    let mut mac = match <HmacSha256 as Mac>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // Constant-time comparison via the HMAC library
    mac.verify_slice(&expected_signature).is_ok()
}
