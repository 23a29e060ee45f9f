//! Webhook signature verification using HMAC-SHA256.
//!
//! Providers sign webhook payloads with a per-hook shared secret. The signature
//! arrives in the `X-Hub-Signature-256` header as `sha256=<hex>`.
//!
//! Verification is the first thing the receiver does with a payload; nothing
//! is parsed or written before it succeeds.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::secrets::SecretStore;

type HmacSha256 = Hmac<Sha256>;

/// Why a payload was not accepted as authentic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No signature header was supplied.
    #[error("missing signature")]
    MissingSignature,

    /// The signature does not match the payload under the hook's secret.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// No secret is registered for the hook.
    #[error("unknown hook: {0}")]
    UnknownHook(String),
}

/// Parses a signature header (e.g., "sha256=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
/// Never panics.
///
/// # Examples
///
/// ```
/// use jeeves::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 of a payload using the given secret.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value: `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Returns `true` if `signature_header` is the signature of `payload` under `secret`.
///
/// Uses the MAC's constant-time comparison. Malformed headers return `false`.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(provided) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);

    mac.verify_slice(&provided).is_ok()
}

/// Verifies a payload for `hook` against the secrets currently on record.
///
/// Checks run in a fixed order: the hook must have a secret, a signature must
/// have been supplied, and the signature must match. A hook without a secret
/// is rejected even when the caller supplies no signature at all.
///
/// # Examples
///
/// ```
/// use jeeves::webhooks::{AuthError, SecretStore, compute_signature, format_signature_header, verify};
///
/// let secrets = SecretStore::from_pairs([("codenames", "s3cret")]);
/// let payload = br#"{"ref":"refs/heads/main"}"#;
/// let header = format_signature_header(&compute_signature(payload, b"s3cret"));
///
/// assert_eq!(verify(payload, "codenames", Some(header.as_str()), &secrets), Ok(()));
/// assert_eq!(
///     verify(payload, "other", Some(header.as_str()), &secrets),
///     Err(AuthError::UnknownHook("other".into()))
/// );
/// ```
pub fn verify(
    payload: &[u8],
    hook: &str,
    provided_signature: Option<&str>,
    secrets: &SecretStore,
) -> Result<(), AuthError> {
    let secret = secrets
        .get(hook)
        .ok_or_else(|| AuthError::UnknownHook(hook.to_string()))?;
    let header = provided_signature.ok_or(AuthError::MissingSignature)?;

    if verify_signature(payload, header, secret) {
        Ok(())
    } else {
        Err(AuthError::SignatureMismatch)
    }
}
