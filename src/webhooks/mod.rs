//! Webhook authentication.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - The per-hook secret store the verifier checks against

pub mod secrets;
pub mod signature;

pub use secrets::{SecretSource, SecretStore, SecretsError, SecretsFile};
pub use signature::{
    AuthError, compute_signature, format_signature_header, parse_signature_header, verify,
    verify_signature,
};
