//! Webhook endpoint handler.
//!
//! Authenticates a delivery and spools it before answering. Nothing here
//! waits on the dispatcher; a 200 only means the payload is on disk.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::spool::SpoolError;
use crate::types::{Event, HookName, InvalidHookName, Source};
use crate::webhooks::{AuthError, SecretsError, verify};

/// Header carrying the payload signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Content-Type is not JSON.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The hook name is not usable.
    #[error(transparent)]
    InvalidHook(#[from] InvalidHookName),

    /// Signature verification failed.
    #[error("forbidden: {0}")]
    Auth(#[from] AuthError),

    /// The secrets file could not be loaded.
    #[error("secrets unavailable: {0}")]
    Secrets(#[from] SecretsError),

    /// The payload could not be spooled.
    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::UnsupportedContentType(_) | WebhookError::InvalidJson(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            WebhookError::InvalidHook(_) => StatusCode::BAD_REQUEST,
            WebhookError::Auth(_) => StatusCode::FORBIDDEN,
            WebhookError::Secrets(_) | WebhookError::Spool(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal failure details stay in the log.
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal error".to_string(),
            StatusCode::FORBIDDEN => "Forbidden".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Webhook handler for `POST /{source}/{hook}`.
///
/// # Response
///
/// - 200 "Done": payload spooled
/// - 400 Bad Request: hook name unusable as a spool name
/// - 403 Forbidden: unknown hook, missing or wrong signature
/// - 415 Unsupported Media Type: not JSON
/// - 500 Internal Server Error: secrets unreadable or spool write failed
///
/// # Example
///
/// ```ignore
/// POST /github/codenames HTTP/1.1
/// X-Hub-Signature-256: sha256=...
/// Content-Type: application/json
///
/// {"ref": "refs/heads/main", ...}
///
/// HTTP/1.1 200 OK
///
/// Done
/// ```
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    Path((source, hook)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let source = Source::from_path_segment(&source);

    debug!(source = %source, hook = %hook, bytes = body.len(), "Received webhook");

    require_json_content_type(&headers)?;

    let hook = HookName::parse(&hook).inspect_err(|e| {
        warn!(source = %source, error = %e, "Rejected webhook with invalid hook name");
    })?;

    if app_state.requires_signature(&source) {
        let secrets = app_state.secrets().load().inspect_err(|e| {
            error!(error = %e, "Failed to load webhook secrets");
        })?;
        let signature = headers
            .get(HEADER_SIGNATURE)
            .and_then(|v| v.to_str().ok());

        verify(&body, hook.as_str(), signature, &secrets).inspect_err(|e| {
            warn!(source = %source, hook = %hook, error = %e, "Webhook authentication failed");
        })?;
    }

    // Only well-formed JSON is spooled; the parsed value itself is not needed.
    serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;

    let event = Event::new(hook, source, body);
    match app_state.spool().enqueue_event(&event) {
        Ok(entry) => {
            info!(source = %event.source, hook = %event.hook, entry = %entry.id, "Webhook spooled");
            Ok((StatusCode::OK, "Done"))
        }
        Err(e) => {
            error!(source = %event.source, hook = %event.hook, error = %e, "Failed to spool webhook");
            Err(WebhookError::Spool(e))
        }
    }
}

/// Accepts `application/json`, with or without parameters.
fn require_json_content_type(headers: &HeaderMap) -> Result<(), WebhookError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mime = value.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(WebhookError::UnsupportedContentType(value.to_string()))
    }
}
