//! Liveness check.

use axum::http::StatusCode;

/// `GET /health`: 200 "OK" while the receiver is accepting connections.
///
/// Touches neither the spool nor the secrets file.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
