//! Liveness check.
//!
//! Answers without touching GitHub or the router, so it stays green while
//! the API is unreachable.

use axum::http::StatusCode;

/// `GET /health` → 200 `OK`.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
