//! Webhook endpoint handler.
//!
//! Each delivery is processed inline, in strict order:
//!
//! 1. verify the signature and parse the envelope
//! 2. answer `ping` immediately
//! 3. wait the consistency delay
//! 4. dispatch to the registered handlers
//! 5. respond
//!
//! GitHub does not redeliver on its own, so nothing is queued: a failed
//! dispatch is reported as a 500 and left to a human to redeliver.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::webhooks::{DispatchError, EnvelopeError, Event, InboundRequest};

/// Errors that can occur when processing a webhook.
///
/// Response bodies are deliberately generic; details only go to the log.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The delivery could not be authenticated or parsed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// A handler failed while processing the event.
    #[error(transparent)]
    HandlerFailure(#[from] DispatchError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Envelope(e) if e.is_authentication_failure() => StatusCode::UNAUTHORIZED,
            WebhookError::Envelope(_) => StatusCode::BAD_REQUEST,
            WebhookError::HandlerFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = status.canonical_reason().unwrap_or("Error");
        (status, message).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `X-GitHub-Event`: Event type (e.g., "issues", "ping")
///   - `X-GitHub-Delivery`: Unique delivery ID
///   - `X-Hub-Signature-256`: HMAC-SHA256 signature of the payload
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK, empty body: event processed (or nobody was interested), or ping
/// - 400 Bad Request: missing header, wrong content type, or invalid JSON
/// - 401 Unauthorized: invalid signature, or no secret configured
/// - 500 Internal Server Error: a handler failed
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let request = InboundRequest::new(headers, body);

    let event = Event::from_request(&request, app_state.webhook_secret()).map_err(|e| {
        warn!(error = %e, "Rejected webhook delivery");
        e
    })?;

    info!(
        delivery_id = %event.delivery_id(),
        event_type = %event.event_type(),
        action = event.action().unwrap_or("-"),
        "Received webhook"
    );

    if event.is_ping() {
        debug!(delivery_id = %event.delivery_id(), "Ping");
        return Ok(StatusCode::OK);
    }

    // GitHub's API can lag behind the webhook it just sent.
    let delay = app_state.consistency_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let tracker = app_state.trackers().open();
    let outcome = app_state
        .router()
        .dispatch(&event, tracker.as_ref())
        .await
        .map_err(|e| {
            error!(
                delivery_id = %event.delivery_id(),
                handler = %e.handler,
                completed = e.completed,
                error = %e.source,
                "Webhook handler failed"
            );
            e
        })?;

    if let Some(limit) = tracker.rate_limit() {
        info!(
            remaining = limit.remaining,
            limit = limit.limit,
            reset = ?limit.reset,
            "GitHub requests remaining"
        );
    }

    debug!(
        delivery_id = %event.delivery_id(),
        handlers_run = outcome.handlers_run,
        "Webhook processed"
    );
    Ok(StatusCode::OK)
}
