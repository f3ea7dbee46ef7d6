//! Webhook envelope parsing.
//!
//! An [`InboundRequest`] is the raw delivery as received: headers plus body
//! bytes. [`Event::from_request`] turns it into a typed [`Event`] in two
//! strictly ordered steps:
//!
//! 1. The signature is verified over the raw body (see [`super::signature`])
//! 2. Only then are the headers and body parsed
//!
//! # Headers
//!
//! GitHub deliveries include:
//! - `X-GitHub-Event` - Event type (e.g., "issues")
//! - `X-GitHub-Delivery` - Unique delivery ID
//! - `X-Hub-Signature-256` - HMAC-SHA256 signature

use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;
use thiserror::Error;

use super::signature::verify_signature;
use crate::types::DeliveryId;

/// Header name for the GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header name for the GitHub delivery ID.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for the GitHub signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Error type for envelope failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Signature missing, malformed, wrong, or no secret configured.
    #[error("webhook signature could not be verified")]
    InvalidSignature,

    /// A required header is absent or not valid UTF-8.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// The body is declared as something other than JSON.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body is JSON but not an object.
    #[error("event payload is not a JSON object")]
    NotAnObject,
}

impl EnvelopeError {
    /// Returns true if this is an authentication failure rather than a
    /// malformed envelope.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, EnvelopeError::InvalidSignature)
    }
}

/// A raw webhook delivery as received from the transport.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    headers: HeaderMap,
    body: Bytes,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        InboundRequest {
            headers,
            body: body.into(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the `X-Hub-Signature-256` header value, if present.
    pub fn signature(&self) -> Option<&str> {
        header_str(&self.headers, HEADER_SIGNATURE)
    }
}

/// An authenticated, parsed webhook event.
///
/// Constructed once per delivery and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    delivery_id: DeliveryId,
    event_type: String,
    action: Option<String>,
    payload: Value,
}

impl Event {
    /// Creates an event from already-trusted parts.
    ///
    /// The action is taken from the payload's top-level `action` field.
    pub fn new(delivery_id: DeliveryId, event_type: impl Into<String>, payload: Value) -> Self {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        Event {
            delivery_id,
            event_type: event_type.into(),
            action,
            payload,
        }
    }

    /// Verifies and parses an inbound delivery.
    ///
    /// The signature is checked before the body is looked at. Every other
    /// check (headers, content type, JSON) happens afterwards.
    ///
    /// # Errors
    ///
    /// * [`EnvelopeError::InvalidSignature`] - authentication failed
    /// * any other variant - the delivery is malformed
    pub fn from_request(request: &InboundRequest, secret: Option<&[u8]>) -> Result<Self, EnvelopeError> {
        if !verify_signature(request.body(), request.signature(), secret) {
            return Err(EnvelopeError::InvalidSignature);
        }

        let headers = request.headers();
        let event_type = header_str(headers, HEADER_EVENT)
            .ok_or(EnvelopeError::MissingHeader(HEADER_EVENT))?;
        let delivery_id = header_str(headers, HEADER_DELIVERY)
            .ok_or(EnvelopeError::MissingHeader(HEADER_DELIVERY))?;

        check_content_type(headers)?;

        let payload: Value = serde_json::from_slice(request.body())?;
        if !payload.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }

        Ok(Event::new(DeliveryId::new(delivery_id), event_type, payload))
    }

    pub fn delivery_id(&self) -> &DeliveryId {
        &self.delivery_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Looks up a value by JSON pointer (e.g., `/issue/title`).
    pub fn get(&self, pointer: &str) -> Option<&Value> {
        self.payload.pointer(pointer)
    }

    /// Looks up a string by JSON pointer.
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.get(pointer).and_then(Value::as_str)
    }

    /// Returns true for GitHub's `ping` event, sent when a hook is created.
    pub fn is_ping(&self) -> bool {
        self.event_type == "ping"
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Accepts a missing content type or `application/json` with any parameters.
fn check_content_type(headers: &HeaderMap) -> Result<(), EnvelopeError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };

    let raw = value.to_str().unwrap_or_default();
    let mime = raw.split(';').next().unwrap_or_default().trim();
    if mime.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(EnvelopeError::UnsupportedContentType(raw.to_string()))
    }
}
