//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Envelope parsing into a typed [`Event`]
//! - The `(event type, action)` routing table and dispatch
//! - The concrete event handlers

pub mod event;
pub mod handlers;
pub mod router;
pub mod signature;

pub use event::{EnvelopeError, Event, InboundRequest};
pub use handlers::{AuditHandler, EventHandler, HandlerError, InstanceRequestHandler};
pub use router::{ActionFilter, DispatchError, DispatchOutcome, EventRouter, RouterBuilder};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
