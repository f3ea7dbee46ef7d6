//! The bot's registration table.

use std::sync::Arc;

use crate::instances::LabelClassifier;
use crate::webhooks::{ActionFilter, AuditHandler, EventRouter, InstanceRequestHandler};

/// Actions on an issue that may change which instance it asks about, or
/// turn it into an instance request.
pub const INSTANCE_REQUEST_ACTIONS: [&str; 4] = ["opened", "edited", "reopened", "labeled"];

/// Builds the router used in production.
///
/// The audit handler is registered first, so it logs an issue event even
/// when the request handler later fails on it.
pub fn build_event_router(classifier: LabelClassifier) -> EventRouter {
    let audit = Arc::new(AuditHandler);
    let requests = Arc::new(InstanceRequestHandler::new(classifier));

    let mut builder = EventRouter::builder();
    builder.register("issues", ActionFilter::Any, audit.clone());
    for action in INSTANCE_REQUEST_ACTIONS {
        builder.register("issues", ActionFilter::exact(action), requests.clone());
    }
    builder.register("issue_comment", ActionFilter::exact("created"), audit);
    builder.build()
}
