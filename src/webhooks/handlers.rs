//! Event handlers.
//!
//! A handler is one unit of work the router runs for a matching event. It
//! sees the parsed [`Event`] and an [`IssueTracker`] for talking back to
//! GitHub, and nothing else.
//!
//! | Event | Action | Handler |
//! |-------|--------|---------|
//! | `issues` | any | [`AuditHandler`] |
//! | `issues` | `opened`, `edited`, `reopened` | [`InstanceRequestHandler`] |
//! | `issue_comment` | `created` | [`AuditHandler`] |

mod audit;
mod instance_request;

use async_trait::async_trait;
use thiserror::Error;

use super::event::Event;
use crate::github::{GitHubApiError, IssueTracker};

pub use audit::AuditHandler;
pub use instance_request::InstanceRequestHandler;

/// Errors that abort a dispatch.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A call to the GitHub API failed.
    #[error(transparent)]
    Api(#[from] GitHubApiError),

    /// The payload lacks a field the handler cannot do without. Holds the
    /// JSON pointer that was looked up.
    #[error("payload field {0} is missing or has the wrong type")]
    MissingField(&'static str),
}

/// An asynchronous reaction to a webhook event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short name used in logs and dispatch errors.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event, tracker: &dyn IssueTracker) -> Result<(), HandlerError>;
}
