//! Logs issue activity. Never talks to GitHub.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{EventHandler, HandlerError};
use crate::github::IssueTracker;
use crate::types::IssueNumber;
use crate::webhooks::event::Event;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditHandler;

impl AuditHandler {
    fn issue_number(event: &Event) -> Option<IssueNumber> {
        event
            .get("/issue/number")
            .and_then(Value::as_u64)
            .map(IssueNumber)
    }
}

#[async_trait]
impl EventHandler for AuditHandler {
    fn name(&self) -> &str {
        "audit"
    }

    async fn handle(&self, event: &Event, _tracker: &dyn IssueTracker) -> Result<(), HandlerError> {
        debug!(
            delivery_id = %event.delivery_id(),
            event_type = event.event_type(),
            action = event.action().unwrap_or("-"),
            issue = ?Self::issue_number(event),
            sender = event.get_str("/sender/login").unwrap_or("-"),
            "Issue activity"
        );
        Ok(())
    }
}
