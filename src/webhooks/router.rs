//! Event routing: a registration table from `(event type, action)` to
//! handlers, plus dispatch.
//!
//! The table is assembled with [`RouterBuilder`] at startup and frozen into an
//! [`EventRouter`]; there is no way to register handlers afterwards.
//!
//! # Dispatch rules
//!
//! - Handlers registered for `(event_type, action)` and for
//!   `(event_type, *)` both match; together they run in registration order.
//! - Handlers run one at a time, each awaited before the next starts.
//! - The first failing handler stops the dispatch and its error is returned.
//!   Side effects of handlers that already ran are kept.
//! - An event nobody registered for is a successful no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::event::Event;
use super::handlers::{EventHandler, HandlerError};
use crate::github::IssueTracker;

/// Which actions of an event type a registration applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionFilter {
    /// Only events whose `action` equals this value.
    Exact(String),
    /// Every event of the type, including events without an action.
    Any,
}

impl ActionFilter {
    pub fn exact(action: impl Into<String>) -> Self {
        ActionFilter::Exact(action.into())
    }
}

impl fmt::Display for ActionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionFilter::Exact(action) => write!(f, "{}", action),
            ActionFilter::Any => write!(f, "*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    event_type: String,
    action: ActionFilter,
}

#[derive(Clone)]
struct Route {
    /// Global registration sequence number, used to interleave exact and
    /// wildcard routes.
    seq: usize,
    handler: Arc<dyn EventHandler>,
}

/// A handler failed during dispatch.
#[derive(Debug, Error)]
#[error("handler `{handler}` failed after {completed} handler(s) completed: {source}")]
pub struct DispatchError {
    /// Name of the failing handler.
    pub handler: String,

    /// Number of handlers that completed before the failure.
    pub completed: usize,

    #[source]
    pub source: HandlerError,
}

/// Summary of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of handlers invoked (all of which succeeded).
    pub handlers_run: usize,
}

impl DispatchOutcome {
    /// Returns true if no handler matched the event.
    pub fn is_unrouted(&self) -> bool {
        self.handlers_run == 0
    }
}

/// Builds an [`EventRouter`].
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<RouteKey, Vec<Route>>,
    next_seq: usize,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type` events matching `action`.
    ///
    /// The same handler may be registered under several keys; it then runs
    /// once per matching registration.
    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        action: ActionFilter,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        let key = RouteKey {
            event_type: event_type.into(),
            action,
        };
        let seq = self.next_seq;
        self.next_seq += 1;

        debug!(
            event_type = %key.event_type,
            action = %key.action,
            handler = handler.name(),
            "Registered webhook handler"
        );

        self.routes.entry(key).or_default().push(Route { seq, handler });
        self
    }

    /// Freezes the table.
    pub fn build(self) -> EventRouter {
        EventRouter {
            routes: self.routes,
        }
    }
}

/// Immutable routing table from `(event type, action)` to handlers.
pub struct EventRouter {
    routes: HashMap<RouteKey, Vec<Route>>,
}

impl EventRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the handlers matching `event`, in registration order.
    fn matching(&self, event: &Event) -> Vec<&Route> {
        let mut matched: Vec<&Route> = Vec::new();

        if let Some(action) = event.action() {
            let exact = RouteKey {
                event_type: event.event_type().to_string(),
                action: ActionFilter::exact(action),
            };
            if let Some(routes) = self.routes.get(&exact) {
                matched.extend(routes);
            }
        }

        let wildcard = RouteKey {
            event_type: event.event_type().to_string(),
            action: ActionFilter::Any,
        };
        if let Some(routes) = self.routes.get(&wildcard) {
            matched.extend(routes);
        }

        matched.sort_by_key(|route| route.seq);
        matched
    }

    /// Names of the handlers that would run for `event`, in order.
    pub fn handler_names(&self, event: &Event) -> Vec<&str> {
        self.matching(event)
            .into_iter()
            .map(|route| route.handler.name())
            .collect()
    }

    /// Runs every matching handler against `tracker`, one after another.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure. Handlers after the failing one are
    /// not invoked.
    pub async fn dispatch(
        &self,
        event: &Event,
        tracker: &dyn IssueTracker,
    ) -> Result<DispatchOutcome, DispatchError> {
        let routes = self.matching(event);

        if routes.is_empty() {
            debug!(
                delivery_id = %event.delivery_id(),
                event_type = %event.event_type(),
                action = event.action().unwrap_or("-"),
                "No handlers registered for event"
            );
            return Ok(DispatchOutcome { handlers_run: 0 });
        }

        for (completed, route) in routes.iter().enumerate() {
            let name = route.handler.name();
            debug!(delivery_id = %event.delivery_id(), handler = name, "Invoking handler");

            if let Err(source) = route.handler.handle(event, tracker).await {
                warn!(
                    delivery_id = %event.delivery_id(),
                    handler = name,
                    error = %source,
                    "Handler failed; skipping remaining handlers"
                );
                return Err(DispatchError {
                    handler: name.to_string(),
                    completed,
                    source,
                });
            }
        }

        Ok(DispatchOutcome {
            handlers_run: routes.len(),
        })
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .routes
            .keys()
            .map(|k| format!("{}.{}", k.event_type, k.action))
            .collect();
        keys.sort();
        f.debug_struct("EventRouter").field("routes", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTracker, event};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records its name into a shared log and optionally fails.
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &Event, _tracker: &dyn IssueTracker) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(HandlerError::MissingField("/boom"))
            } else {
                Ok(())
            }
        }
    }

    fn recording(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn EventHandler> {
        Arc::new(Recording {
            name,
            log: Arc::clone(log),
            fail,
        })
    }

    fn issue_event(action: &str) -> Event {
        event("issues", json!({ "action": action }))
    }

    #[tokio::test]
    async fn unrouted_event_is_a_successful_no_op() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder.register("issues", ActionFilter::exact("opened"), recording("a", &log, false));
        let router = builder.build();
        let tracker = MockTracker::new();

        let outcome = router
            .dispatch(&event("pull_request", json!({ "action": "opened" })), &tracker)
            .await
            .unwrap();

        assert!(outcome.is_unrouted());
        assert!(log.lock().unwrap().is_empty());
        assert!(tracker.posts().is_empty());
    }

    #[tokio::test]
    async fn empty_router_dispatches_successfully() {
        let router = EventRouter::builder().build();
        assert!(router.is_empty());

        let outcome = router.dispatch(&issue_event("opened"), &MockTracker::new()).await.unwrap();
        assert_eq!(outcome.handlers_run, 0);
    }

    #[tokio::test]
    async fn exact_and_wildcard_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder
            .register("issues", ActionFilter::exact("opened"), recording("first", &log, false))
            .register("issues", ActionFilter::Any, recording("wild", &log, false))
            .register("issues", ActionFilter::exact("opened"), recording("second", &log, false))
            .register("issues", ActionFilter::exact("closed"), recording("closed", &log, false));
        let router = builder.build();

        let outcome = router.dispatch(&issue_event("opened"), &MockTracker::new()).await.unwrap();

        assert_eq!(outcome.handlers_run, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "wild", "second"]);
    }

    #[tokio::test]
    async fn wildcard_matches_event_without_action() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder
            .register("push", ActionFilter::Any, recording("wild", &log, false))
            .register("push", ActionFilter::exact("created"), recording("exact", &log, false));
        let router = builder.build();

        router
            .dispatch(&event("push", json!({ "ref": "refs/heads/main" })), &MockTracker::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["wild"]);
    }

    #[tokio::test]
    async fn failing_handler_stops_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder
            .register("issues", ActionFilter::exact("opened"), recording("fails", &log, true))
            .register("issues", ActionFilter::exact("opened"), recording("never", &log, false));
        let router = builder.build();

        let err = router
            .dispatch(&issue_event("opened"), &MockTracker::new())
            .await
            .unwrap_err();

        assert_eq!(err.handler, "fails");
        assert_eq!(err.completed, 0);
        assert_eq!(*log.lock().unwrap(), vec!["fails"]);
    }

    #[tokio::test]
    async fn earlier_side_effects_are_kept_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder
            .register("issues", ActionFilter::Any, recording("ok", &log, false))
            .register("issues", ActionFilter::exact("opened"), recording("fails", &log, true));
        let router = builder.build();

        let err = router
            .dispatch(&issue_event("opened"), &MockTracker::new())
            .await
            .unwrap_err();

        assert_eq!(err.completed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["ok", "fails"]);
    }

    #[test]
    fn handler_names_reports_dispatch_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = EventRouter::builder();
        builder
            .register("issues", ActionFilter::Any, recording("audit", &log, false))
            .register("issues", ActionFilter::exact("edited"), recording("reply", &log, false));
        let router = builder.build();

        assert_eq!(router.len(), 2);
        assert_eq!(router.handler_names(&issue_event("edited")), vec!["audit", "reply"]);
        assert_eq!(router.handler_names(&issue_event("closed")), vec!["audit"]);
    }

    #[test]
    fn action_filter_display() {
        assert_eq!(ActionFilter::exact("opened").to_string(), "opened");
        assert_eq!(ActionFilter::Any.to_string(), "*");
    }
}
