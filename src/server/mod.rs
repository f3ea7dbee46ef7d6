//! HTTP server for the instances bot.
//!
//! # Endpoints
//!
//! - `POST /` and `POST /webhook` - GitHub webhook deliveries (see [`webhook`])
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

use crate::github::TrackerFactory;
use crate::webhooks::EventRouter;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. Everything in
/// it is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Webhook secret for HMAC-SHA256 signature verification. `None` rejects
    /// every delivery.
    webhook_secret: Option<Vec<u8>>,

    router: EventRouter,

    /// Opens a GitHub client per delivery; clients share one response cache.
    trackers: Arc<dyn TrackerFactory>,

    /// Pause between parsing a delivery and dispatching it.
    consistency_delay: Duration,
}

impl AppState {
    pub fn new(
        webhook_secret: Option<Vec<u8>>,
        router: EventRouter,
        trackers: Arc<dyn TrackerFactory>,
        consistency_delay: Duration,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret,
                router,
                trackers,
                consistency_delay,
            }),
        }
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }

    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }

    pub fn trackers(&self) -> &dyn TrackerFactory {
        self.inner.trackers.as_ref()
    }

    pub fn consistency_delay(&self) -> Duration {
        self.inner.consistency_delay
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("has_secret", &self.inner.webhook_secret.is_some())
            .field("router", &self.inner.router)
            .field("consistency_delay", &self.inner.consistency_delay)
            .finish_non_exhaustive()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", post(webhook_handler))
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
