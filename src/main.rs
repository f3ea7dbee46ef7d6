use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use searx_instances_bot::bot::build_event_router;
use searx_instances_bot::config::Config;
use searx_instances_bot::github::{GitHubConnector, ResponseCache};
use searx_instances_bot::instances::LabelClassifier;
use searx_instances_bot::server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "searx_instances_bot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(?config, "Loaded configuration");

    if config.webhook_secret.is_none() {
        warn!("GH_SECRET is not set; every webhook delivery will be rejected");
    }
    if config.api_token.is_none() {
        warn!("GH_AUTH is not set; GitHub API calls are unauthenticated");
    }

    let cache = ResponseCache::new(config.cache_capacity);
    let connector = GitHubConnector::new(config.api_token.as_deref(), &config.api_url, cache)
        .context("failed to build GitHub client")?;

    let state = AppState::new(
        config.webhook_secret.clone().map(String::into_bytes),
        build_event_router(LabelClassifier::default()),
        Arc::new(connector),
        config.consistency_delay,
    );
    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", addr);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received Ctrl-C, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    Ok(())
}
