//! Decidoc server — webhook intake, batched analysis, and admin endpoints.
//!
//! Startup sequence:
//! 1. Load `.env` + config (file and env overrides)
//! 2. Load the tenant directory
//! 3. Build the analysis log sink and external clients
//! 4. Assemble state (classifier, coalescer) and serve the router

mod intake;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decidoc_core::config::{expand_home, load_config};
use decidoc_core::directory::Directory;
use decidoc_core::sink::JsonlAnalysisLog;
use decidoc_providers::responses::OpenAiResponsesClient;
use decidoc_slack::SlackClient;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("decidoc starting...");

    // 1. Config
    let config = load_config(None);
    if !config.openai.is_configured() {
        tracing::warn!("OPENAI_API_KEY not set; orchestrator sessions will fail");
    }
    if config.classifier.base_url.is_none() {
        tracing::warn!("CLASSIFICATION_SERVICE not set; every message gets the neutral verdict");
    }

    // 2. Tenant directory
    let directory = Directory::load(&expand_home(&config.directory.path));
    tracing::info!(tenants = directory.len(), "tenant directory ready");

    // 3. Sink + external clients
    let sink = Arc::new(JsonlAnalysisLog::new(
        expand_home(&config.sink.dir),
        &config.sink.table_name,
    ));
    let responses = Arc::new(OpenAiResponsesClient::new(
        config.openai.api_base.clone(),
        config.openai.api_key.clone(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        addr = %addr,
        window_secs = config.batch.timeout_seconds,
        model = %config.openai.model,
        "configuration loaded"
    );

    // 4. State + router
    let state = AppState::new(config, directory, responses, SlackClient::new(), sink);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("decidoc server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
