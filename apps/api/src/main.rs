mod config;
mod cv;
mod errors;
mod extract;
mod fetch;
mod html;
mod letter;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extract::DocumentExtractor;
use crate::fetch::SafeFetcher;
use crate::llm_client::contract::StructuredClient;
use crate::llm_client::{AnthropicProvider, ProviderConfig};
use crate::pipeline::{Pipeline, TextBudgets};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},security=warn",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CoverBot API v{}", env!("CARGO_PKG_VERSION"));

    // Model provider (Anthropic Messages API)
    let provider = AnthropicProvider::new(ProviderConfig {
        api_key: config.anthropic_api_key.clone(),
        endpoint: config.model_endpoint.clone(),
        model: config.model_name.clone(),
        timeout: config.model_timeout,
    })
    .context("failed to build model provider HTTP client")?;
    info!(model = %config.model_name, "model provider initialized");

    // Job page fetcher
    let fetcher = SafeFetcher::new(config.fetch_policy())
        .context("failed to build job page HTTP client")?;
    info!(
        blocked_ranges = config.blocked_networks.ranges().len(),
        max_bytes = config.max_fetch_bytes,
        max_redirects = config.max_redirects,
        "safe fetcher initialized"
    );

    let pipeline = Pipeline::new(
        DocumentExtractor::new(config.max_upload_bytes, config.parse_timeout),
        fetcher,
        StructuredClient::new(Arc::new(provider), config.model_timeout),
        TextBudgets {
            max_job_text_chars: config.max_job_text_chars,
            max_cv_text_chars: config.max_cv_text_chars,
        },
    );

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the CoverBot front-end

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
