//! HTTP gateway for medchat.
//!
//! Exposes the chat stream and a health check:
//!
//! - `POST /stream`: validate a chat request, then stream the reply as SSE
//! - `GET /health`: liveness plus the number of indexed passages
//!
//! Built on Axum; all per-request work happens in the pipeline's
//! [`StreamController`].

pub mod stream;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use medchat_config::AppConfig;
use medchat_pipeline::{GenerationSettings, StreamController};
use medchat_retrieval::{Embedder, EmbeddingRetriever, IngestOptions};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Maximum accepted request body.
const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub controller: StreamController,
    /// Passages in the loaded index, reported by `/health`
    pub index_passages: usize,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    // Browser clients call /stream from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/stream", post(stream::stream_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Assemble the request-time collaborators from configuration.
///
/// Loads the vector index (building it from the configured dataset when
/// none exists yet) and wires retriever, provider, and controller
/// together. Called once at process start.
pub async fn build_state(config: &AppConfig) -> Result<GatewayState, Box<dyn std::error::Error>> {
    let router = medchat_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;

    match provider.health_check().await {
        Ok(true) => info!(provider = provider.name(), "Provider reachable"),
        Ok(false) | Err(_) => warn!(
            provider = provider.name(),
            "Provider health check failed; requests will fail until it is reachable"
        ),
    }

    let retrieval = &config.retrieval;
    let embedder = Embedder::new(provider.clone(), &retrieval.embedding_model);
    let index = medchat_retrieval::open_or_build(
        &retrieval.index_path,
        retrieval.dataset_path.as_deref(),
        &embedder,
        IngestOptions {
            max_records: retrieval.max_records,
            batch_size: retrieval.batch_size,
        },
    )
    .await?;

    let index_passages = index.len();
    let retriever = EmbeddingRetriever::new(Arc::new(index), embedder, retrieval.top_k);

    let settings = GenerationSettings {
        model: config.default_model.clone(),
        temperature: config.default_temperature,
        max_tokens: config.default_max_tokens,
    };
    let controller = StreamController::new(Arc::new(retriever), provider, settings);

    Ok(GatewayState {
        controller,
        index_passages,
    })
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = Arc::new(build_state(&config).await?);
    info!(
        passages = state.index_passages,
        model = %config.default_model,
        top_k = config.retrieval.top_k,
        "Pipeline ready"
    );

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index_passages: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index_passages: state.index_passages,
    })
}
