//! Maths Problem Solver HTTP Server
//!
//! Axum-based server providing the chat REST API, a WebSocket endpoint
//! that streams agent steps, and the static WASM frontend.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use math_tools::MediaWikiClient;
use solver_core::MemorySessionStore;
use solver_runtime::build_http_client;

use crate::config::ServerConfig;
use crate::handlers::{
    chat_handler, chat_stream_handler, create_session, get_session, health_check,
};
use crate::state::AppState;

/// All routes, with the frontend served for anything else
pub fn build_router(state: AppState, static_dir: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))

        // Sessions
        .route("/api/session", post(create_session))
        .route("/api/session/{id}", get(get_session))

        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))

        // Static files (WASM frontend)
        .fallback_service(ServeDir::new(static_dir))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // One HTTP client for Groq and Wikipedia
    let client = build_http_client(&config.groq)?;
    let wiki = Arc::new(MediaWikiClient::from_env(client.clone()));

    if config.default_api_key().is_some() {
        tracing::info!("✓ Server-side Groq API key configured");
    } else {
        tracing::warn!("⚠ GROQ_API_KEY not set - users must enter their own key");
    }
    tracing::info!(
        model = %config.assistant.generation.model,
        max_iterations = config.assistant.max_iterations,
        "Assistant tools: wikipedia, calculator, reasoning"
    );
    tracing::info!(
        idle_secs = config.session_idle.as_secs(),
        capacity = config.session_capacity,
        "Session limits"
    );

    let state = AppState::groq(client, config.groq.clone(), wiki, config.assistant.clone())
        .with_session_store(MemorySessionStore::with_limits(
            config.session_idle,
            config.session_capacity,
        ));

    // Idle session sweeper
    let sessions = state.sessions.clone();
    let mut sweep = tokio::time::interval(config.sweep_interval());
    tokio::spawn(async move {
        loop {
            sweep.tick().await;
            sessions.evict_idle();
        }
    });

    let app = build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 Maths problem solver running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  POST /api/session       - Start a chat session");
    tracing::info!("  GET  /api/session/{{id}}  - Session transcript");
    tracing::info!("  POST /api/chat          - Ask a question");
    tracing::info!("  GET  /api/chat/stream   - WebSocket streaming");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
