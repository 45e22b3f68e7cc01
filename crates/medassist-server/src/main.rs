//! MedAssist HTTP Server
//!
//! Axum-based server exposing the hospital assistant over a JSON API.
//!
//! Tools come from a remote tool server when `TOOL_SERVER_URL` is set, and
//! from the in-memory hospital records otherwise.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hospital_records::{HOSPITAL_ASSISTANT_PROMPT, InMemoryRecords, records_registry};
use medassist_core::{AgentBuilder, AgentConfig, LlmProvider, ToolExecutor};
use medassist_runtime::{OpenAiProvider, ToolServerClient, ToolServerConfig};

use crate::handlers::{chat_handler, delete_session, health_check, list_tools, resolve_entity};
use crate::state::AppState;

/// Build the router over `state`
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))
        .route("/api/resolve", get(resolve_entity))
        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/{id}", delete(delete_session))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ LLM endpoint reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ LLM endpoint not reachable - chat requests will fail");
            tracing::warn!("  Check LLM_BASE_URL and LLM_API_KEY");
        }
    }

    // Initialize tools
    let executor: Arc<dyn ToolExecutor> = match ToolServerConfig::from_env() {
        Some(config) => {
            tracing::info!("Using tool server at {}", config.base_url);
            Arc::new(ToolServerClient::new(config)?)
        }
        None => {
            tracing::info!("TOOL_SERVER_URL not set - using in-memory hospital records");
            Arc::new(records_registry(Arc::new(InMemoryRecords::demo())))
        }
    };

    match executor.list_tools().await {
        Ok(tools) => {
            tracing::info!("Offering {} tools:", tools.len());
            for tool in &tools {
                tracing::info!("  • {}", tool.name());
            }
        }
        Err(e) => tracing::warn!("⚠ Could not list tools: {}", e),
    }

    // Build the agent
    let config = AgentConfig {
        system_prompt: HOSPITAL_ASSISTANT_PROMPT.into(),
        ..AgentConfig::from_env()
    };
    tracing::info!(
        model = %config.generation.model,
        max_iterations = config.max_iterations,
        max_history = config.max_history_length,
        fuzzy_threshold = config.fuzzy_threshold,
        "Agent configured"
    );

    let agent = AgentBuilder::new()
        .provider(provider)
        .executor(executor)
        .config(config)
        .build()?;

    let state = AppState::new(agent);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 MedAssist server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health             - Health check");
    tracing::info!("  GET    /api/tools          - Tools offered to the LLM");
    tracing::info!("  GET    /api/resolve        - Resolve a name to an id");
    tracing::info!("  POST   /api/chat           - Send message");
    tracing::info!("  DELETE /api/sessions/{{id}}  - Forget a conversation");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
