//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use medassist_core::{AgentError, EntityKind, EntityMatch, SessionId, ToolResult, ToolSchema, TransportErrorKind};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_connected: bool,
    pub tool_backend: String,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub iterations: usize,
    pub tool_results: Vec<ToolResult>,
    pub exhausted: bool,
    pub recovered: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map an agent failure onto a status code and a user-facing message
fn agent_error(err: &AgentError) -> ApiError {
    let (status, code) = match err {
        AgentError::Transport {
            kind: TransportErrorKind::RateLimited,
            ..
        } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        AgentError::Transport {
            kind: TransportErrorKind::ContextTooLong | TransportErrorKind::MalformedHistory,
            ..
        } => (StatusCode::BAD_GATEWAY, "HISTORY_REJECTED"),
        AgentError::Transport { .. } => (StatusCode::BAD_GATEWAY, "LLM_ERROR"),
        AgentError::ProviderUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "LLM_UNAVAILABLE"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
    };
    api_error(status, code, err.user_message())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.agent.provider().health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_connected,
        tool_backend: state.agent.executor().name().to_string(),
        sessions: state.sessions.len().await,
    })
}

/// Tool schemas currently offered to the LLM
pub async fn list_tools(State(state): State<AppState>) -> Result<Json<Vec<ToolSchema>>, ApiError> {
    state.agent.tool_schemas().await.map(Json).map_err(|e| {
        tracing::error!("Tool listing failed: {}", e);
        agent_error(&e)
    })
}

/// Main chat endpoint
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", "Message must not be empty"));
    }

    let requested = payload.session_id.filter(|id| !id.is_empty()).map(SessionId::from_string);
    let (session_id, session) = state.sessions.get_or_create(requested).await;

    // Requests on the same session queue here
    let mut session = session.lock().await;
    let outcome = state.agent.ask(&mut session.store, message).await.map_err(|e| {
        tracing::error!(session = %session_id, "Agent error: {}", e);
        agent_error(&e)
    })?;
    session.touch();

    tracing::info!(
        session = %session_id,
        iterations = outcome.iterations,
        tools = outcome.tool_results.len(),
        exhausted = outcome.exhausted,
        recovered = outcome.recovered,
        "Chat request completed"
    );

    Ok(Json(ChatResponse {
        message: outcome.final_text,
        session_id: session_id.to_string(),
        iterations: outcome.iterations,
        tool_results: outcome.tool_results,
        exhausted: outcome.exhausted,
        recovered: outcome.recovered,
    }))
}

/// Drop a session and its conversation
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.sessions.remove(&SessionId::from_string(id)).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Resolve a name to an entity id
pub async fn resolve_entity(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<EntityMatch>, ApiError> {
    let kind: EntityKind = query
        .kind
        .parse()
        .map_err(|e: AgentError| api_error(StatusCode::BAD_REQUEST, "UNKNOWN_KIND", e.to_string()))?;
    let threshold = query.threshold.unwrap_or_else(|| state.resolver.threshold());

    let found = state
        .resolver
        .resolve_with_threshold(kind, &query.name, threshold)
        .await
        .map_err(|e| agent_error(&e))?;

    found.map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "NO_MATCH",
            format!("No {kind} matches '{}'", query.name),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
    };
    use hospital_records::{HOSPITAL_ASSISTANT_PROMPT, InMemoryRecords, records_registry};
    use medassist_core::{
        Agent, AgentConfig, Completion, GenerationOptions, LlmProvider, Message, Result, ToolCallRequest,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    /// Replays canned completions, then answers "done"
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<Completion>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<Completion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(&self, _: &[Message], _: &[ToolSchema], _: &GenerationOptions) -> Result<Completion> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::text("done")))
        }
    }

    fn test_app(replies: Vec<Result<Completion>>) -> (Router, AppState) {
        let executor = Arc::new(records_registry(Arc::new(InMemoryRecords::demo())));
        let config = AgentConfig {
            system_prompt: HOSPITAL_ASSISTANT_PROMPT.into(),
            ..Default::default()
        };
        let agent = Agent::new(Arc::new(ScriptedProvider::new(replies)), executor, config);
        let state = AppState::new(agent);
        (crate::app(state.clone()), state)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_chat(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_resolves_patient_names() {
        let (app, state) = test_app(vec![
            Ok(Completion::tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "get_patient",
                r#"{"patient_name": "Mohamed Nasif"}"#,
            )])),
            Ok(Completion::text("Mohamed Nazif is in room C-310.")),
        ]);

        let (status, body) = send(app, post_chat(&json!({"message": "Where is Mohamed Nasif?"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Mohamed Nazif is in room C-310.");
        assert_eq!(body["iterations"], 1);
        assert_eq!(body["exhausted"], false);

        let result = &body["tool_results"][0];
        assert_eq!(result["success"], true);
        assert_eq!(result["arguments"]["patient_id"], "P-1001");
        assert_eq!(result["arguments"]["_fuzzyMatchInfo"]["candidateId"], "P-1001");
        assert_eq!(result["output"]["patient"]["room"], "C-310");

        let session_id = SessionId::from_string(body["session_id"].as_str().unwrap());
        let session = state.sessions.get(&session_id).await.unwrap();
        assert_eq!(
            session.lock().await.store.last_assistant_text(),
            Some("Mohamed Nazif is in room C-310.")
        );
    }

    #[tokio::test]
    async fn test_chat_reuses_session() {
        let (app, state) = test_app(vec![Ok(Completion::text("Hello.")), Ok(Completion::text("Again."))]);

        let (_, first) = send(app.clone(), post_chat(&json!({"message": "hi"}))).await;
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let (status, second) = send(app, post_chat(&json!({"message": "hi again", "session_id": session_id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["session_id"], session_id.as_str());
        assert_eq!(state.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let (app, _) = test_app(vec![]);
        let (status, body) = send(app, post_chat(&json!({"message": "   "}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMPTY_MESSAGE");
    }

    #[tokio::test]
    async fn test_chat_rate_limited() {
        let (app, _) = test_app(vec![Err(AgentError::transport(
            TransportErrorKind::RateLimited,
            "HTTP 429",
        ))]);
        let (status, body) = send(app, post_chat(&json!({"message": "hi"}))).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");
        assert!(!body["error"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let (app, state) = test_app(vec![]);
        let (id, _) = state.sessions.get_or_create(None).await;
        let uri = format!("/api/sessions/{id}");

        let delete = || Request::builder().method("DELETE").uri(&uri).body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), delete()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app, delete()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let (app, _) = test_app(vec![]);

        let (status, body) = send(app.clone(), get("/api/resolve?kind=patient&name=Mohamed%20Nasif")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidateId"], "P-1001");

        let (status, body) = send(app.clone(), get("/api/resolve?kind=ward&name=x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNKNOWN_KIND");

        let (status, _) = send(app, get("/api/resolve?kind=staff&name=Zzyzx%20Qwerty")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_tools() {
        let (app, _) = test_app(vec![]);

        let (status, health) = send(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["llm_connected"], true);
        assert_eq!(health["tool_backend"], "local");

        let (status, tools) = send(app, get("/api/tools")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tools.as_array().unwrap().len(), 5);
        assert_eq!(tools[0]["type"], "function");
    }
}
