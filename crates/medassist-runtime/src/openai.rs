//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any endpoint exposing
//! `/chat/completions` with function calling (OpenAI, vLLM, Ollama `/v1`,
//! OpenRouter, ...).
//!
//! Non-success responses are classified here, at the transport boundary,
//! into [`TransportErrorKind`] so the agent loop never inspects error text.

use std::time::Duration;

use async_trait::async_trait;
use medassist_core::{
    error::{AgentError, Result, TransportErrorKind},
    message::{Message, Role, ToolCallRequest},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    tool::ToolSchema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL, up to and including the version segment
    pub base_url: String,

    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read `LLM_BASE_URL`, `LLM_API_KEY` (falling back to `OPENAI_API_KEY`)
    /// and `LLM_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("LLM_BASE_URL").unwrap_or(defaults.base_url);
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.is_empty());
        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            base_url,
            api_key,
            timeout_secs,
        }
    }
}

/// OpenAI-compatible chat provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Convert agent messages to the chat-completions wire format
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = (!m.tool_calls.is_empty()).then(|| {
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            kind: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: Value::String(tc.arguments.clone()),
                            },
                        })
                        .collect()
                });
                // Assistant turns that only carry tool calls go out with null content
                let content = if m.role == Role::Assistant && tool_calls.is_some() && m.content.is_empty() {
                    None
                } else {
                    Some(m.content.clone())
                };

                ApiMessage {
                    role: m.role.to_string(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                    name: m.name.clone(),
                }
            })
            .collect()
    }

    /// Convert a chat-completions response into a completion
    fn convert_completion(response: ApiResponse, requested_model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::transport(TransportErrorKind::Other, "no choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, arguments_text(tc.function.arguments)))
            .collect();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model.unwrap_or_else(|| requested_model.to_string()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
        })
    }
}

/// Some servers send arguments as a JSON object instead of a string
fn arguments_text(arguments: Value) -> String {
    match arguments {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Classify a non-success chat-completions response.
///
/// Status codes decide first; the body is only consulted to tell an
/// oversized context apart from a history the server rejected as malformed
/// (unanswered or orphaned tool calls).
pub fn classify_failure(status: u16, body: &str) -> TransportErrorKind {
    let body = body.to_lowercase();

    if status == 429 || body.contains("rate_limit") {
        return TransportErrorKind::RateLimited;
    }
    if status == 413
        || body.contains("context_length_exceeded")
        || body.contains("maximum context length")
        || body.contains("context window")
        || body.contains("too many tokens")
    {
        return TransportErrorKind::ContextTooLong;
    }
    if (400..500).contains(&status)
        && (body.contains("tool_call_id") || body.contains("tool_calls") || body.contains("role 'tool'"))
    {
        return TransportErrorKind::MalformedHistory;
    }
    TransportErrorKind::Other
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("LLM health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &options.model,
            messages: Self::to_api_messages(messages),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools: (!tools.is_empty()).then_some(tools),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(
            model = %options.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AgentError::ProviderUnavailable(e.to_string())
                } else {
                    AgentError::transport(TransportErrorKind::Other, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = classify_failure(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), %kind, body = %body, "Provider returned error");
            return Err(AgentError::transport(kind, format!("HTTP {status}: {body}")));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            AgentError::transport(TransportErrorKind::Other, format!("failed to parse response: {e}"))
        })?;

        Self::convert_completion(api_response, &options.model)
    }
}

// --- OpenAI API wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig::new(format!("{}/v1", server.uri())).with_api_key("test-key")).unwrap()
    }

    fn lookup_tool() -> Vec<ToolSchema> {
        vec![ToolSchema::function(
            "get_patient",
            "Look up a patient",
            json!({"type": "object", "properties": {"patient_id": {"type": "string"}}}),
        )]
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(classify_failure(429, ""), TransportErrorKind::RateLimited);
        assert_eq!(
            classify_failure(400, r#"{"error":{"code":"context_length_exceeded"}}"#),
            TransportErrorKind::ContextTooLong
        );
        assert_eq!(classify_failure(413, "payload too large"), TransportErrorKind::ContextTooLong);
        assert_eq!(
            classify_failure(
                400,
                "An assistant message with 'tool_calls' must be followed by tool messages responding to each 'tool_call_id'"
            ),
            TransportErrorKind::MalformedHistory
        );
        assert_eq!(classify_failure(500, "tool_calls"), TransportErrorKind::Other);
        assert_eq!(classify_failure(502, "bad gateway"), TransportErrorKind::Other);
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Who is patient 7?"),
            Message::assistant_tool_calls("", vec![ToolCallRequest::new("call_1", "get_patient", r#"{"patient_id":"7"}"#)]),
            Message::tool("call_1", "get_patient", r#"{"success":true}"#),
        ];

        let converted = OpenAiProvider::to_api_messages(&messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[2].role, "assistant");
        assert!(converted[2].content.is_none());
        assert_eq!(converted[3].tool_call_id.as_deref(), Some("call_1"));

        let wire = serde_json::to_value(&converted[2]).unwrap();
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"patient_id":"7"}"#);
    }

    #[test]
    fn test_object_arguments_are_stringified() {
        assert_eq!(arguments_text(json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(arguments_text(json!("{}")), "{}");
        assert_eq!(arguments_text(Value::Null), "");
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"tool_choice": "auto", "model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "get_patient", "arguments": "{\"patient_id\":\"7\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider_for(&server)
            .complete(&[Message::user("patient 7?")], &lookup_tool(), &GenerationOptions::default())
            .await
            .unwrap();

        assert!(completion.requests_tools());
        assert_eq!(completion.content, "");
        assert_eq!(completion.model, "gpt-4o-mini-2024");
        assert_eq!(completion.tool_calls[0].id, "call_abc");
        assert_eq!(completion.tool_calls[0].arguments, r#"{"patient_id":"7"}"#);
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(20));
    }

    #[tokio::test]
    async fn test_complete_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello."}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let completion = provider_for(&server)
            .complete(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(completion.content, "Hello.");
        assert!(completion.tool_calls.is_empty());
        assert_eq!(completion.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_complete_classifies_history_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Invalid parameter: messages with role 'tool' must be a response to a preceeding message with 'tool_calls'.",
                    "type": "invalid_request_error"
                }
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.transport_kind(), Some(TransportErrorKind::MalformedHistory));
        assert!(err.is_history_fault());
    }

    #[tokio::test]
    async fn test_complete_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&[Message::user("hi")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.transport_kind(), Some(TransportErrorKind::RateLimited));
        assert!(!err.is_history_fault());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        assert!(provider_for(&server).health_check().await.unwrap());
    }
}
