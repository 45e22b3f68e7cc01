//! Tool Server Client
//!
//! `ToolExecutor` backed by a remote tool-execution server:
//!
//! - `GET  {base}/tools` publishes `{"tools": [{name, description, inputSchema}]}`
//!   (a bare array is accepted too)
//! - `POST {base}/call` takes `{"name", "arguments"}` and answers with a
//!   result whose `content[0].text` carries the tool output, usually JSON

use std::time::Duration;

use async_trait::async_trait;
use medassist_core::{
    error::{AgentError, Result},
    tool::{ToolExecutor, ToolSchema},
};
use serde::Serialize;
use serde_json::Value;

/// Tool server configuration
#[derive(Clone, Debug)]
pub struct ToolServerConfig {
    /// Base URL of the tool server
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ToolServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 30,
        }
    }

    /// Read `TOOL_SERVER_URL` and `TOOL_SERVER_TIMEOUT_SECS`.
    ///
    /// Returns `None` when no tool server is configured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("TOOL_SERVER_URL").ok().filter(|url| !url.is_empty())?;
        let mut config = Self::new(base_url);
        if let Some(timeout) = std::env::var("TOOL_SERVER_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
        {
            config.timeout_secs = timeout;
        }
        Some(config)
    }
}

/// HTTP client for a remote tool server
pub struct ToolServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ToolServerClient {
    pub fn new(config: ToolServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct CallRequest<'a> {
    name: &'a str,
    arguments: &'a Value,
}

/// Convert one published tool descriptor into a function schema
fn tool_schema(descriptor: &Value) -> Option<ToolSchema> {
    let name = descriptor.get("name").and_then(Value::as_str)?;
    let description = descriptor
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let parameters = ["inputSchema", "input_schema", "parameters"]
        .iter()
        .find_map(|key| descriptor.get(*key))
        .filter(|schema| schema.is_object())
        .cloned()
        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));

    Some(ToolSchema::function(name, description, parameters))
}

/// Extract the tool descriptors from a `/tools` listing
fn tool_descriptors(listing: &Value) -> &[Value] {
    let tools = listing
        .get("tools")
        .or_else(|| listing.get("result").and_then(|r| r.get("tools")))
        .unwrap_or(listing);
    tools.as_array().map(Vec::as_slice).unwrap_or_default()
}

/// Decode a `/call` response into the tool's output.
///
/// A JSON-RPC style `error` member or `isError: true` becomes a
/// [`AgentError::ToolExecution`]. Otherwise the first text content block is
/// parsed as JSON, falling back to the raw text; responses without content
/// blocks are returned as-is.
pub fn decode_tool_response(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(AgentError::ToolExecution(message));
    }

    let result = match response {
        Value::Object(mut map) if map.contains_key("result") => map.remove("result").unwrap_or_default(),
        other => other,
    };

    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str);

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return Err(AgentError::ToolExecution(
            text.map_or_else(|| result.to_string(), str::to_string),
        ));
    }

    Ok(match text {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        None => result,
    })
}

#[async_trait]
impl ToolExecutor for ToolServerClient {
    fn name(&self) -> &str {
        "tool-server"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
        let url = format!("{}/tools", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("tool server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::ToolExecution(format!(
                "tool listing failed with HTTP {status}"
            )));
        }

        let listing: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("invalid tool listing: {e}")))?;
        let schemas: Vec<ToolSchema> = tool_descriptors(&listing).iter().filter_map(tool_schema).collect();
        tracing::debug!(count = schemas.len(), "Loaded tool schemas from tool server");
        Ok(schemas)
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value> {
        let url = format!("{}/call", self.base_url);
        tracing::debug!(tool = %name, "Calling tool server");

        let response = self
            .client
            .post(&url)
            .json(&CallRequest { name, arguments })
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("tool server unreachable: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::ToolNotFound(name.to_string()));
        }
        if !status.is_success() {
            tracing::warn!(tool = %name, status = status.as_u16(), "Tool server returned error");
            let detail = if body.is_empty() { status.to_string() } else { body };
            return Err(AgentError::ToolExecution(detail));
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(parsed) => decode_tool_response(parsed),
            Err(_) => Ok(Value::String(body)),
        }
    }
}
