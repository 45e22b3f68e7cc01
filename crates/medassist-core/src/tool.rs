//! Tool System
//!
//! Contracts between the agent loop and whatever actually runs tools.
//!
//! - [`ToolExecutor`] is the seam the loop talks to: list the available
//!   tools, call one by name. The HTTP tool server implements it, and so
//!   does the in-process [`ToolRegistry`].
//! - [`Tool`] is a single in-process tool registered with a [`ToolRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::ToolCallRequest;
use crate::resolver::EntityMatch;

/// Argument key carrying name-resolution provenance
pub const FUZZY_MATCH_KEY: &str = "_fuzzyMatchInfo";

/// Function schema as offered to the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments object
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Tool schema in chat-completions format:
/// `{"type": "function", "function": {name, description, parameters}}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

impl ToolSchema {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".into(),
            function: FunctionSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Whether the parameter schema declares `key` as a property
    pub fn accepts_argument(&self, key: &str) -> bool {
        self.function
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|props| props.contains_key(key))
    }
}

/// Parameter definition for an in-process tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Definition of an in-process tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolDefinition {
    /// Render as a chat-completions tool schema
    pub fn to_schema(&self) -> ToolSchema {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            properties.insert(param.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        ToolSchema::function(
            &self.name,
            &self.description,
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        )
    }
}

/// Outcome of one tool call, as fed back to the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this result answers
    pub tool_call_id: String,

    /// Tool that was called
    pub name: String,

    /// Arguments the tool ran with (after entity resolution)
    pub arguments: Value,

    /// Whether execution succeeded
    pub success: bool,

    /// Tool payload on success
    #[serde(skip_serializing_if = "Value::is_null")]
    pub output: Value,

    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Names resolved fuzzily or with ties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fuzzy_matches: Vec<EntityMatch>,
}

impl ToolResult {
    pub fn success(call: &ToolCallRequest, arguments: Value, output: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            arguments,
            success: true,
            output,
            error: None,
            fuzzy_matches: Vec::new(),
        }
    }

    pub fn failure(call: &ToolCallRequest, arguments: Value, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            arguments,
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            fuzzy_matches: Vec::new(),
        }
    }

    /// Attach name-resolution provenance, also recording it in the arguments
    pub fn with_fuzzy_matches(mut self, matches: Vec<EntityMatch>) -> Self {
        if matches.is_empty() {
            return self;
        }
        if let Some(args) = self.arguments.as_object_mut() {
            let info = match matches.as_slice() {
                [single] => serde_json::to_value(single),
                many => serde_json::to_value(many),
            };
            if let Ok(info) = info {
                args.insert(FUZZY_MATCH_KEY.into(), info);
            }
        }
        self.fuzzy_matches = matches;
        self
    }

    /// Content of the tool turn sent back to the LLM
    pub fn to_content(&self) -> String {
        let mut body = if self.success {
            json!({"success": true, "result": self.output})
        } else {
            json!({
                "success": false,
                "error": self.error.as_deref().unwrap_or("unknown error"),
            })
        };
        if let Some(info) = self.arguments.get(FUZZY_MATCH_KEY) {
            body[FUZZY_MATCH_KEY] = info.clone();
        }
        body.to_string()
    }
}

/// Parse the raw JSON arguments of a tool call into an object.
///
/// An empty string counts as no arguments.
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(AgentError::ToolValidation(format!(
            "arguments must be a JSON object, got {other}"
        ))),
        Err(e) => Err(AgentError::Parse(format!("malformed tool arguments: {e}"))),
    }
}

/// Anything that can run tools for the agent loop
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Backend name (for logs and health output)
    fn name(&self) -> &str;

    /// Tools currently offered to the LLM
    async fn list_tools(&self) -> Result<Vec<ToolSchema>>;

    /// Run one tool and return its decoded payload
    async fn call(&self, name: &str, arguments: &Value) -> Result<Value>;
}

/// In-process tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's definition
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: &Value) -> Result<Value>;

    /// Validate arguments before execution
    fn validate(&self, arguments: &Value) -> Result<()> {
        let definition = self.definition();

        for param in definition.parameters.iter().filter(|p| p.required) {
            if arguments.get(&param.name).is_none_or(Value::is_null) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry of in-process tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
        Ok(self
            .names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition().to_schema())
            .collect())
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.validate(arguments)?;
        tool.execute(arguments).await
    }
}
