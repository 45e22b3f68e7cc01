//! Agent Loop
//!
//! Bounded multi-round exchange between the LLM and the tool executor for
//! one user request:
//!
//! ```text
//! user ─▶ store ─▶ LLM ──plain text──▶ done
//!                   │
//!                   └─tool calls─▶ executor × N ─▶ store(assistant, tool…) ─▶ LLM …
//! ```
//!
//! The loop stops on the first plain-text answer or after
//! `max_iterations` tool rounds. Before every LLM call the history is
//! checked for broken tool-call pairing; a broken history, or an LLM
//! rejection blamed on the history, resets the conversation to the system
//! turn (plus the current user message) and the call is retried once.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::conversation::{ConversationStore, DEFAULT_MAX_HISTORY_LENGTH};
use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest};
use crate::provider::{Completion, GenerationOptions, LlmProvider};
use crate::resolver::{DEFAULT_FUZZY_THRESHOLD, EntityResolver};
use crate::tool::{ToolExecutor, ToolResult, ToolSchema, parse_arguments};

/// Default cap on tool rounds per request
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools to look up \
information before answering, and answer concisely.";

const EXHAUSTED_MESSAGE: &str = "I wasn't able to complete that request within the allowed number of steps. \
Please try again with a more specific request.";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt seeded into every conversation
    pub system_prompt: String,

    /// Maximum tool rounds before giving up
    pub max_iterations: usize,

    /// History bound for conversation stores created for this agent
    pub max_history_length: usize,

    /// Minimum similarity for fuzzy entity matches
    pub fuzzy_threshold: f64,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            generation: GenerationOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `AGENT_*` and `LLM_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse("AGENT_MAX_ITERATIONS") {
            config.max_iterations = n;
        }
        if let Some(n) = env_parse("AGENT_MAX_HISTORY") {
            config.max_history_length = n;
        }
        if let Some(t) = env_parse("AGENT_FUZZY_THRESHOLD") {
            config.fuzzy_threshold = t;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.generation.model = model;
        }
        if let Some(t) = env_parse("LLM_TEMPERATURE") {
            config.generation.temperature = t;
        }
        if let Some(n) = env_parse("LLM_MAX_TOKENS") {
            config.generation.max_tokens = n;
        }

        config
    }

    /// Empty store for one session, seeded with the system prompt
    pub fn new_store(&self) -> ConversationStore {
        ConversationStore::with_system_prompt(&self.system_prompt, self.max_history_length)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

/// What one `run` produced
#[derive(Clone, Debug, Serialize)]
pub struct AgentOutcome {
    /// Final assistant text
    pub final_text: String,

    /// Every tool result, in execution order
    pub tool_results: Vec<ToolResult>,

    /// Tool rounds executed
    pub iterations: usize,

    /// The iteration cap was hit while the model still wanted tools
    pub exhausted: bool,

    /// History was reset during this run
    pub recovered: bool,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    executor: Arc<dyn ToolExecutor>,
    resolver: Option<EntityResolver>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent; entity resolution goes through the same executor
    pub fn new(provider: Arc<dyn LlmProvider>, executor: Arc<dyn ToolExecutor>, config: AgentConfig) -> Self {
        let resolver = EntityResolver::new(executor.clone()).with_threshold(config.fuzzy_threshold);
        Self {
            provider,
            executor,
            resolver: Some(resolver),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self::new(provider, executor, AgentConfig::default())
    }

    /// Disable name-to-id resolution of tool arguments
    #[must_use]
    pub fn without_resolver(mut self) -> Self {
        self.resolver = None;
        self
    }

    /// Tools currently offered by the executor
    pub async fn tool_schemas(&self) -> Result<Vec<ToolSchema>> {
        self.executor.list_tools().await
    }

    /// Answer `user_message` using the executor's published tools
    pub async fn ask(&self, store: &mut ConversationStore, user_message: &str) -> Result<AgentOutcome> {
        let tools = self.tool_schemas().await?;
        self.run(store, Some(user_message), &tools).await
    }

    /// Run the loop for one request.
    ///
    /// `user_message` is appended to `store` first when present; with `None`
    /// the loop continues from whatever the store already holds.
    pub async fn run(
        &self,
        store: &mut ConversationStore,
        user_message: Option<&str>,
        tools: &[ToolSchema],
    ) -> Result<AgentOutcome> {
        store.ensure_system_prompt(&self.config.system_prompt);
        if let Some(text) = user_message {
            store.append(Message::user(text));
        }

        let mut recovery = Recovery::default();
        let mut tool_results = Vec::new();
        let mut last_text: Option<String> = None;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            tracing::debug!(
                iteration = iterations,
                turns = store.len(),
                tokens = store.estimate_tokens(),
                "Calling LLM"
            );

            let completion = self
                .complete_checked(store, user_message, tools, &mut recovery)
                .await?;

            if !completion.requests_tools() {
                let text = completion.content;
                store.append(Message::assistant(&text));
                tracing::info!(iterations, tools_run = tool_results.len(), "Agent finished");
                return Ok(AgentOutcome {
                    final_text: text,
                    tool_results,
                    iterations,
                    exhausted: false,
                    recovered: recovery.reset,
                });
            }

            let calls = ensure_call_ids(completion.tool_calls);
            if !completion.content.trim().is_empty() {
                last_text = Some(completion.content.clone());
            }

            let mut round = Vec::with_capacity(calls.len());
            for call in &calls {
                round.push(self.execute_tool_call(call, tools).await);
            }

            store.append(Message::assistant_tool_calls(completion.content, calls));
            for result in &round {
                store.append(Message::tool(&result.tool_call_id, &result.name, result.to_content()));
            }

            tool_results.extend(round);
            iterations += 1;
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Iteration cap reached while the model still requested tools"
        );

        let final_text = last_text.unwrap_or_else(|| EXHAUSTED_MESSAGE.into());
        store.append(Message::assistant(&final_text));

        Ok(AgentOutcome {
            final_text,
            tool_results,
            iterations,
            exhausted: true,
            recovered: recovery.reset,
        })
    }

    /// LLM call guarded by the corruption policy.
    ///
    /// A structurally broken history is reset before sending. A transport
    /// rejection blamed on the history resets and retries once per run,
    /// whether or not a proactive reset already happened; a second failure
    /// is returned to the caller.
    async fn complete_checked(
        &self,
        store: &mut ConversationStore,
        user_message: Option<&str>,
        tools: &[ToolSchema],
        recovery: &mut Recovery,
    ) -> Result<Completion> {
        if let Some(fault) = store.structural_fault() {
            tracing::warn!(%fault, "Conversation history is corrupted; resetting");
            self.reset_history(store, user_message);
            recovery.reset = true;
        }

        let options = &self.config.generation;
        match self.provider.complete(store.turns(), tools, options).await {
            Ok(completion) => Ok(completion),
            Err(err) if err.is_history_fault() && !recovery.retried_after_transport_fault => {
                tracing::warn!(error = %err, "LLM rejected the conversation history; resetting and retrying once");
                self.reset_history(store, user_message);
                recovery.reset = true;
                recovery.retried_after_transport_fault = true;
                self.provider.complete(store.turns(), tools, options).await.inspect_err(|e| {
                    tracing::error!(error = %e, "LLM call failed again after history reset");
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Re-seed the store with the system prompt and the request's user
    /// message; the message is kept on later iterations too.
    fn reset_history(&self, store: &mut ConversationStore, user_message: Option<&str>) {
        store.reset(&self.config.system_prompt);
        if let Some(text) = user_message {
            store.append(Message::user(text));
        }
    }

    /// Execute one tool call; every failure becomes a failed [`ToolResult`]
    async fn execute_tool_call(&self, call: &ToolCallRequest, tools: &[ToolSchema]) -> ToolResult {
        let mut arguments = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Rejecting tool call arguments");
                return ToolResult::failure(call, Value::String(call.arguments.clone()), e.to_string());
            }
        };

        let fuzzy = match &self.resolver {
            Some(resolver) => {
                let schema = tools.iter().find(|t| t.name() == call.name);
                resolver
                    .resolve_arguments(&mut arguments, |key| {
                        schema.is_some_and(|s| s.accepts_argument(key))
                    })
                    .await
            }
            None => Vec::new(),
        };

        let arguments = Value::Object(arguments);
        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");

        let executed = self.executor.call(&call.name, &arguments).await;
        let result = match executed {
            Ok(output) => ToolResult::success(call, arguments, output),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(call, arguments, e.to_string())
            }
        };
        result.with_fuzzy_matches(fuzzy)
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }
}

/// Per-run record of history resets
#[derive(Debug, Default)]
struct Recovery {
    /// Any reset happened, proactive or reactive
    reset: bool,
    retried_after_transport_fault: bool,
}

/// Give id-less calls a fresh id so their results can be paired
fn ensure_call_ids(mut calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    for call in &mut calls {
        if call.id.trim().is_empty() {
            call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
        }
    }
    calls
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    executor: Option<Arc<dyn ToolExecutor>>,
    resolve_entities: bool,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            executor: None,
            resolve_entities: true,
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub const fn max_history_length(mut self, max: usize) -> Self {
        self.config.max_history_length = max;
        self
    }

    #[must_use]
    pub const fn fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.config.fuzzy_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn resolve_entities(mut self, enabled: bool) -> Self {
        self.resolve_entities = enabled;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let executor = self
            .executor
            .ok_or_else(|| AgentError::Config("Tool executor is required".into()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        let agent = Agent::new(provider, executor, self.config);
        Ok(if self.resolve_entities {
            agent
        } else {
            agent.without_resolver()
        })
    }
}
