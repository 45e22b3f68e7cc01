//! LLM Provider Strategy Pattern
//!
//! Defines the interface the agent loop uses to reach a chat model with
//! function calling, so the transport (OpenAI-compatible HTTP, a scripted
//! mock in tests, ...) can be swapped without touching the loop.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medassist_core::provider::{GenerationOptions, LlmProvider};
//!
//! let completion = provider.complete(store.turns(), &tools, &options).await?;
//! if completion.tool_calls.is_empty() {
//!     println!("{}", completion.content);
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolSchema;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.1")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

const fn default_temperature() -> f32 {
    0.2
}
const fn default_max_tokens() -> u32 {
    1024
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// Assistant text (empty when the model only requested tools)
    pub content: String,

    /// Tool calls, in the order the model emitted them
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// A plain-text answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// A tool-call request
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolCalls),
            ..Default::default()
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

/// Strategy trait for LLM providers
///
/// Implementations classify their own failures into
/// [`AgentError::Transport`](crate::AgentError::Transport) so the agent loop
/// can decide whether resetting the history is worth a retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion for `messages`, offering `tools` with automatic
    /// tool choice
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// Estimate token count for text
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Default: rough estimate of ~4 chars per token
        u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
    }
}
