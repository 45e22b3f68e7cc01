//! # medassist-runtime
//!
//! HTTP transports for the MedAssist agent.
//!
//! ## Components
//!
//! - **OpenAiProvider**: any OpenAI-compatible `/chat/completions` endpoint
//!   (OpenAI, vLLM, Ollama's `/v1`, ...), with function calling
//! - **ToolServerClient**: remote tool-execution server (`/tools`, `/call`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medassist_runtime::{OpenAiProvider, ToolServerClient};
//!
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//! let tools = Arc::new(ToolServerClient::new(ToolServerConfig::new("http://localhost:8808"))?);
//! let agent = AgentBuilder::new()
//!     .provider(provider)
//!     .executor(tools)
//!     .build()?;
//! ```

pub mod openai;
pub mod tool_server;

pub use openai::{OpenAiConfig, OpenAiProvider, classify_failure};
pub use tool_server::{ToolServerClient, ToolServerConfig, decode_tool_response};

// Re-export core types for convenience
pub use medassist_core::{
    Agent, AgentBuilder, AgentError, LlmProvider, Message, Result, Role, ToolExecutor, TransportErrorKind,
};
