//! # medassist-core
//!
//! Tool-calling agent loop with a bounded, structurally valid conversation
//! history and name-to-id entity resolution.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ Conversation │  │  Agent loop  │  │   LlmProvider      │  │
//! │  │    Store     │──│  (bounded)   │──│   (Strategy)       │  │
//! │  └──────────────┘  └──────┬───────┘  └────────────────────┘  │
//! │                    ┌──────┴───────┐  ┌────────────────────┐  │
//! │                    │EntityResolver│──│   ToolExecutor     │  │
//! │                    └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `LlmProvider` and `ToolExecutor` are the two seams: the runtime crate
//! plugs HTTP transports in, tests plug in scripted fakes.

pub mod conversation;
pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod resolver;
pub mod session;
pub mod tool;

pub use conversation::{ConversationStore, StructuralFault};
pub use error::{AgentError, Result, TransportErrorKind};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentOutcome};
pub use resolver::{EntityKind, EntityMatch, EntityResolver, MatchedField};
pub use session::{Session, SessionId, SessionRegistry};
pub use tool::{Tool, ToolDefinition, ToolExecutor, ToolRegistry, ToolResult, ToolSchema};
