//! Application State

use std::sync::Arc;

use medassist_core::{Agent, EntityResolver, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Agent (LLM provider + tool executor + config)
    pub agent: Arc<Agent>,

    /// Per-session conversation stores
    pub sessions: Arc<SessionRegistry>,

    /// Name resolver over the same executor the agent uses
    pub resolver: Arc<EntityResolver>,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        let config = agent.config();
        let sessions = SessionRegistry::new(&config.system_prompt, config.max_history_length);
        let resolver = EntityResolver::new(Arc::clone(agent.executor())).with_threshold(config.fuzzy_threshold);

        Self {
            agent: Arc::new(agent),
            sessions: Arc::new(sessions),
            resolver: Arc::new(resolver),
        }
    }
}
