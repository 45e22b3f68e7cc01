//! Session Management
//!
//! One conversation store per session. Each session sits behind its own
//! async mutex, so two requests on the same session run one after the
//! other while different sessions proceed independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::conversation::ConversationStore;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live conversation session
#[derive(Debug)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub store: ConversationStore,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, store: ConversationStore) -> Self {
        let now = Utc::now();
        Self {
            id,
            store,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Duration since creation
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory session registry
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    system_prompt: String,
    max_history_length: usize,
}

impl SessionRegistry {
    pub fn new(system_prompt: impl Into<String>, max_history_length: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            system_prompt: system_prompt.into(),
            max_history_length,
        }
    }

    /// Look up a session, creating it (seeded with the system prompt) when
    /// `id` is unknown or absent
    pub async fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SharedSession) {
        if let Some(id) = &id {
            if let Some(session) = self.sessions.read().await.get(id) {
                return (id.clone(), session.clone());
            }
        }

        let id = id.unwrap_or_default();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::info!(session = %id, "Created session");
                let store = ConversationStore::with_system_prompt(&self.system_prompt, self.max_history_length);
                Arc::new(Mutex::new(Session::new(id.clone(), store)))
            })
            .clone();
        (id, session)
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session; returns whether it existed
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
