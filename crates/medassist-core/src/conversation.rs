//! Conversation Store
//!
//! Bounded, structurally valid turn history for one session.
//!
//! Two invariants are maintained here:
//!
//! - **Bounded size**: once the history grows past `max_history_length`,
//!   the oldest turns are dropped (the system turn is permanent).
//! - **Pairing**: an assistant turn with tool calls is followed by exactly
//!   one tool turn per call id. Trimming works on whole tool-call sequences
//!   so it can never orphan a call or a result.
//!
//! ```text
//! [system] [user] [assistant+calls] [tool] [tool] [assistant] [user] ...
//!          └─┬──┘ └──────────────── sequence ──────────────┘ └─┬──┘
//!          unit                                               unit
//! ```

use std::collections::HashSet;

use crate::message::{Message, Role};

/// Default number of turns kept (system turn included)
pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 6;

/// Content longer than this many characters is cut on append
pub const MAX_CONTENT_CHARS: usize = 2000;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Why a history is not safe to send to the LLM
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructuralFault {
    /// Tool calls that never received a result
    Unanswered(Vec<String>),
    /// A tool result whose call id is not awaiting an answer
    Orphan(String),
    /// A non-tool turn arrived while these call ids were still pending
    Interrupted(Vec<String>),
}

impl std::fmt::Display for StructuralFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unanswered(ids) => write!(f, "unanswered tool calls: {}", ids.join(", ")),
            Self::Orphan(id) => write!(f, "tool result without a matching call: {id}"),
            Self::Interrupted(ids) => {
                write!(f, "tool calls interrupted before their results: {}", ids.join(", "))
            }
        }
    }
}

/// Ordered, bounded conversation history
#[derive(Clone, Debug)]
pub struct ConversationStore {
    turns: Vec<Message>,
    max_history_length: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_LENGTH)
    }
}

impl ConversationStore {
    pub fn new(max_history_length: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_history_length: max_history_length.max(1),
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>, max_history_length: usize) -> Self {
        let mut store = Self::new(max_history_length);
        store.append(Message::system(prompt));
        store
    }

    pub const fn max_history_length(&self) -> usize {
        self.max_history_length
    }

    pub fn set_max_history_length(&mut self, max: usize) {
        self.max_history_length = max.max(1);
        self.trim();
    }

    /// Append a turn.
    ///
    /// Ill-formed turns are dropped with a warning instead of failing, so a
    /// bad turn never takes the agent loop down with it.
    pub fn append(&mut self, mut turn: Message) {
        if let Some(reason) = self.rejection_reason(&turn) {
            tracing::warn!(role = %turn.role, reason, "Ignoring conversation turn");
            return;
        }

        truncate_content(&mut turn.content);
        self.turns.push(turn);

        if self.turns.len() > self.max_history_length {
            self.trim();
        }
    }

    fn rejection_reason(&self, turn: &Message) -> Option<&'static str> {
        match turn.role {
            Role::System if !self.turns.is_empty() => Some("system turn must be first and unique"),
            Role::Tool if turn.tool_call_id.as_deref().is_none_or(str::is_empty) => {
                Some("tool turn without tool_call_id")
            }
            Role::System | Role::User | Role::Tool if !turn.tool_calls.is_empty() => {
                Some("only assistant turns may carry tool calls")
            }
            Role::Assistant | Role::User | Role::System if turn.tool_call_id.is_some() => {
                Some("only tool turns may carry tool_call_id")
            }
            _ => None,
        }
    }

    /// Insert the system turn if the history does not start with one.
    pub fn ensure_system_prompt(&mut self, prompt: &str) {
        if self.turns.first().map(|m| m.role) != Some(Role::System) {
            let mut system = Message::system(prompt);
            truncate_content(&mut system.content);
            self.turns.insert(0, system);
        }
    }

    /// Drop the oldest whole sequences until the history fits.
    ///
    /// The most recent sequence is always kept, even if it alone is larger
    /// than the limit.
    pub fn trim(&mut self) {
        if self.turns.len() <= self.max_history_length {
            return;
        }

        let before = self.turns.len();
        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.turns)
            .into_iter()
            .partition(|m| m.role == Role::System);

        let budget = self.max_history_length.saturating_sub(system.len());
        let mut kept: Vec<Vec<Message>> = Vec::new();
        let mut kept_len = 0;

        for sequence in group_sequences(rest).into_iter().rev() {
            if !kept.is_empty() && kept_len + sequence.len() > budget {
                break;
            }
            kept_len += sequence.len();
            kept.push(sequence);
        }

        self.turns = system;
        self.turns.extend(kept.into_iter().rev().flatten());

        tracing::debug!(before, after = self.turns.len(), "Trimmed conversation history");
    }

    /// First structural problem in the history, if any
    pub fn structural_fault(&self) -> Option<StructuralFault> {
        let mut pending: Vec<&str> = Vec::new();

        for turn in &self.turns {
            if turn.role == Role::Tool {
                let id = turn.tool_call_id.as_deref().unwrap_or_default();
                match pending.iter().position(|p| *p == id) {
                    Some(idx) => {
                        pending.remove(idx);
                    }
                    None => return Some(StructuralFault::Orphan(id.to_string())),
                }
                continue;
            }

            if !pending.is_empty() {
                return Some(StructuralFault::Interrupted(to_owned_ids(&pending)));
            }
            pending.extend(turn.tool_calls.iter().map(|c| c.id.as_str()));
        }

        if pending.is_empty() {
            None
        } else {
            Some(StructuralFault::Unanswered(to_owned_ids(&pending)))
        }
    }

    /// Whether every tool call has exactly one result, in place
    pub fn validate_structure(&self) -> bool {
        self.structural_fault().is_none()
    }

    /// Remove every turn, including the system turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Clear and re-seed with only the system turn
    pub fn reset(&mut self, system_prompt: &str) {
        self.clear();
        self.append(Message::system(system_prompt));
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Most recent non-empty assistant text
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .find(|c| !c.trim().is_empty())
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.turns.iter().map(Message::estimate_tokens).sum()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

fn to_owned_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn truncate_content(content: &mut String) {
    if let Some((cut, _)) = content.char_indices().nth(MAX_CONTENT_CHARS) {
        content.truncate(cut);
        content.push_str(TRUNCATION_MARKER);
    }
}

/// Split non-system turns into trimming units.
///
/// An assistant turn with tool calls opens a sequence; tool turns attach to
/// it; a plain assistant turn closes it. A user turn closes any open
/// sequence and stands alone. Tool turns with no open sequence are dropped.
fn group_sequences(turns: Vec<Message>) -> Vec<Vec<Message>> {
    let mut groups = Vec::new();
    let mut open: Option<Vec<Message>> = None;
    let mut seen_ids: HashSet<String> = HashSet::new();

    for turn in turns {
        match turn.role {
            Role::Assistant if turn.requests_tools() => {
                groups.extend(open.take());
                seen_ids = turn.tool_calls.iter().map(|c| c.id.clone()).collect();
                open = Some(vec![turn]);
            }
            Role::Tool => match open.as_mut() {
                Some(sequence)
                    if turn
                        .tool_call_id
                        .as_ref()
                        .is_some_and(|id| seen_ids.contains(id)) =>
                {
                    sequence.push(turn);
                }
                _ => {
                    tracing::warn!(tool_call_id = ?turn.tool_call_id, "Dropping orphaned tool turn");
                }
            },
            Role::Assistant => match open.take() {
                Some(mut sequence) => {
                    sequence.push(turn);
                    groups.push(sequence);
                }
                None => groups.push(vec![turn]),
            },
            Role::User | Role::System => {
                groups.extend(open.take());
                groups.push(vec![turn]);
            }
        }
    }

    groups.extend(open);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, "list_patients", "{}")
    }

    fn tool_round(store: &mut ConversationStore, ids: &[&str]) {
        store.append(Message::assistant_tool_calls(
            "",
            ids.iter().map(|id| call(id)).collect(),
        ));
        for id in ids {
            store.append(Message::tool(*id, "list_patients", "[]"));
        }
    }

    #[test]
    fn test_append_normalizes_and_truncates() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::user("x".repeat(MAX_CONTENT_CHARS + 50)));

        let content = &store.last().unwrap().content;
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            content.chars().count(),
            MAX_CONTENT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::user("é".repeat(MAX_CONTENT_CHARS + 1)));
        assert!(store.last().unwrap().content.starts_with('é'));
    }

    #[test]
    fn test_rejects_ill_formed_turns() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::system("second system"));

        let mut orphan_tool = Message::new(Role::Tool, "result");
        orphan_tool.tool_call_id = None;
        store.append(orphan_tool);

        let mut user_with_calls = Message::user("hi");
        user_with_calls.tool_calls.push(call("c1"));
        store.append(user_with_calls);

        assert_eq!(store.len(), 1);
        assert_eq!(store.system_prompt(), Some("sys"));
    }

    #[test]
    fn test_trim_keeps_system_and_recent_turns() {
        let mut store = ConversationStore::with_system_prompt("sys", 4);
        for i in 0..6 {
            store.append(Message::user(format!("q{i}")));
        }

        assert_eq!(store.len(), 4);
        assert_eq!(store.turns()[0].role, Role::System);
        assert_eq!(store.turns()[1].content, "q3");
        assert_eq!(store.last().unwrap().content, "q5");
    }

    #[test]
    fn test_trim_never_splits_sequences() {
        let mut store = ConversationStore::with_system_prompt("sys", 6);
        store.append(Message::user("first"));
        tool_round(&mut store, &["a1", "a2"]);
        store.append(Message::assistant("done"));
        store.append(Message::user("second"));
        tool_round(&mut store, &["b1", "b2", "b3"]);

        assert!(store.validate_structure());
        for turn in store.turns().iter().filter(|t| t.requests_tools()) {
            for c in &turn.tool_calls {
                assert!(store
                    .turns()
                    .iter()
                    .any(|t| t.tool_call_id.as_deref() == Some(c.id.as_str())));
            }
        }
        // The three-result sequence is the newest unit and must be whole
        assert_eq!(
            store.turns().iter().filter(|t| t.role == Role::Tool).count(),
            3
        );
    }

    #[test]
    fn test_oversized_sequence_is_kept_whole() {
        let mut store = ConversationStore::with_system_prompt("sys", 3);
        store.append(Message::user("hello"));
        tool_round(&mut store, &["c1", "c2", "c3", "c4"]);

        assert!(store.validate_structure());
        assert_eq!(store.len(), 1 + 5);
        assert_eq!(store.turns()[1].tool_calls.len(), 4);
    }

    #[test]
    fn test_pairing_holds_across_many_rounds() {
        let mut store = ConversationStore::with_system_prompt("sys", DEFAULT_MAX_HISTORY_LENGTH);
        for round in 0..20 {
            store.append(Message::user(format!("q{round}")));
            let ids: Vec<String> = (0..(round % 3 + 1)).map(|i| format!("r{round}c{i}")).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            tool_round(&mut store, &refs);
            store.append(Message::assistant(format!("a{round}")));
            assert!(store.validate_structure(), "round {round}");
            assert_eq!(store.turns()[0].role, Role::System);
        }
    }

    #[test]
    fn test_validate_detects_unanswered_calls() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::user("hi"));
        store.append(Message::assistant_tool_calls("", vec![call("c1"), call("c2")]));
        store.append(Message::tool("c1", "list_patients", "[]"));

        assert_eq!(
            store.structural_fault(),
            Some(StructuralFault::Unanswered(vec!["c2".into()]))
        );
        assert!(!store.validate_structure());
    }

    #[test]
    fn test_validate_detects_interruption_and_orphans() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::assistant_tool_calls("", vec![call("c1")]));
        store.append(Message::user("new question"));
        assert!(matches!(
            store.structural_fault(),
            Some(StructuralFault::Interrupted(_))
        ));

        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::tool("ghost", "list_patients", "[]"));
        assert_eq!(
            store.structural_fault(),
            Some(StructuralFault::Orphan("ghost".into()))
        );
    }

    #[test]
    fn test_trim_drops_orphaned_tool_turns() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::tool("ghost", "list_patients", "[]"));
        store.append(Message::user("hi"));
        store.set_max_history_length(2);

        assert!(store.validate_structure());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clear_and_reset() {
        let mut store = ConversationStore::with_system_prompt("sys", 10);
        store.append(Message::user("hi"));
        store.clear();
        assert!(store.is_empty());

        store.reset("fresh");
        assert_eq!(store.len(), 1);
        assert_eq!(store.system_prompt(), Some("fresh"));
    }

    #[test]
    fn test_ensure_system_prompt() {
        let mut store = ConversationStore::new(10);
        store.append(Message::user("hi"));
        store.ensure_system_prompt("sys");
        store.ensure_system_prompt("other");

        assert_eq!(store.len(), 2);
        assert_eq!(store.system_prompt(), Some("sys"));
    }
}
