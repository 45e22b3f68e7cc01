//! Entity Resolution
//!
//! Turns a spoken or typed name ("Nasif", "cardio") into the identifier a
//! tool call needs. Candidates come from the read-only list tool of the
//! entity kind; matching is a case-insensitive substring pass first, then a
//! Levenshtein similarity pass over the candidate's name fields.
//!
//! ```text
//! similarity = (max_len - distance) * 100 / max_len
//!
//! "nazif" vs "nasif"  →  distance 1, max_len 5  →  80%
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::tool::ToolExecutor;

/// Default minimum similarity for a fuzzy match
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 70.0;

/// Kinds of entity that can be looked up by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Staff,
    Department,
}

impl EntityKind {
    pub const ALL: [Self; 3] = [Self::Patient, Self::Staff, Self::Department];

    /// Read-only tool that lists every entity of this kind
    pub const fn list_tool(self) -> &'static str {
        match self {
            Self::Patient => "list_patients",
            Self::Staff => "list_staff",
            Self::Department => "list_departments",
        }
    }

    /// Tool argument that carries a human-supplied name
    pub const fn name_argument(self) -> &'static str {
        match self {
            Self::Patient => "patient_name",
            Self::Staff => "staff_name",
            Self::Department => "department_name",
        }
    }

    /// Tool argument that carries the resolved identifier
    pub const fn id_argument(self) -> &'static str {
        match self {
            Self::Patient => "patient_id",
            Self::Staff => "staff_id",
            Self::Department => "department_id",
        }
    }

    const fn collection_key(self) -> &'static str {
        match self {
            Self::Patient => "patients",
            Self::Staff => "staff",
            Self::Department => "departments",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Staff => write!(f, "staff"),
            Self::Department => write!(f, "department"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "patient" | "patients" => Ok(Self::Patient),
            "staff" | "doctor" | "nurse" | "staff_member" => Ok(Self::Staff),
            "department" | "departments" => Ok(Self::Department),
            other => Err(crate::AgentError::Parse(format!("unknown entity kind: {other}"))),
        }
    }
}

/// Which name field produced a match
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    /// Substring pass, no fuzzy scoring involved
    Exact,
    FirstName,
    LastName,
    FullName,
}

/// A candidate entity as listed by the tool server
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
}

impl Candidate {
    /// Extract a candidate from one listed record.
    ///
    /// Accepts `id` or `<kind>_id` (string or number) and any of
    /// `first_name`, `last_name`, `name`, `full_name`.
    pub fn from_record(kind: EntityKind, record: &Value) -> Option<Self> {
        let obj = record.as_object()?;
        let id = ["id", kind.id_argument()]
            .iter()
            .find_map(|key| match obj.get(*key)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })?;

        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Some(Self {
            id,
            first_name: text("first_name"),
            last_name: text("last_name"),
            name: text("name").or_else(|| text("full_name")),
        })
    }

    /// Display label: the explicit name, else "first last"
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn scored_fields(&self) -> Vec<(MatchedField, String)> {
        let mut fields = Vec::with_capacity(3);
        if let Some(first) = &self.first_name {
            fields.push((MatchedField::FirstName, first.clone()));
        }
        if let Some(last) = &self.last_name {
            fields.push((MatchedField::LastName, last.clone()));
        }
        let full = self.label();
        if !full.is_empty() {
            fields.push((MatchedField::FullName, full));
        }
        fields
    }
}

/// Reference to another candidate that scored the same as the winner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRef {
    pub candidate_id: String,
    pub candidate_label: String,
}

/// Result of resolving a name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMatch {
    pub candidate_id: String,
    pub candidate_label: String,
    pub similarity_percent: f64,
    pub matched_field: MatchedField,
    /// Other candidates with the same score; non-empty means ambiguous
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ties: Vec<CandidateRef>,
}

impl EntityMatch {
    pub fn is_fuzzy(&self) -> bool {
        self.matched_field != MatchedField::Exact
    }

    pub fn is_ambiguous(&self) -> bool {
        !self.ties.is_empty()
    }
}

/// Levenshtein similarity in percent, case-insensitive.
///
/// `search` is the user-supplied term. Returns `None` when both strings are
/// empty.
#[allow(clippy::cast_precision_loss)]
pub fn similarity(search: &str, field: &str) -> Option<f64> {
    let search = search.to_lowercase();
    let field = field.to_lowercase();
    let max_len = search.chars().count().max(field.chars().count());
    if max_len == 0 {
        return None;
    }
    let distance = strsim::levenshtein(&search, &field).min(max_len);
    Some((max_len - distance) as f64 * 100.0 / max_len as f64)
}

/// Pick the best candidate for `name`.
///
/// A substring hit wins outright; otherwise the highest fuzzy score at or
/// above `threshold` wins, earlier candidates first on equal scores.
pub fn match_candidates(name: &str, candidates: &[Candidate], threshold: f64) -> Option<EntityMatch> {
    let search = name.trim().to_lowercase();
    if search.is_empty() || candidates.is_empty() {
        return None;
    }

    let exact: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            let label = c.label().to_lowercase();
            !label.is_empty() && (label.contains(&search) || search.contains(&label))
        })
        .collect();

    if let Some((first, rest)) = exact.split_first() {
        return Some(EntityMatch {
            candidate_id: first.id.clone(),
            candidate_label: first.label(),
            similarity_percent: 100.0,
            matched_field: MatchedField::Exact,
            ties: rest.iter().map(|c| candidate_ref(c)).collect(),
        });
    }

    let mut scored: Vec<(&Candidate, f64, MatchedField)> = candidates
        .iter()
        .filter_map(|c| {
            c.scored_fields()
                .into_iter()
                .filter_map(|(field, value)| similarity(&search, &value).map(|s| (s, field)))
                .fold(None, |best: Option<(f64, MatchedField)>, (score, field)| match best {
                    Some((top, _)) if top >= score => best,
                    _ => Some((score, field)),
                })
                .map(|(score, field)| (c, score, field))
        })
        .filter(|(_, score, _)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (winner, score, field) = scored.first().copied()?;
    let ties = scored
        .iter()
        .skip(1)
        .take_while(|(_, s, _)| s.total_cmp(&score).is_eq())
        .map(|(c, _, _)| candidate_ref(c))
        .collect();

    Some(EntityMatch {
        candidate_id: winner.id.clone(),
        candidate_label: winner.label(),
        similarity_percent: score,
        matched_field: field,
        ties,
    })
}

fn candidate_ref(candidate: &Candidate) -> CandidateRef {
    CandidateRef {
        candidate_id: candidate.id.clone(),
        candidate_label: candidate.label(),
    }
}

/// Pull the record list out of a list-tool payload.
///
/// Accepts a bare array, or an object holding the array under the kind's
/// collection key or one of `items`, `data`, `results`.
pub fn extract_candidates(kind: EntityKind, payload: &Value) -> Vec<Candidate> {
    let records = match payload {
        Value::Array(items) => Some(items),
        Value::Object(obj) => [kind.collection_key(), "items", "data", "results"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    records
        .map(|items| {
            items
                .iter()
                .filter_map(|r| Candidate::from_record(kind, r))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolves names against the tool server's entity lists
#[derive(Clone)]
pub struct EntityResolver {
    executor: Arc<dyn ToolExecutor>,
    threshold: f64,
}

impl EntityResolver {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            executor,
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve with the configured threshold
    pub async fn resolve(&self, kind: EntityKind, name: &str) -> Result<Option<EntityMatch>> {
        self.resolve_with_threshold(kind, name, self.threshold).await
    }

    pub async fn resolve_with_threshold(
        &self,
        kind: EntityKind,
        name: &str,
        threshold: f64,
    ) -> Result<Option<EntityMatch>> {
        let payload = self
            .executor
            .call(kind.list_tool(), &Value::Object(Map::new()))
            .await?;
        let candidates = extract_candidates(kind, &payload);

        let found = match_candidates(name, &candidates, threshold);
        match &found {
            Some(m) => tracing::debug!(
                %kind,
                name,
                candidate = %m.candidate_id,
                similarity = m.similarity_percent,
                field = ?m.matched_field,
                ties = m.ties.len(),
                "Resolved entity name"
            ),
            None => tracing::debug!(%kind, name, candidates = candidates.len(), "No entity matched"),
        }
        Ok(found)
    }

    /// Fill in `<kind>_id` arguments from `<kind>_name` arguments.
    ///
    /// Only kinds for which `accepts(id_key)` holds are considered, and an
    /// id that is already present is never overwritten. Misses and lookup
    /// failures leave the arguments untouched. Returns the applied matches
    /// that need provenance: fuzzy ones, and exact ones with ties.
    pub async fn resolve_arguments<F>(&self, arguments: &mut Map<String, Value>, accepts: F) -> Vec<EntityMatch>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        let mut applied = Vec::new();

        for kind in EntityKind::ALL {
            let id_key = kind.id_argument();
            if !accepts(id_key) || has_value(arguments.get(id_key)) {
                continue;
            }
            let Some(name) = arguments
                .get(kind.name_argument())
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
            else {
                continue;
            };

            match self.resolve(kind, &name).await {
                Ok(Some(found)) => {
                    arguments.insert(id_key.into(), Value::String(found.candidate_id.clone()));
                    if found.is_fuzzy() || found.is_ambiguous() {
                        applied.push(found);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%kind, name, error = %e, "Entity lookup failed; leaving name unresolved");
                }
            }
        }

        applied
    }
}

fn has_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolSchema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn person(id: &str, first: &str, last: &str) -> Candidate {
        Candidate {
            id: id.into(),
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            name: None,
        }
    }

    fn named(id: &str, name: &str) -> Candidate {
        Candidate {
            id: id.into(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    struct Directory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolExecutor for Directory {
        fn name(&self) -> &str {
            "directory"
        }

        async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
            Ok(Vec::new())
        }

        async fn call(&self, name: &str, _arguments: &Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match name {
                "list_patients" => Ok(json!({"patients": [
                    {"id": 17, "first_name": "Mohamed", "last_name": "Nazif"},
                    {"id": 18, "first_name": "Sara", "last_name": "Haddad"},
                ]})),
                "list_departments" => Ok(json!([{"department_id": "D1", "name": "Cardiology"}])),
                _ => Err(crate::AgentError::ToolNotFound(name.into())),
            }
        }
    }

    fn directory() -> Arc<Directory> {
        Arc::new(Directory {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_similarity_is_normalized_levenshtein() {
        assert_eq!(similarity("Nazif", "Nasif"), Some(80.0));
        assert_eq!(similarity("abc", "ABC"), Some(100.0));
        assert_eq!(similarity("", ""), None);
        assert_eq!(similarity("abc", "xyz"), Some(0.0));
    }

    #[test]
    fn test_fuzzy_threshold() {
        let candidates = vec![named("1", "Nasif")];

        let hit = match_candidates("Nazif", &candidates, 70.0).unwrap();
        assert_eq!(hit.similarity_percent, 80.0);
        assert!(hit.is_fuzzy());

        assert!(match_candidates("Nazif", &candidates, 90.0).is_none());
    }

    #[test]
    fn test_exact_match_takes_precedence() {
        let candidates = vec![
            person("1", "Nazif", "Karimov"),
            person("2", "Anna", "Nazifa"),
        ];
        let hit = match_candidates("Anna Nazifa", &candidates, 70.0).unwrap();
        assert_eq!(hit.candidate_id, "2");
        assert_eq!(hit.matched_field, MatchedField::Exact);
        assert_eq!(hit.similarity_percent, 100.0);

        // A substring hit beats a closer fuzzy candidate listed earlier
        let candidates = vec![named("1", "Nasa"), named("2", "Mohamed Nasi Khalil")];
        assert_eq!(similarity("nasi", "Nasa"), Some(75.0));
        let hit = match_candidates("Nasi", &candidates, 70.0).unwrap();
        assert_eq!(hit.candidate_id, "2");
        assert_eq!(hit.matched_field, MatchedField::Exact);
    }

    #[test]
    fn test_last_name_scenario() {
        let candidates = vec![person("7", "Mohamed", "Nazif"), person("8", "Sara", "Haddad")];
        let hit = match_candidates("Nasif", &candidates, 70.0).unwrap();

        assert_eq!(hit.candidate_id, "7");
        assert_eq!(hit.matched_field, MatchedField::LastName);
        assert!(hit.similarity_percent >= 80.0);
        assert_eq!(hit.candidate_label, "Mohamed Nazif");
    }

    #[test]
    fn test_ties_are_surfaced() {
        let candidates = vec![named("1", "Jon"), named("2", "Jan"), named("3", "Xyz")];
        let hit = match_candidates("Jen", &candidates, 60.0).unwrap();

        assert_eq!(hit.candidate_id, "1");
        assert!(hit.is_ambiguous());
        assert_eq!(hit.ties[0].candidate_id, "2");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(match_candidates("Nazif", &[], 70.0).is_none());
        assert!(match_candidates("   ", &[named("1", "Nazif")], 70.0).is_none());
    }

    #[test]
    fn test_extract_candidates_shapes() {
        let bare = json!([{"id": "p1", "name": "Ward A"}]);
        assert_eq!(extract_candidates(EntityKind::Department, &bare).len(), 1);

        let wrapped = json!({"items": [{"patient_id": 5, "first_name": "A"}, {"no_id": true}]});
        let found = extract_candidates(EntityKind::Patient, &wrapped);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "5");

        assert!(extract_candidates(EntityKind::Staff, &json!("text")).is_empty());
    }

    #[tokio::test]
    async fn test_resolver_fetches_candidates() {
        let resolver = EntityResolver::new(directory());
        let hit = resolver
            .resolve(EntityKind::Patient, "Nasif")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.candidate_id, "17");
        assert_eq!(hit.matched_field, MatchedField::LastName);

        let none = resolver
            .resolve_with_threshold(EntityKind::Patient, "Nasif", 90.0)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_resolve_arguments_fills_ids() {
        let dir = directory();
        let resolver = EntityResolver::new(dir.clone());

        let mut args = json!({
            "patient_name": "Nasif",
            "department_name": "cardiology",
            "staff_name": "Dr. Nobody",
        })
        .as_object()
        .cloned()
        .unwrap();

        let applied = resolver
            .resolve_arguments(&mut args, |key| key != "staff_id")
            .await;

        assert_eq!(args["patient_id"], json!("17"));
        assert_eq!(args["department_id"], json!("D1"));
        assert!(args.get("staff_id").is_none());
        // Only the patient lookup was fuzzy
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].candidate_id, "17");
        assert_eq!(dir.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_arguments_reports_exact_ties() {
        let resolver = EntityResolver::new(directory());
        // "ha" is a substring of both "Mohamed Nazif" and "Sara Haddad"
        let mut args = json!({"patient_name": "ha"}).as_object().cloned().unwrap();

        let applied = resolver.resolve_arguments(&mut args, |_| true).await;

        assert_eq!(args["patient_id"], json!("17"));
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].matched_field, MatchedField::Exact);
        assert_eq!(applied[0].ties[0].candidate_id, "18");
    }

    #[tokio::test]
    async fn test_resolve_arguments_keeps_existing_id() {
        let dir = directory();
        let resolver = EntityResolver::new(dir.clone());
        let mut args = json!({"patient_name": "Nasif", "patient_id": "99"})
            .as_object()
            .cloned()
            .unwrap();

        let applied = resolver.resolve_arguments(&mut args, |_| true).await;
        assert!(applied.is_empty());
        assert_eq!(args["patient_id"], json!("99"));
        assert_eq!(dir.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("Patient".parse::<EntityKind>().unwrap(), EntityKind::Patient);
        assert_eq!("doctor".parse::<EntityKind>().unwrap(), EntityKind::Staff);
        assert!("room".parse::<EntityKind>().is_err());
    }
}
