//! Domain payloads produced by pipeline stages
//!
//! Every stage output and the final [`Case`] are plain serde types, so the
//! generation service can return them as JSON and storage can persist them
//! unchanged.

use casebook_graph::{DiscoveryGraph, EntryId, FactId, GraphBuilder, QuestionFacts};
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique case identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub Ulid);

impl CaseId {
    /// Generate new case ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Case template: the premise a day's mystery is built around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub setting: String,
    #[serde(default)]
    pub premise: String,
}

/// One event of the underlying causal story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub id: String,
    /// Free-form time label ("23:40", "the night before")
    #[serde(default)]
    pub time: String,
    pub description: String,
    /// Names of the people involved, as written by the generator
    #[serde(default)]
    pub participants: Vec<String>,
    /// Ids of events this one leads to
    #[serde(default)]
    pub causes: Vec<String>,
}

/// Narrative role of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    Victim,
    Culprit,
    Suspect,
    Witness,
    Bystander,
}

/// A person in the case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub role: CharacterRole,
    #[serde(default)]
    pub description: String,
}

/// A place in the case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A discoverable fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub statement: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Output of fact distribution: every fact, plus the ones the introduction
/// hands to the player up front
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactSheet {
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub introduction: Vec<FactId>,
}

impl FactSheet {
    /// Look up a fact by id
    #[must_use]
    pub fn get(&self, id: &FactId) -> Option<&Fact> {
        self.facts.iter().find(|f| &f.id == id)
    }
}

/// A player-visitable casebook entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasebookEntry {
    pub id: EntryId,
    pub title: String,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    /// Facts handed over on visiting
    #[serde(default)]
    pub reveals: Vec<FactId>,
    /// Holding any one of these makes the entry visitable; empty means open
    #[serde(default)]
    pub requires_any: Vec<FactId>,
}

/// Written text for the introduction and every entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Prose {
    pub introduction: String,
    #[serde(default)]
    pub entries: IndexMap<EntryId, String>,
}

/// A quiz question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Discovering any one of these facts answers the question
    pub answer_facts: Vec<FactId>,
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    1
}

/// The verified shortest visiting order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptimalPath {
    pub entries: Vec<EntryId>,
    #[serde(default)]
    pub states_explored: usize,
}

impl OptimalPath {
    /// Number of visits
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no visit is needed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Record of the cross-stage checks a case passed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoherenceReport {
    pub checks: Vec<String>,
}

/// Build the discovery graph described by a fact sheet and casebook
///
/// Introduction facts become the graph's initially known facts.
#[must_use]
pub fn discovery_graph(facts: &FactSheet, casebook: &[CasebookEntry]) -> DiscoveryGraph {
    let mut builder = GraphBuilder::new();
    for fact in &facts.facts {
        builder.fact(fact.id.clone());
    }
    for entry in casebook {
        builder.entry(
            entry.id.clone(),
            entry.reveals.iter().cloned(),
            entry.requires_any.iter().cloned(),
        );
    }
    for id in &facts.introduction {
        builder.initial_fact(id.clone());
    }
    builder.build()
}

/// Reduce questions to the answer sets the solver works with
#[must_use]
pub fn question_facts(questions: &[Question]) -> Vec<QuestionFacts> {
    questions
        .iter()
        .map(|q| QuestionFacts::new(q.id.clone(), q.answer_facts.iter().cloned()))
        .collect()
}

/// The finished daily case
///
/// Assembled once at the end of a successful run and never mutated after
/// it is handed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub template: Template,
    pub events: Vec<StoryEvent>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub facts: Vec<Fact>,
    pub casebook: Vec<CasebookEntry>,
    pub introduction_facts: Vec<FactId>,
    pub prose: Prose,
    pub questions: Vec<Question>,
    pub optimal_path: OptimalPath,
}

impl Case {
    /// Discovery graph of this case
    #[must_use]
    pub fn graph(&self) -> DiscoveryGraph {
        let sheet = FactSheet {
            facts: self.facts.clone(),
            introduction: self.introduction_facts.clone(),
        };
        discovery_graph(&sheet, &self.casebook)
    }
}

/// Where storage put a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReceipt {
    pub case_id: CaseId,
    /// Storage-specific location (path, key, ...)
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_defaults_to_one_point() {
        let q: Question = serde_json::from_str(
            r#"{"id":"q","text":"Who?","answer_facts":["f1","f2"]}"#,
        )
        .unwrap();
        assert_eq!(q.points, 1);
        assert_eq!(q.answer_facts, vec![FactId::from("f1"), FactId::from("f2")]);
    }

    #[test]
    fn casebook_entry_defaults_to_open() {
        let e: CasebookEntry =
            serde_json::from_str(r#"{"id":"a","title":"Attic","reveals":["f"]}"#).unwrap();
        assert!(e.requires_any.is_empty());
        assert!(e.character_id.is_none());
    }

    #[test]
    fn introduction_facts_seed_the_graph() {
        let sheet = FactSheet {
            facts: vec![
                Fact { id: "intro".into(), statement: "s".into(), category: None },
                Fact { id: "f".into(), statement: "s".into(), category: None },
            ],
            introduction: vec!["intro".into()],
        };
        let casebook = vec![CasebookEntry {
            id: "gated".into(),
            title: "Gated".into(),
            character_id: None,
            location_id: None,
            reveals: vec!["f".into()],
            requires_any: vec!["intro".into()],
        }];
        let graph = discovery_graph(&sheet, &casebook);
        assert_eq!(graph.initial_facts().len(), 1);
        assert_eq!(graph.entry_count(), 1);
    }
}
