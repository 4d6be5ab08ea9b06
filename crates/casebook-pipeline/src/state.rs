//! Accumulated pipeline state
//!
//! [`PipelineState`] is an append-only record of stage outputs. Every change
//! consumes the old value and returns a new one with a higher version, so a
//! stage can never observe a half-applied update. Stages never see the state
//! itself, only a [`StateView`] projected onto their declared inputs.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::StateError;
use crate::types::{
    CasebookEntry, Character, CoherenceReport, FactSheet, Location, OptimalPath, Prose, Question,
    StoryEvent, Template,
};

/// Key of one stage output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    Template,
    Events,
    Characters,
    Locations,
    Facts,
    Casebook,
    Prose,
    Questions,
    OptimalPath,
    Coherence,
}

impl StageKey {
    /// Every key, in pipeline order
    pub const ALL: [StageKey; 10] = [
        StageKey::Template,
        StageKey::Events,
        StageKey::Characters,
        StageKey::Locations,
        StageKey::Facts,
        StageKey::Casebook,
        StageKey::Prose,
        StageKey::Questions,
        StageKey::OptimalPath,
        StageKey::Coherence,
    ];

    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Events => "events",
            Self::Characters => "characters",
            Self::Locations => "locations",
            Self::Facts => "facts",
            Self::Casebook => "casebook",
            Self::Prose => "prose",
            Self::Questions => "questions",
            Self::OptimalPath => "optimal_path",
            Self::Coherence => "coherence",
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "payload", rename_all = "snake_case")]
pub enum StageOutput {
    Template(Template),
    Events(Vec<StoryEvent>),
    Characters(Vec<Character>),
    Locations(Vec<Location>),
    Facts(FactSheet),
    Casebook(Vec<CasebookEntry>),
    Prose(Prose),
    Questions(Vec<Question>),
    OptimalPath(OptimalPath),
    Coherence(CoherenceReport),
}

impl StageOutput {
    /// Key this output is recorded under
    #[must_use]
    pub const fn key(&self) -> StageKey {
        match self {
            Self::Template(_) => StageKey::Template,
            Self::Events(_) => StageKey::Events,
            Self::Characters(_) => StageKey::Characters,
            Self::Locations(_) => StageKey::Locations,
            Self::Facts(_) => StageKey::Facts,
            Self::Casebook(_) => StageKey::Casebook,
            Self::Prose(_) => StageKey::Prose,
            Self::Questions(_) => StageKey::Questions,
            Self::OptimalPath(_) => StageKey::OptimalPath,
            Self::Coherence(_) => StageKey::Coherence,
        }
    }

    /// Decode a raw generation payload as the output for `key`
    ///
    /// # Errors
    /// Returns the decode error when the payload does not match the shape
    /// expected for `key`.
    pub fn decode(key: StageKey, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;
        Ok(match key {
            StageKey::Template => Self::Template(from_value(payload)?),
            StageKey::Events => Self::Events(from_value(payload)?),
            StageKey::Characters => Self::Characters(from_value(payload)?),
            StageKey::Locations => Self::Locations(from_value(payload)?),
            StageKey::Facts => Self::Facts(from_value(payload)?),
            StageKey::Casebook => Self::Casebook(from_value(payload)?),
            StageKey::Prose => Self::Prose(from_value(payload)?),
            StageKey::Questions => Self::Questions(from_value(payload)?),
            StageKey::OptimalPath => Self::OptimalPath(from_value(payload)?),
            StageKey::Coherence => Self::Coherence(from_value(payload)?),
        })
    }
}

/// Typed read access shared by [`PipelineState`] and [`StateView`]
pub trait StageOutputs {
    /// Raw output recorded under `key`
    fn output(&self, key: StageKey) -> Option<&StageOutput>;

    /// Recorded template, if any
    fn template(&self) -> Option<&Template> {
        match self.output(StageKey::Template) {
            Some(StageOutput::Template(t)) => Some(t),
            _ => None,
        }
    }

    /// Recorded events, if any
    fn events(&self) -> Option<&[StoryEvent]> {
        match self.output(StageKey::Events) {
            Some(StageOutput::Events(v)) => Some(v),
            _ => None,
        }
    }

    /// Recorded characters, if any
    fn characters(&self) -> Option<&[Character]> {
        match self.output(StageKey::Characters) {
            Some(StageOutput::Characters(v)) => Some(v),
            _ => None,
        }
    }

    /// Recorded locations, if any
    fn locations(&self) -> Option<&[Location]> {
        match self.output(StageKey::Locations) {
            Some(StageOutput::Locations(v)) => Some(v),
            _ => None,
        }
    }

    /// Recorded facts, if any
    fn facts(&self) -> Option<&FactSheet> {
        match self.output(StageKey::Facts) {
            Some(StageOutput::Facts(f)) => Some(f),
            _ => None,
        }
    }

    /// Recorded casebook, if any
    fn casebook(&self) -> Option<&[CasebookEntry]> {
        match self.output(StageKey::Casebook) {
            Some(StageOutput::Casebook(v)) => Some(v),
            _ => None,
        }
    }

    /// Recorded prose, if any
    fn prose(&self) -> Option<&Prose> {
        match self.output(StageKey::Prose) {
            Some(StageOutput::Prose(p)) => Some(p),
            _ => None,
        }
    }

    /// Recorded questions, if any
    fn questions(&self) -> Option<&[Question]> {
        match self.output(StageKey::Questions) {
            Some(StageOutput::Questions(v)) => Some(v),
            _ => None,
        }
    }

    /// Recorded optimal path, if any
    fn optimal_path(&self) -> Option<&OptimalPath> {
        match self.output(StageKey::OptimalPath) {
            Some(StageOutput::OptimalPath(p)) => Some(p),
            _ => None,
        }
    }
}

/// Validation errors handed back to the stage being regenerated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub stage: StageKey,
    pub errors: Vec<String>,
}

/// Append-only record of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    run_id: Ulid,
    date: NaiveDate,
    version: u64,
    outputs: IndexMap<StageKey, StageOutput>,
    retries: BTreeMap<StageKey, u32>,
    feedback: Option<Feedback>,
}

impl PipelineState {
    /// Empty state for a run targeting `date`
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            run_id: Ulid::new(),
            date,
            version: 0,
            outputs: IndexMap::new(),
            retries: BTreeMap::new(),
            feedback: None,
        }
    }

    /// Run identifier
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Ulid {
        self.run_id
    }

    /// Target date
    #[inline]
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Number of transitions applied so far
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Recorded outputs in write order
    pub fn outputs(&self) -> impl Iterator<Item = &StageOutput> {
        self.outputs.values()
    }

    /// Whether `key` has been written
    #[inline]
    #[must_use]
    pub fn contains(&self, key: StageKey) -> bool {
        self.outputs.contains_key(&key)
    }

    /// Retry counter of a gated stage, `None` before the gate is entered
    #[must_use]
    pub fn retry_count(&self, key: StageKey) -> Option<u32> {
        self.retries.get(&key).copied()
    }

    /// Pending correction feedback
    #[must_use]
    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    /// Record a stage output
    ///
    /// # Errors
    /// [`StateError::AlreadyWritten`] when the key is already present.
    pub fn with_output(mut self, output: StageOutput) -> Result<Self, StateError> {
        let key = output.key();
        if self.outputs.contains_key(&key) {
            return Err(StateError::AlreadyWritten(key));
        }
        self.outputs.insert(key, output);
        self.version += 1;
        Ok(self)
    }

    /// Enter the gate for `key`: counter starts at zero
    #[must_use]
    pub fn with_gate_entered(mut self, key: StageKey) -> Self {
        self.retries.insert(key, 0);
        self.version += 1;
        self
    }

    /// Count one failed attempt of `key` and keep its errors as feedback
    #[must_use]
    pub fn with_retry(mut self, key: StageKey, errors: Vec<String>) -> Self {
        *self.retries.entry(key).or_insert(0) += 1;
        self.feedback = Some(Feedback { stage: key, errors });
        self.version += 1;
        self
    }

    /// Drop pending feedback
    #[must_use]
    pub fn with_feedback_cleared(mut self) -> Self {
        if self.feedback.take().is_some() {
            self.version += 1;
        }
        self
    }

    /// Project the state onto `inputs` for a stage producing `output`
    ///
    /// # Errors
    /// Returns the missing keys when an input has not been written yet.
    pub fn view(
        &self,
        stage: &'static str,
        output: StageKey,
        inputs: &[StageKey],
    ) -> Result<StateView, Vec<StageKey>> {
        let missing: Vec<StageKey> = inputs
            .iter()
            .copied()
            .filter(|k| !self.outputs.contains_key(k))
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let feedback = self
            .feedback
            .as_ref()
            .filter(|f| f.stage == output)
            .map(|f| f.errors.clone())
            .unwrap_or_default();

        Ok(StateView {
            stage,
            date: self.date,
            attempt: self.retries.get(&output).copied().unwrap_or(0) + 1,
            feedback,
            inputs: inputs
                .iter()
                .filter_map(|k| self.outputs.get(k).map(|o| (*k, o.clone())))
                .collect(),
        })
    }
}

impl StageOutputs for PipelineState {
    fn output(&self, key: StageKey) -> Option<&StageOutput> {
        self.outputs.get(&key)
    }
}

/// What a stage gets to see
///
/// Serialized as-is into generation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateView {
    /// Step name
    pub stage: &'static str,
    /// Target date of the run
    pub date: NaiveDate,
    /// 1-based attempt number
    pub attempt: u32,
    /// Errors from the previous attempt, empty on the first
    pub feedback: Vec<String>,
    /// Declared inputs only
    pub inputs: IndexMap<StageKey, StageOutput>,
}

impl StageOutputs for StateView {
    fn output(&self, key: StageKey) -> Option<&StageOutput> {
        self.inputs.get(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn template() -> StageOutput {
        StageOutput::Template(Template {
            id: "t".into(),
            title: "T".into(),
            setting: "s".into(),
            premise: String::new(),
        })
    }

    #[test]
    fn outputs_are_write_once() {
        let state = PipelineState::new(date()).with_output(template()).unwrap();
        assert_eq!(state.version(), 1);
        let err = state.with_output(template()).unwrap_err();
        assert_eq!(err, StateError::AlreadyWritten(StageKey::Template));
    }

    #[test]
    fn retry_increments_version_and_keeps_outputs() {
        let before = PipelineState::new(date()).with_output(template()).unwrap();
        let after = before
            .clone()
            .with_gate_entered(StageKey::Events)
            .with_retry(StageKey::Events, vec!["empty".into()]);

        assert_eq!(after.retry_count(StageKey::Events), Some(1));
        assert!(after.version() > before.version());
        assert_eq!(after.template(), before.template());
        assert_eq!(after.feedback().map(|f| f.errors.len()), Some(1));
    }

    #[test]
    fn view_carries_only_declared_inputs() {
        let state = PipelineState::new(date())
            .with_output(template())
            .unwrap()
            .with_output(StageOutput::Events(Vec::new()))
            .unwrap();
        let view = state
            .view("populate_characters", StageKey::Characters, &[StageKey::Template])
            .unwrap();
        assert!(view.template().is_some());
        assert!(view.events().is_none());
        assert_eq!(view.attempt, 1);
    }

    #[test]
    fn view_reports_missing_inputs() {
        let state = PipelineState::new(date());
        let missing = state
            .view("build_locations", StageKey::Locations, &[StageKey::Template, StageKey::Events])
            .unwrap_err();
        assert_eq!(missing, vec![StageKey::Template, StageKey::Events]);
    }

    #[test]
    fn feedback_reaches_only_the_retrying_stage() {
        let state = PipelineState::new(date())
            .with_gate_entered(StageKey::Events)
            .with_retry(StageKey::Events, vec!["no events".into()]);

        let events = state.view("generate_events", StageKey::Events, &[]).unwrap();
        assert_eq!(events.attempt, 2);
        assert_eq!(events.feedback, vec!["no events".to_string()]);

        let other = state.view("populate_characters", StageKey::Characters, &[]).unwrap();
        assert!(other.feedback.is_empty());
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let bad = serde_json::json!({"not": "a list"});
        assert!(StageOutput::decode(StageKey::Events, bad).is_err());
        let ok = StageOutput::decode(StageKey::Events, serde_json::json!([])).unwrap();
        assert_eq!(ok.key(), StageKey::Events);
    }
}
