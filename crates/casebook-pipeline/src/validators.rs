//! Validators run by the retry gates
//!
//! A validator returns a verdict ([`ValidationResult`]) for content it can
//! judge, and a [`ValidatorFault`] only when it cannot judge at all (wrong
//! output kind, missing context). Verdicts are retried; faults end the run.

use std::collections::HashSet;

use casebook_graph::{DiscoveryValidator, ValidationResult};

use crate::error::ValidatorFault;
use crate::state::{StageKey, StageOutput, StageOutputs, StateView};
use crate::types::{discovery_graph, CharacterRole};

/// Judges one stage output
pub trait StageValidator: Send + Sync {
    /// Verdict on `output`, produced from `view`
    ///
    /// # Errors
    /// [`ValidatorFault`] when no verdict can be given.
    fn validate(
        &self,
        output: &StageOutput,
        view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault>;
}

impl<F> StageValidator for F
where
    F: Fn(&StageOutput, &StateView) -> Result<ValidationResult, ValidatorFault> + Send + Sync,
{
    fn validate(
        &self,
        output: &StageOutput,
        view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        self(output, view)
    }
}

fn unexpected(expected: StageKey, output: &StageOutput) -> ValidatorFault {
    ValidatorFault::new(
        expected,
        format!("expected {expected} output, got {}", output.key()),
    )
}

/// Push an error for every id seen more than once
fn duplicates<'a>(kind: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(format!("duplicate {kind} id \"{id}\""));
        }
    }
}

/// Story events: non-empty, unique, described, causally closed
#[derive(Debug, Clone, Copy, Default)]
pub struct EventsValidator;

impl StageValidator for EventsValidator {
    fn validate(
        &self,
        output: &StageOutput,
        _view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let StageOutput::Events(events) = output else {
            return Err(unexpected(StageKey::Events, output));
        };

        let mut errors = Vec::new();
        if events.is_empty() {
            errors.push("story has no events".to_string());
        }
        duplicates("event", events.iter().map(|e| e.id.as_str()), &mut errors);

        let ids: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
        for event in events {
            if event.description.trim().is_empty() {
                errors.push(format!("event \"{}\" has no description", event.id));
            }
            for cause in &event.causes {
                if !ids.contains(cause.as_str()) {
                    errors.push(format!(
                        "event \"{}\" leads to unknown event \"{cause}\"",
                        event.id
                    ));
                }
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }
}

/// Characters: non-empty, unique, named, with a culprit
#[derive(Debug, Clone, Copy, Default)]
pub struct CharactersValidator;

impl StageValidator for CharactersValidator {
    fn validate(
        &self,
        output: &StageOutput,
        _view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let StageOutput::Characters(characters) = output else {
            return Err(unexpected(StageKey::Characters, output));
        };

        let mut errors = Vec::new();
        if characters.is_empty() {
            errors.push("case has no characters".to_string());
        }
        duplicates("character", characters.iter().map(|c| c.id.as_str()), &mut errors);
        for c in characters {
            if c.name.trim().is_empty() {
                errors.push(format!("character \"{}\" has no name", c.id));
            }
        }
        if !characters.is_empty() && !characters.iter().any(|c| c.role == CharacterRole::Culprit) {
            errors.push("no character is the culprit".to_string());
        }
        Ok(ValidationResult::from_errors(errors))
    }
}

/// Locations: non-empty, unique, named
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationsValidator;

impl StageValidator for LocationsValidator {
    fn validate(
        &self,
        output: &StageOutput,
        _view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let StageOutput::Locations(locations) = output else {
            return Err(unexpected(StageKey::Locations, output));
        };

        let mut errors = Vec::new();
        if locations.is_empty() {
            errors.push("case has no locations".to_string());
        }
        duplicates("location", locations.iter().map(|l| l.id.as_str()), &mut errors);
        for l in locations {
            if l.name.trim().is_empty() {
                errors.push(format!("location \"{}\" has no name", l.id));
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }
}

/// Casebook: the discovery graph built with the fact sheet must be sound
#[derive(Debug, Clone, Copy, Default)]
pub struct CasebookValidator;

impl StageValidator for CasebookValidator {
    fn validate(
        &self,
        output: &StageOutput,
        view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let StageOutput::Casebook(casebook) = output else {
            return Err(unexpected(StageKey::Casebook, output));
        };
        let facts = view
            .facts()
            .ok_or_else(|| ValidatorFault::new(StageKey::Casebook, "fact sheet not in view"))?;

        let graph = discovery_graph(facts, casebook);
        Ok(DiscoveryValidator::validate(&graph))
    }
}

/// Questions: non-empty, unique, each answerable by a known fact that the
/// introduction does not already give away
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionsValidator;

impl StageValidator for QuestionsValidator {
    fn validate(
        &self,
        output: &StageOutput,
        view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let StageOutput::Questions(questions) = output else {
            return Err(unexpected(StageKey::Questions, output));
        };
        let facts = view
            .facts()
            .ok_or_else(|| ValidatorFault::new(StageKey::Questions, "fact sheet not in view"))?;

        let mut errors = Vec::new();
        if questions.is_empty() {
            errors.push("case has no questions".to_string());
        }
        duplicates("question", questions.iter().map(|q| q.id.as_str()), &mut errors);
        for q in questions {
            if q.answer_facts.is_empty() {
                errors.push(format!("question \"{}\" has no answer facts", q.id));
            }
            for fact in &q.answer_facts {
                if facts.get(fact).is_none() {
                    errors.push(format!(
                        "question \"{}\" is answered by unknown fact \"{fact}\"",
                        q.id
                    ));
                } else if facts.introduction.contains(fact) {
                    errors.push(format!(
                        "question \"{}\" is answered by the introduction fact \"{fact}\"",
                        q.id
                    ));
                }
            }
        }
        Ok(ValidationResult::from_errors(errors))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::state::PipelineState;
    use crate::types::{Character, Fact, FactSheet, Question, StoryEvent};

    fn empty_view() -> StateView {
        PipelineState::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .view("test", StageKey::Events, &[])
            .unwrap()
    }

    fn event(id: &str, causes: &[&str]) -> StoryEvent {
        StoryEvent {
            id: id.into(),
            time: String::new(),
            description: format!("{id} happens"),
            participants: Vec::new(),
            causes: causes.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    #[test]
    fn events_catch_unknown_causes_and_duplicates() {
        let out = StageOutput::Events(vec![event("a", &["b"]), event("a", &["zzz"])]);
        let result = EventsValidator.validate(&out, &empty_view()).unwrap();
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                "duplicate event id \"a\"".to_string(),
                "event \"a\" leads to unknown event \"b\"".to_string(),
                "event \"a\" leads to unknown event \"zzz\"".to_string(),
            ]
        );
    }

    #[test]
    fn empty_events_are_invalid() {
        let result = EventsValidator
            .validate(&StageOutput::Events(Vec::new()), &empty_view())
            .unwrap();
        assert_eq!(result.errors, vec!["story has no events".to_string()]);
    }

    #[test]
    fn characters_need_a_culprit() {
        let out = StageOutput::Characters(vec![Character {
            id: "v".into(),
            name: "Vera".into(),
            role: CharacterRole::Victim,
            description: String::new(),
        }]);
        let result = CharactersValidator.validate(&out, &empty_view()).unwrap();
        assert_eq!(result.errors, vec!["no character is the culprit".to_string()]);
    }

    #[test]
    fn wrong_output_kind_is_a_fault() {
        let fault = LocationsValidator
            .validate(&StageOutput::Events(Vec::new()), &empty_view())
            .unwrap_err();
        assert_eq!(fault.stage, StageKey::Locations);
    }

    #[test]
    fn questions_without_fact_sheet_is_a_fault() {
        let out = StageOutput::Questions(Vec::new());
        assert!(QuestionsValidator.validate(&out, &empty_view()).is_err());
    }

    #[test]
    fn questions_must_point_at_known_facts() {
        let view = PipelineState::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_output(StageOutput::Facts(FactSheet {
                facts: vec![Fact {
                    id: "f1".into(),
                    statement: "s".into(),
                    category: None,
                }],
                introduction: Vec::new(),
            }))
            .unwrap()
            .view("create_questions", StageKey::Questions, &[StageKey::Facts])
            .unwrap();
        let out = StageOutput::Questions(vec![
            Question {
                id: "ok".into(),
                text: "?".into(),
                answer_facts: vec!["f1".into()],
                points: 1,
            },
            Question {
                id: "bad".into(),
                text: "?".into(),
                answer_facts: vec!["f9".into()],
                points: 1,
            },
        ]);
        let result = QuestionsValidator.validate(&out, &view).unwrap();
        assert_eq!(
            result.errors,
            vec!["question \"bad\" is answered by unknown fact \"f9\"".to_string()]
        );
    }

    #[test]
    fn questions_answered_by_the_introduction_are_rejected() {
        let view = PipelineState::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .with_output(StageOutput::Facts(FactSheet {
                facts: vec![
                    Fact {
                        id: "f_body".into(),
                        statement: "A body in the library".into(),
                        category: None,
                    },
                    Fact {
                        id: "f_knife".into(),
                        statement: "The knife is missing".into(),
                        category: None,
                    },
                ],
                introduction: vec!["f_body".into()],
            }))
            .unwrap()
            .view("create_questions", StageKey::Questions, &[StageKey::Facts])
            .unwrap();
        let out = StageOutput::Questions(vec![Question {
            id: "where".into(),
            text: "?".into(),
            answer_facts: vec!["f_knife".into(), "f_body".into()],
            points: 1,
        }]);
        let result = QuestionsValidator.validate(&out, &view).unwrap();
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec!["question \"where\" is answered by the introduction fact \"f_body\"".to_string()]
        );
    }

    #[test]
    fn closures_are_validators() {
        let always = |_: &StageOutput, _: &StateView| -> Result<ValidationResult, ValidatorFault> {
            Ok(ValidationResult::valid())
        };
        let result = always
            .validate(&StageOutput::Events(Vec::new()), &empty_view())
            .unwrap();
        assert!(result.valid);
    }
}
