//! Cross-stage consistency checks run once every part of a case exists

use std::collections::HashSet;

use casebook_graph::check_path;

use crate::state::{StageKey, StageOutputs};
use crate::types::{discovery_graph, question_facts};

/// Names of the checks, in the order they run
pub const CHECKS: [&str; 6] = [
    "introduction facts exist",
    "answer facts exist",
    "no question is answered by the introduction alone",
    "optimal path replays as feasible and covering",
    "entries reference known characters and locations",
    "every entry has prose",
];

/// Run every check and collect all violations
///
/// Missing parts are reported as violations rather than skipped.
#[must_use]
pub fn coherence_errors(parts: &impl StageOutputs) -> Vec<String> {
    let mut errors = Vec::new();

    let required = [
        (StageKey::Characters, parts.characters().is_some()),
        (StageKey::Locations, parts.locations().is_some()),
        (StageKey::Facts, parts.facts().is_some()),
        (StageKey::Casebook, parts.casebook().is_some()),
        (StageKey::Prose, parts.prose().is_some()),
        (StageKey::Questions, parts.questions().is_some()),
        (StageKey::OptimalPath, parts.optimal_path().is_some()),
    ];
    for (key, present) in required {
        if !present {
            errors.push(format!("{key} missing"));
        }
    }
    let (
        Some(characters),
        Some(locations),
        Some(facts),
        Some(casebook),
        Some(prose),
        Some(questions),
        Some(path),
    ) = (
        parts.characters(),
        parts.locations(),
        parts.facts(),
        parts.casebook(),
        parts.prose(),
        parts.questions(),
        parts.optimal_path(),
    )
    else {
        return errors;
    };

    for id in &facts.introduction {
        if facts.get(id).is_none() {
            errors.push(format!("introduction fact \"{id}\" does not exist"));
        }
    }

    for q in questions {
        for fact in &q.answer_facts {
            if facts.get(fact).is_none() {
                errors.push(format!("question \"{}\" answer fact \"{fact}\" does not exist", q.id));
            }
        }
    }

    let intro: HashSet<_> = facts.introduction.iter().collect();
    for q in questions {
        if q.answer_facts.iter().any(|f| intro.contains(f)) {
            errors.push(format!(
                "question \"{}\" is answered by the introduction alone",
                q.id
            ));
        }
    }

    let graph = discovery_graph(facts, casebook);
    errors.extend(check_path(&graph, &path.entries, &question_facts(questions)));

    let character_ids: HashSet<&str> = characters.iter().map(|c| c.id.as_str()).collect();
    let location_ids: HashSet<&str> = locations.iter().map(|l| l.id.as_str()).collect();
    for entry in casebook {
        if let Some(c) = &entry.character_id {
            if !character_ids.contains(c.as_str()) {
                errors.push(format!("entry \"{}\" names unknown character \"{c}\"", entry.id));
            }
        }
        if let Some(l) = &entry.location_id {
            if !location_ids.contains(l.as_str()) {
                errors.push(format!("entry \"{}\" names unknown location \"{l}\"", entry.id));
            }
        }
    }

    for entry in casebook {
        let written = prose
            .entries
            .get(&entry.id)
            .is_some_and(|text| !text.trim().is_empty());
        if !written {
            errors.push(format!("entry \"{}\" has no prose", entry.id));
        }
    }

    errors
}
