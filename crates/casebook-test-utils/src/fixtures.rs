//! "The Lighthouse Ledger": a small case that passes every stage
//!
//! The keeper's ledger has gone missing (introduction fact). The shortest
//! investigation is the quay, where a boot print opens the captain's
//! interview.

use std::path::Path;

use casebook_pipeline::{PipelineState, StageKey, StageOutput};
use chrono::NaiveDate;
use serde_json::{json, Value};

/// Shortest visiting order of the sample case
pub const OPTIMAL_PATH: [&str; 2] = ["quay_visit", "captain_interview"];

/// Run date used throughout the tests
pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

pub fn template() -> Value {
    json!({
        "id": "lighthouse",
        "title": "The Lighthouse Ledger",
        "setting": "A storm-bound lighthouse on a rocky island",
        "premise": "The keeper is found unconscious and his ledger is gone."
    })
}

pub fn events() -> Value {
    json!([
        {
            "id": "e_quarrel",
            "time": "18:00",
            "description": "The keeper quarrels with the supply captain over a debt",
            "participants": ["keeper", "captain"],
            "causes": ["e_theft"]
        },
        {
            "id": "e_theft",
            "time": "22:30",
            "description": "The ledger recording the debt disappears",
            "participants": ["captain"],
            "causes": ["e_attack"]
        },
        {
            "id": "e_attack",
            "time": "23:10",
            "description": "The keeper is struck in the lamp room",
            "participants": ["keeper", "captain"]
        }
    ])
}

pub fn characters() -> Value {
    json!([
        {"id": "keeper", "name": "Elias Thorne", "role": "victim"},
        {"id": "captain", "name": "Captain Mara Voss", "role": "culprit"},
        {"id": "assistant", "name": "Jonah Pike", "role": "suspect"}
    ])
}

pub fn locations() -> Value {
    json!([
        {"id": "cottage", "name": "Keeper's Cottage"},
        {"id": "quay", "name": "The Quay"},
        {"id": "lamp_room", "name": "Lamp Room"}
    ])
}

pub fn facts() -> Value {
    json!({
        "facts": [
            {"id": "f_ledger_gone", "statement": "The keeper's ledger is missing"},
            {"id": "f_quarrel", "statement": "The keeper and the captain argued that evening"},
            {"id": "f_boot_print", "statement": "A sea boot print leads from the quay to the tower"},
            {"id": "f_captain_debt", "statement": "The captain owed the keeper a large sum"},
            {"id": "f_tide_table", "statement": "The tide allowed a landing only after ten"},
            {"id": "f_red_herring", "statement": "The assistant once sold lamp oil on the side"}
        ],
        "introduction": ["f_ledger_gone"]
    })
}

pub fn casebook() -> Value {
    json!([
        {
            "id": "cottage_visit",
            "title": "Search the cottage",
            "location_id": "cottage",
            "reveals": ["f_quarrel"]
        },
        {
            "id": "quay_visit",
            "title": "Walk the quay",
            "location_id": "quay",
            "reveals": ["f_boot_print"]
        },
        {
            "id": "captain_interview",
            "title": "Question the captain",
            "character_id": "captain",
            "reveals": ["f_captain_debt"],
            "requires_any": ["f_quarrel", "f_boot_print"]
        },
        {
            "id": "lamp_room_search",
            "title": "Search the lamp room",
            "location_id": "lamp_room",
            "reveals": ["f_tide_table"],
            "requires_any": ["f_ledger_gone"]
        }
    ])
}

pub fn prose() -> Value {
    json!({
        "introduction": "Storm lanterns swing as you step off the boat. The ledger is gone.",
        "entries": {
            "cottage_visit": "Broken crockery and a half-written letter about money.",
            "quay_visit": "Wet boot prints, too large for the assistant.",
            "captain_interview": "Voss admits the debt, then refuses to say more.",
            "lamp_room_search": "A tide table is pinned above the lens."
        }
    })
}

pub fn questions() -> Value {
    json!([
        {
            "id": "q_culprit",
            "text": "Who struck the keeper?",
            "answer_facts": ["f_captain_debt"],
            "points": 2
        },
        {
            "id": "q_method",
            "text": "How did the attacker reach the tower?",
            "answer_facts": ["f_boot_print", "f_tide_table"]
        }
    ])
}

/// Generation stage name with its payload, in pipeline order
pub fn payloads() -> Vec<(&'static str, Value)> {
    vec![
        ("select_template", template()),
        ("generate_events", events()),
        ("populate_characters", characters()),
        ("build_locations", locations()),
        ("distribute_facts", facts()),
        ("design_casebook", casebook()),
        ("generate_prose", prose()),
        ("create_questions", questions()),
    ]
}

/// Payload of the sample case for `key`, for keys produced by generation
pub fn payload(key: StageKey) -> Option<Value> {
    Some(match key {
        StageKey::Template => template(),
        StageKey::Events => events(),
        StageKey::Characters => characters(),
        StageKey::Locations => locations(),
        StageKey::Facts => facts(),
        StageKey::Casebook => casebook(),
        StageKey::Prose => prose(),
        StageKey::Questions => questions(),
        StageKey::OptimalPath | StageKey::Coherence => return None,
    })
}

/// State holding the sample outputs for every key in `keys`
pub fn state_with(keys: &[StageKey]) -> PipelineState {
    let mut state = PipelineState::new(date());
    for key in keys {
        let output = match key {
            StageKey::OptimalPath => StageOutput::OptimalPath(casebook_pipeline::OptimalPath {
                entries: OPTIMAL_PATH.iter().map(|id| (*id).into()).collect(),
                states_explored: 0,
            }),
            other => StageOutput::decode(*other, payload(*other).unwrap()).unwrap(),
        };
        state = state.with_output(output).unwrap();
    }
    state
}

/// State holding every output up to and including the optimal path
pub fn complete_state() -> PipelineState {
    state_with(&[
        StageKey::Template,
        StageKey::Events,
        StageKey::Characters,
        StageKey::Locations,
        StageKey::Facts,
        StageKey::Casebook,
        StageKey::Prose,
        StageKey::Questions,
        StageKey::OptimalPath,
    ])
}

/// Write every payload as `<dir>/<stage>.json`
pub fn write_fixture_dir(dir: &Path) -> std::io::Result<()> {
    for (stage, payload) in payloads() {
        let body = serde_json::to_vec_pretty(&payload)?;
        std::fs::write(dir.join(format!("{stage}.json")), body)?;
    }
    Ok(())
}
