use casebook_graph::{DiscoveryValidator, EntryId, GraphBuilder, GraphIssue, Violation};
use proptest::prelude::*;

const NONE: [&str; 0] = [];

#[test]
fn sound_graph_is_valid() {
    let mut b = GraphBuilder::new();
    b.fact("F1").fact("F2").fact("F3");
    b.entry("A", ["F1"], NONE);
    b.entry("B", ["F2"], ["F1"]);
    b.entry("C", ["F3"], ["F2"]);
    let result = DiscoveryValidator::validate(&b.build());
    assert!(result.valid, "{:?}", result.errors);
    assert!(result.errors.is_empty());
}

#[test]
fn entry_gated_only_on_its_own_fact_is_orphaned() {
    let mut b = GraphBuilder::new();
    b.fact("F1").fact("secret");
    b.entry("A", ["F1"], NONE);
    b.entry("safe", ["secret"], ["secret"]);
    let result = DiscoveryValidator::validate(&b.build());

    assert!(!result.valid);
    assert_eq!(
        result.errors,
        vec!["entry \"safe\" is gated but none of its prerequisite facts can ever be discovered".to_string()]
    );
}

#[test]
fn or_gate_needs_only_one_reachable_prerequisite() {
    let mut b = GraphBuilder::new();
    b.fact("F1").fact("never");
    b.entry("A", ["F1"], NONE);
    b.entry("B", NONE, ["never", "F1"]);
    assert!(DiscoveryValidator::validate(&b.build()).valid);
}

#[test]
fn reports_every_dangling_reference_individually() {
    let mut b = GraphBuilder::new();
    b.fact("F1");
    b.entry("A", ["F1", "gone1", "gone2"], NONE);
    b.reveal("phantom", "F1");
    b.unlock("F1", "nowhere");
    let violations = DiscoveryValidator::violations(&b.build());

    let dangling: Vec<_> = violations
        .iter()
        .filter(|v| matches!(v, Violation::Dangling(_)))
        .collect();
    assert_eq!(dangling.len(), 4);
    assert!(violations.contains(&Violation::Dangling(GraphIssue::UnknownRevealingEntry {
        entry: EntryId::from("phantom"),
        fact: "F1".into(),
    })));
}

#[test]
fn graph_without_starting_entry_fails_non_triviality() {
    let mut b = GraphBuilder::new();
    b.fact("F1");
    b.entry("A", ["F1"], ["F1"]);
    let violations = DiscoveryValidator::violations(&b.build());
    assert!(violations.contains(&Violation::NoStartingEntry));
    assert!(violations.contains(&Violation::OrphanedGate(EntryId::from("A"))));
}

#[test]
fn all_violations_are_reported_together() {
    let mut b = GraphBuilder::new();
    b.fact("F1").fact("F1");
    b.entry("A", ["F1"], ["F1"]);
    b.entry("B", ["ghost"], ["F1"]);
    let result = DiscoveryValidator::validate(&b.build());
    // two orphans, one dangling fact, no start, one duplicate
    assert_eq!(result.errors.len(), 5);
}

fn arb_graph() -> impl Strategy<Value = Vec<(Vec<usize>, Vec<usize>)>> {
    prop::collection::vec(
        (
            prop::collection::vec(0..6usize, 0..3),
            prop::collection::vec(0..6usize, 0..3),
        ),
        1..8,
    )
}

/// Naive simulation: keep visiting anything visitable until stuck.
fn visitable_by_simulation(shape: &[(Vec<usize>, Vec<usize>)]) -> Vec<bool> {
    let mut known = [false; 6];
    let mut visited = vec![false; shape.len()];
    loop {
        let mut progressed = false;
        for (i, (reveals, requires)) in shape.iter().enumerate() {
            if visited[i] {
                continue;
            }
            if requires.is_empty() || requires.iter().any(|f| known[*f]) {
                visited[i] = true;
                progressed = true;
                for f in reveals {
                    known[*f] = true;
                }
            }
        }
        if !progressed {
            return visited;
        }
    }
}

proptest! {
    #[test]
    fn prop_orphans_match_simulation(shape in arb_graph()) {
        let mut b = GraphBuilder::new();
        for f in 0..6 {
            b.fact(format!("F{f}"));
        }
        for (i, (reveals, requires)) in shape.iter().enumerate() {
            b.entry(
                format!("E{i}"),
                reveals.iter().map(|f| format!("F{f}")),
                requires.iter().map(|f| format!("F{f}")),
            );
        }
        let violations = DiscoveryValidator::violations(&b.build());
        let reached = visitable_by_simulation(&shape);

        for (i, ok) in reached.iter().enumerate() {
            let orphan = Violation::OrphanedGate(EntryId::new(format!("E{i}")));
            prop_assert_eq!(violations.contains(&orphan), !ok);
        }

        let valid = violations.is_empty();
        if valid {
            prop_assert!(reached.iter().all(|r| *r));
        }
    }
}
