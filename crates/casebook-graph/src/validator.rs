//! Discovery graph validator
//!
//! Runs every structural check and reports one message per violation, so a
//! regenerated casebook can address all of them in a single retry.

use crate::graph::{DiscoveryGraph, GraphIssue};
use crate::traversal;
use crate::types::{EntryId, ValidationResult};
use std::fmt;

/// A single structural violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A gated entry none of whose prerequisites can ever be discovered
    OrphanedGate(EntryId),
    /// An edge or seed that references a missing fact or entry
    Dangling(GraphIssue),
    /// No entry is visitable from the start
    NoStartingEntry,
    /// A fact or entry id declared more than once
    Duplicate(GraphIssue),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::OrphanedGate(id) => write!(
                f,
                "entry \"{id}\" is gated but none of its prerequisite facts can ever be discovered"
            ),
            Violation::Dangling(issue) | Violation::Duplicate(issue) => write!(f, "{issue}"),
            Violation::NoStartingEntry => {
                f.write_str("no casebook entry is visitable from the start")
            }
        }
    }
}

/// Stateless validator for discovery graphs
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryValidator;

impl DiscoveryValidator {
    /// Collect every violation, in check order
    #[must_use]
    pub fn violations(graph: &DiscoveryGraph) -> Vec<Violation> {
        let mut out = Vec::new();

        // 1. orphaned gates
        let reach = traversal::closure(graph);
        for e in graph.entries() {
            if graph.is_gated(e) && !reach.entries.contains(e.index()) {
                out.push(Violation::OrphanedGate(graph.entry_id(e).clone()));
            }
        }

        // 2. dangling references
        out.extend(
            graph
                .issues()
                .iter()
                .filter(|i| i.is_dangling())
                .cloned()
                .map(Violation::Dangling),
        );

        // 3. non-triviality
        if graph.ungated_entries().next().is_none() {
            out.push(Violation::NoStartingEntry);
        }

        out.extend(
            graph
                .issues()
                .iter()
                .filter(|i| !i.is_dangling())
                .cloned()
                .map(Violation::Duplicate),
        );

        out
    }

    /// Validate a graph into the common verdict shape
    #[must_use]
    pub fn validate(graph: &DiscoveryGraph) -> ValidationResult {
        let violations = Self::violations(graph);
        if !violations.is_empty() {
            tracing::debug!(count = violations.len(), "discovery graph rejected");
        }
        ValidationResult::from_errors(violations.iter().map(ToString::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    #[test]
    fn reports_each_violation() {
        let mut b = GraphBuilder::new();
        b.fact("F1").fact("F2");
        b.entry("A", ["F1"], ["F2"]);
        b.entry("B", ["F2"], ["F1"]);
        b.entry("C", ["ghost"], [] as [&str; 0]);
        // C is ungated, so only the two mutually gated entries are orphans
        let g = b.build();
        let v = DiscoveryValidator::violations(&g);
        assert_eq!(
            v,
            vec![
                Violation::OrphanedGate(EntryId::from("A")),
                Violation::OrphanedGate(EntryId::from("B")),
                Violation::Dangling(GraphIssue::UnknownRevealedFact {
                    entry: EntryId::from("C"),
                    fact: "ghost".into(),
                }),
            ]
        );
    }

    #[test]
    fn empty_graph_has_no_start() {
        let g = GraphBuilder::new().build();
        let result = DiscoveryValidator::validate(&g);
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["no casebook entry is visitable from the start".to_string()]);
    }
}
