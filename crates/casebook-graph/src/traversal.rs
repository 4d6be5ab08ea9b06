//! Forward reachability over a discovery graph
//!
//! The validator and the solver share this fixed point: starting from the
//! ungated entries and the initially known facts, repeatedly add the facts
//! revealed by reachable entries and the entries unlocked by reachable facts
//! until nothing changes.

use crate::bits::BitSet;
use crate::graph::{DiscoveryEdge, DiscoveryGraph, DiscoveryNode};
use crate::types::{ix32, EntryIx, FactIx};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::VecDeque;

/// Result of a reachability closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reach {
    /// Facts obtainable by some feasible visitation sequence
    pub facts: BitSet,
    /// Entries that become visitable at some point
    pub entries: BitSet,
}

/// Compute the forward fixed point from the graph's own starting point
#[must_use]
pub fn closure(graph: &DiscoveryGraph) -> Reach {
    closure_from(graph, graph.initial_facts())
}

/// Compute the forward fixed point with an explicit set of known facts
#[must_use]
pub fn closure_from(graph: &DiscoveryGraph, known: &BitSet) -> Reach {
    let inner = graph.inner();
    let mut facts = known.clone();
    let mut entries = BitSet::with_capacity(graph.entry_count());
    let mut queue = VecDeque::new();

    for e in graph.ungated_entries() {
        entries.insert(e.index());
        queue.push_back(graph.entry_node(e));
    }
    for f in known.iter() {
        queue.push_back(graph.fact_node(FactIx(ix32(f))));
    }

    while let Some(node) = queue.pop_front() {
        for edge in inner.edges_directed(node, Direction::Outgoing) {
            match (*edge.weight(), inner[edge.target()]) {
                (DiscoveryEdge::Reveals, DiscoveryNode::Fact(f)) => {
                    if facts.insert(f.index()) {
                        queue.push_back(edge.target());
                    }
                }
                (DiscoveryEdge::Unlocks, DiscoveryNode::Entry(e)) => {
                    if entries.insert(e.index()) {
                        queue.push_back(edge.target());
                    }
                }
                _ => {}
            }
        }
    }

    Reach { facts, entries }
}

/// `true` when `entry` may be visited while holding `known`
#[inline]
#[must_use]
pub fn is_visitable(graph: &DiscoveryGraph, entry: EntryIx, known: &BitSet) -> bool {
    !graph.is_gated(entry) || graph.requires(entry).intersects(known)
}
