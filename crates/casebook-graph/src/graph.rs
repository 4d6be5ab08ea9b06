//! Discovery graph construction
//!
//! A discovery graph is bipartite: entries reveal facts, facts unlock
//! entries. An entry with several unlocking facts is OR-gated; an entry with
//! none is visitable from the start.
//!
//! Graphs are assembled with [`GraphBuilder`], which never fails. Anything
//! structurally wrong (duplicate ids, edges to unknown nodes) is recorded as a
//! [`GraphIssue`] on the built graph so the validator can report every
//! problem at once.

use crate::bits::BitSet;
use crate::types::{ix32, EntryId, EntryIx, FactId, FactIx};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Node weight in the underlying petgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryNode {
    /// A discoverable fact
    Fact(FactIx),
    /// A visitable entry
    Entry(EntryIx),
}

/// Edge weight in the underlying petgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEdge {
    /// Entry -> Fact: visiting the entry yields the fact
    Reveals,
    /// Fact -> Entry: holding the fact makes the entry visitable
    Unlocks,
}

/// Structural problem found while building a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphIssue {
    /// The same fact id was declared twice
    #[error("duplicate fact id \"{0}\"")]
    DuplicateFact(FactId),
    /// The same entry id was declared twice
    #[error("duplicate entry id \"{0}\"")]
    DuplicateEntry(EntryId),
    /// An entry reveals a fact that was never declared
    #[error("entry \"{entry}\" reveals unknown fact \"{fact}\"")]
    UnknownRevealedFact { entry: EntryId, fact: FactId },
    /// A reveal edge starts at an entry that was never declared
    #[error("unknown entry \"{entry}\" reveals fact \"{fact}\"")]
    UnknownRevealingEntry { entry: EntryId, fact: FactId },
    /// An entry is gated on a fact that was never declared
    #[error("entry \"{entry}\" is unlocked by unknown fact \"{fact}\"")]
    UnknownUnlockingFact { fact: FactId, entry: EntryId },
    /// An unlock edge targets an entry that was never declared
    #[error("fact \"{fact}\" unlocks unknown entry \"{entry}\"")]
    UnknownUnlockedEntry { fact: FactId, entry: EntryId },
    /// An initially known fact was never declared
    #[error("initially known fact \"{0}\" does not exist")]
    UnknownInitialFact(FactId),
}

impl GraphIssue {
    /// `true` for issues about edges or seeds that reference missing nodes
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        !matches!(self, GraphIssue::DuplicateFact(_) | GraphIssue::DuplicateEntry(_))
    }
}

/// Builder for [`DiscoveryGraph`]
///
/// Usage:
/// ```rust
/// use casebook_graph::GraphBuilder;
///
/// let mut builder = GraphBuilder::new();
/// builder.fact("F1").fact("F2");
/// builder.entry("A", ["F1"], [] as [&str; 0]);
/// builder.entry("B", ["F2"], ["F1"]);
/// let graph = builder.build();
/// assert_eq!(graph.entry_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    facts: Vec<FactId>,
    entries: Vec<EntryId>,
    reveals: Vec<(EntryId, FactId)>,
    unlocks: Vec<(FactId, EntryId)>,
    initial_facts: Vec<FactId>,
}

impl GraphBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fact
    pub fn fact(&mut self, id: impl Into<FactId>) -> &mut Self {
        self.facts.push(id.into());
        self
    }

    /// Declare an entry with no edges
    pub fn add_entry(&mut self, id: impl Into<EntryId>) -> &mut Self {
        self.entries.push(id.into());
        self
    }

    /// Declare an entry together with the facts it reveals and the facts
    /// that unlock it
    pub fn entry<R, U>(&mut self, id: impl Into<EntryId>, reveals: R, requires_any: U) -> &mut Self
    where
        R: IntoIterator,
        R::Item: Into<FactId>,
        U: IntoIterator,
        U::Item: Into<FactId>,
    {
        let id = id.into();
        for fact in reveals {
            self.reveals.push((id.clone(), fact.into()));
        }
        for fact in requires_any {
            self.unlocks.push((fact.into(), id.clone()));
        }
        self.entries.push(id);
        self
    }

    /// Add an Entry -> Fact reveal edge
    pub fn reveal(&mut self, entry: impl Into<EntryId>, fact: impl Into<FactId>) -> &mut Self {
        self.reveals.push((entry.into(), fact.into()));
        self
    }

    /// Add a Fact -> Entry unlock edge
    pub fn unlock(&mut self, fact: impl Into<FactId>, entry: impl Into<EntryId>) -> &mut Self {
        self.unlocks.push((fact.into(), entry.into()));
        self
    }

    /// Mark a fact as known before any entry is visited
    pub fn initial_fact(&mut self, id: impl Into<FactId>) -> &mut Self {
        self.initial_facts.push(id.into());
        self
    }

    /// Build the graph, recording every structural issue
    #[must_use]
    pub fn build(self) -> DiscoveryGraph {
        let mut issues = Vec::new();

        let fact_ids = dedup_sorted(self.facts, &mut issues, GraphIssue::DuplicateFact);
        let entry_ids = dedup_sorted(self.entries, &mut issues, GraphIssue::DuplicateEntry);

        let fact_lookup: HashMap<FactId, FactIx> = fact_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), FactIx(ix32(i))))
            .collect();
        let entry_lookup: HashMap<EntryId, EntryIx> = entry_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), EntryIx(ix32(i))))
            .collect();

        let mut graph = DiGraph::with_capacity(
            fact_ids.len() + entry_ids.len(),
            self.reveals.len() + self.unlocks.len(),
        );
        let fact_nodes: Vec<NodeIndex> = (0..fact_ids.len())
            .map(|i| graph.add_node(DiscoveryNode::Fact(FactIx(ix32(i)))))
            .collect();
        let entry_nodes: Vec<NodeIndex> = (0..entry_ids.len())
            .map(|i| graph.add_node(DiscoveryNode::Entry(EntryIx(ix32(i)))))
            .collect();

        let mut reveals = vec![BitSet::with_capacity(fact_ids.len()); entry_ids.len()];
        let mut requires = vec![BitSet::with_capacity(fact_ids.len()); entry_ids.len()];
        let mut gated = BitSet::with_capacity(entry_ids.len());

        for (entry, fact) in self.reveals {
            let e = entry_lookup.get(&entry).copied();
            let f = fact_lookup.get(&fact).copied();
            if e.is_none() {
                issues.push(GraphIssue::UnknownRevealingEntry {
                    entry: entry.clone(),
                    fact: fact.clone(),
                });
            }
            if f.is_none() {
                issues.push(GraphIssue::UnknownRevealedFact { entry, fact });
            }
            if let (Some(e), Some(f)) = (e, f) {
                graph.update_edge(entry_nodes[e.index()], fact_nodes[f.index()], DiscoveryEdge::Reveals);
                reveals[e.index()].insert(f.index());
            }
        }

        for (fact, entry) in self.unlocks {
            let f = fact_lookup.get(&fact).copied();
            let e = entry_lookup.get(&entry).copied();
            // A declared prerequisite gates the entry even when it dangles.
            if let Some(e) = e {
                gated.insert(e.index());
            } else {
                issues.push(GraphIssue::UnknownUnlockedEntry {
                    fact: fact.clone(),
                    entry: entry.clone(),
                });
            }
            if f.is_none() {
                issues.push(GraphIssue::UnknownUnlockingFact { fact, entry });
            }
            if let (Some(f), Some(e)) = (f, e) {
                graph.update_edge(fact_nodes[f.index()], entry_nodes[e.index()], DiscoveryEdge::Unlocks);
                requires[e.index()].insert(f.index());
            }
        }

        let mut initial_facts = BitSet::with_capacity(fact_ids.len());
        for fact in self.initial_facts {
            match fact_lookup.get(&fact) {
                Some(f) => {
                    initial_facts.insert(f.index());
                }
                None => issues.push(GraphIssue::UnknownInitialFact(fact)),
            }
        }

        DiscoveryGraph {
            graph,
            fact_ids,
            entry_ids,
            fact_nodes,
            entry_nodes,
            fact_lookup,
            entry_lookup,
            reveals,
            requires,
            gated,
            initial_facts,
            issues,
        }
    }
}

fn dedup_sorted<T: Ord + Clone>(
    items: Vec<T>,
    issues: &mut Vec<GraphIssue>,
    duplicate: impl Fn(T) -> GraphIssue,
) -> Vec<T> {
    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item.clone()) {
            issues.push(duplicate(item));
        }
    }
    seen.into_iter().collect()
}

/// Built, immutable discovery graph
///
/// Facts and entries are indexed densely in identifier order. Alongside the
/// petgraph storage the graph keeps per-entry reveal and prerequisite sets,
/// which the solver reads on every transition.
#[derive(Debug, Clone)]
pub struct DiscoveryGraph {
    graph: DiGraph<DiscoveryNode, DiscoveryEdge>,
    fact_ids: Vec<FactId>,
    entry_ids: Vec<EntryId>,
    fact_nodes: Vec<NodeIndex>,
    entry_nodes: Vec<NodeIndex>,
    fact_lookup: HashMap<FactId, FactIx>,
    entry_lookup: HashMap<EntryId, EntryIx>,
    reveals: Vec<BitSet>,
    requires: Vec<BitSet>,
    gated: BitSet,
    initial_facts: BitSet,
    issues: Vec<GraphIssue>,
}

impl DiscoveryGraph {
    /// Start a new builder
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Number of distinct facts
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.fact_ids.len()
    }

    /// Number of distinct entries
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_ids.len()
    }

    /// Identifier of a fact index
    #[must_use]
    pub fn fact_id(&self, ix: FactIx) -> &FactId {
        &self.fact_ids[ix.index()]
    }

    /// Identifier of an entry index
    #[must_use]
    pub fn entry_id(&self, ix: EntryIx) -> &EntryId {
        &self.entry_ids[ix.index()]
    }

    /// Index of a fact id, if declared
    #[must_use]
    pub fn fact_ix(&self, id: &FactId) -> Option<FactIx> {
        self.fact_lookup.get(id).copied()
    }

    /// Index of an entry id, if declared
    #[must_use]
    pub fn entry_ix(&self, id: &EntryId) -> Option<EntryIx> {
        self.entry_lookup.get(id).copied()
    }

    /// All entry indices in identifier order
    pub fn entries(&self) -> impl Iterator<Item = EntryIx> + '_ {
        (0..self.entry_ids.len()).map(|i| EntryIx(ix32(i)))
    }

    /// Facts revealed by an entry
    #[must_use]
    pub fn reveals(&self, entry: EntryIx) -> &BitSet {
        &self.reveals[entry.index()]
    }

    /// Facts of which any one unlocks an entry
    #[must_use]
    pub fn requires(&self, entry: EntryIx) -> &BitSet {
        &self.requires[entry.index()]
    }

    /// `true` when the entry declares at least one prerequisite
    #[must_use]
    pub fn is_gated(&self, entry: EntryIx) -> bool {
        self.gated.contains(entry.index())
    }

    /// Entries visitable from the start
    pub fn ungated_entries(&self) -> impl Iterator<Item = EntryIx> + '_ {
        self.entries().filter(|e| !self.is_gated(*e))
    }

    /// Facts known before any entry is visited
    #[must_use]
    pub fn initial_facts(&self) -> &BitSet {
        &self.initial_facts
    }

    /// Entries revealing a given fact
    pub fn revealed_by(&self, fact: FactIx) -> impl Iterator<Item = EntryIx> + '_ {
        self.graph
            .neighbors_directed(self.fact_nodes[fact.index()], Direction::Incoming)
            .filter_map(|n| match self.graph[n] {
                DiscoveryNode::Entry(e) => Some(e),
                DiscoveryNode::Fact(_) => None,
            })
    }

    /// Structural issues recorded while building
    #[must_use]
    pub fn issues(&self) -> &[GraphIssue] {
        &self.issues
    }

    /// Underlying petgraph storage
    #[must_use]
    pub fn inner(&self) -> &DiGraph<DiscoveryNode, DiscoveryEdge> {
        &self.graph
    }

    pub(crate) fn fact_node(&self, fact: FactIx) -> NodeIndex {
        self.fact_nodes[fact.index()]
    }

    pub(crate) fn entry_node(&self, entry: EntryIx) -> NodeIndex {
        self.entry_nodes[entry.index()]
    }

    /// Resolve a list of fact ids into a set, skipping unknown ids
    #[must_use]
    pub fn fact_set<'a>(&self, ids: impl IntoIterator<Item = &'a FactId>) -> BitSet {
        let mut set = BitSet::with_capacity(self.fact_count());
        for f in ids.into_iter().filter_map(|id| self.fact_ix(id)) {
            set.insert(f.index());
        }
        set
    }
}
