//! Optimal visitation path search
//!
//! Finds the shortest feasible sequence of entries whose revealed facts
//! answer every question. Path length feeds player scoring, so the search is
//! exact: a layered breadth-first search over discovered-fact sets.
//!
//! # Search
//!
//! Only *relevant* facts take part: answer facts of some question and
//! prerequisites of some reachable entry. Visitability and coverage depend on
//! nothing else, so every entry's reveals and every search state are projected
//! onto that set, and an entry revealing nothing relevant is never tried.
//!
//! Layer `d` holds every distinct fact set reachable in exactly `d` visits,
//! each paired with the lexicographically smallest entry sequence reaching
//! it. A transition visits an entry that is currently visitable and reveals
//! at least one new fact; an entry that adds nothing never shortens a path.
//! A fact set contained in one already reached at a smaller depth is pruned,
//! since the earlier set can finish everything it can in fewer visits.
//!
//! A greedy walk supplies an upper bound on the path length before the search
//! starts. A state at depth `d` whose lower bound on remaining visits pushes it
//! past that ceiling is dropped. The lower bound is the number of unanswered
//! questions divided by the most questions any single entry can answer.
//!
//! The first layer containing a covering set is optimal. Among its covering
//! sets the smallest sequence wins, which makes the answer the
//! lexicographically smallest minimum-length path by entry identifier.
//!
//! Layer expansion runs on rayon when enabled. Children are merged in
//! frontier order and ties resolve by sequence comparison, so parallel and
//! serial runs return the same path.

use crate::bits::BitSet;
use crate::error::SolveError;
use crate::graph::DiscoveryGraph;
use crate::traversal;
use crate::types::{EntryId, EntryIx, FactId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// Earlier layers are scanned for supersets only while they stay this small;
/// beyond it only exact repeats are pruned.
const DOMINANCE_SCAN_LIMIT: usize = 4096;

/// A question, reduced to the facts that answer it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFacts {
    /// Question identifier
    pub id: String,
    /// Discovering any one of these answers the question
    pub answers: Vec<FactId>,
}

impl QuestionFacts {
    /// Create a new question requirement
    pub fn new<I>(id: impl Into<String>, answers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FactId>,
    {
        Self {
            id: id.into(),
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Solver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of distinct states expanded before giving up
    pub max_states: usize,
    /// Expand each layer on the rayon pool
    pub parallel: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_states: 250_000,
            parallel: true,
        }
    }
}

/// A solved path with search statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    /// Entries in visiting order
    pub path: Vec<EntryId>,
    /// Distinct search states generated
    pub states_explored: usize,
}

impl Solution {
    /// Number of visits in the path
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// `true` when the questions were answered before any visit
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Node {
    facts: BitSet,
    path: Vec<EntryIx>,
}

/// A reachable entry with its reveals projected onto the relevant facts
#[derive(Debug, Clone)]
struct Move {
    entry: EntryIx,
    gain: BitSet,
}

/// Question answer sets plus the admissible remaining-visits estimate
struct Goal {
    targets: Vec<BitSet>,
    /// Most questions a single visit can newly answer
    per_visit: usize,
}

impl Goal {
    fn new(targets: Vec<BitSet>, moves: &[Move]) -> Self {
        let per_visit = moves
            .iter()
            .map(|m| targets.iter().filter(|t| t.intersects(&m.gain)).count())
            .max()
            .unwrap_or(0);
        Self { targets, per_visit }
    }

    fn covers(&self, facts: &BitSet) -> bool {
        self.targets.iter().all(|t| t.intersects(facts))
    }

    fn unanswered(&self, facts: &BitSet) -> usize {
        self.targets.iter().filter(|t| !t.intersects(facts)).count()
    }

    /// Visits still needed from `facts`, never overestimated
    fn remaining(&self, facts: &BitSet) -> usize {
        let open = self.unanswered(facts);
        if open == 0 || self.per_visit == 0 {
            open.min(1)
        } else {
            open.div_ceil(self.per_visit)
        }
    }
}

/// Exact optimal path solver
#[derive(Debug, Clone, Default)]
pub struct PathSolver {
    config: SolverConfig,
}

impl PathSolver {
    /// Create a solver with the given configuration
    #[inline]
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find the minimum-length feasible path covering every question
    ///
    /// # Errors
    /// - [`SolveError::UnanswerableQuestion`] for a question with no answers
    /// - [`SolveError::Infeasible`] when some question can never be answered
    /// - [`SolveError::SearchBudgetExhausted`] when the state cap is hit
    pub fn solve(
        &self,
        graph: &DiscoveryGraph,
        questions: &[QuestionFacts],
    ) -> Result<Solution, SolveError> {
        if let Some(q) = questions.iter().find(|q| q.answers.is_empty()) {
            return Err(SolveError::UnanswerableQuestion {
                question: q.id.clone(),
            });
        }

        let targets: Vec<BitSet> = questions
            .iter()
            .map(|q| graph.fact_set(&q.answers))
            .collect();

        let reach = traversal::closure(graph);
        let unreachable = uncovered(questions, &targets, &reach.facts);
        if !unreachable.is_empty() {
            tracing::debug!(questions = ?unreachable, "answer facts unreachable");
            return Err(SolveError::Infeasible {
                questions: unreachable,
            });
        }

        let relevant = relevant_facts(graph, &targets, &reach.entries);
        let moves: Vec<Move> = graph
            .entries()
            .filter(|e| reach.entries.contains(e.index()))
            .filter_map(|entry| {
                let gain = graph.reveals(entry).intersection(&relevant);
                (!gain.is_empty()).then_some(Move { entry, gain })
            })
            .collect();
        let goal = Goal::new(targets, &moves);

        let start = Node {
            facts: graph.initial_facts().intersection(&relevant),
            path: Vec::new(),
        };
        if goal.covers(&start.facts) {
            return Ok(Solution {
                path: Vec::new(),
                states_explored: 1,
            });
        }

        let ceiling = greedy_length(graph, &goal, &moves, &start.facts);
        tracing::debug!(
            relevant = relevant.len(),
            moves = moves.len(),
            ceiling = ?ceiling,
            "search prepared"
        );

        let mut earlier: Vec<BitSet> = vec![start.facts.clone()];
        let mut seen: HashSet<BitSet> = earlier.iter().cloned().collect();
        let mut frontier = vec![start];
        let mut explored = 1usize;
        let mut depth = 0usize;

        while !frontier.is_empty() {
            depth += 1;
            let children: Vec<Vec<Node>> = if self.config.parallel {
                frontier
                    .par_iter()
                    .map(|n| expand(graph, &moves, n))
                    .collect()
            } else {
                frontier.iter().map(|n| expand(graph, &moves, n)).collect()
            };

            let scan_supersets = earlier.len() <= DOMINANCE_SCAN_LIMIT;
            let mut next: Vec<Node> = Vec::new();
            let mut slots: HashMap<BitSet, usize> = HashMap::new();
            for child in children.into_iter().flatten() {
                if seen.contains(&child.facts) {
                    continue;
                }
                if ceiling.is_some_and(|limit| depth + goal.remaining(&child.facts) > limit) {
                    continue;
                }
                if scan_supersets && earlier.iter().any(|s| child.facts.is_subset(s)) {
                    continue;
                }
                match slots.get(&child.facts) {
                    Some(&i) => {
                        if child.path < next[i].path {
                            next[i] = child;
                        }
                    }
                    None => {
                        slots.insert(child.facts.clone(), next.len());
                        next.push(child);
                    }
                }
            }

            explored += next.len();
            tracing::debug!(depth, layer = next.len(), explored, "expanded search layer");

            if let Some(best) = next
                .iter()
                .filter(|n| goal.covers(&n.facts))
                .min_by(|a, b| a.path.cmp(&b.path))
            {
                let path: Vec<EntryId> =
                    best.path.iter().map(|e| graph.entry_id(*e).clone()).collect();
                tracing::info!(length = path.len(), explored, "optimal path found");
                return Ok(Solution {
                    path,
                    states_explored: explored,
                });
            }

            if explored > self.config.max_states {
                return Err(SolveError::SearchBudgetExhausted {
                    limit: self.config.max_states,
                });
            }

            for n in &next {
                seen.insert(n.facts.clone());
                earlier.push(n.facts.clone());
            }
            frontier = next;
        }

        Err(SolveError::Infeasible {
            questions: uncovered(questions, &goal.targets, &reach.facts),
        })
    }
}

/// Answer facts of every question plus prerequisites of reachable entries
fn relevant_facts(graph: &DiscoveryGraph, targets: &[BitSet], reachable: &BitSet) -> BitSet {
    let mut relevant = BitSet::default();
    for t in targets {
        relevant.union_with(t);
    }
    for e in graph.entries().filter(|e| reachable.contains(e.index())) {
        relevant.union_with(graph.requires(e));
    }
    relevant
}

/// Length of a feasible covering path picked greedily, if the walk finds one
fn greedy_length(
    graph: &DiscoveryGraph,
    goal: &Goal,
    moves: &[Move],
    start: &BitSet,
) -> Option<usize> {
    let mut known = start.clone();
    let mut steps = 0usize;
    while !goal.covers(&known) {
        let best = moves
            .iter()
            .filter(|m| known.adds_to(&m.gain))
            .filter(|m| traversal::is_visitable(graph, m.entry, &known))
            .max_by_key(|m| {
                let answered = goal
                    .targets
                    .iter()
                    .filter(|t| !t.intersects(&known) && t.intersects(&m.gain))
                    .count();
                let fresh = m.gain.iter().filter(|f| !known.contains(*f)).count();
                (answered, fresh, Reverse(m.entry.index()))
            })?;
        known.union_with(&best.gain);
        steps += 1;
    }
    Some(steps)
}

fn expand(graph: &DiscoveryGraph, moves: &[Move], node: &Node) -> Vec<Node> {
    moves
        .iter()
        .filter(|m| node.facts.adds_to(&m.gain))
        .filter(|m| traversal::is_visitable(graph, m.entry, &node.facts))
        .map(|m| {
            let mut facts = node.facts.clone();
            facts.union_with(&m.gain);
            let mut path = node.path.clone();
            path.push(m.entry);
            Node { facts, path }
        })
        .collect()
}

fn uncovered(questions: &[QuestionFacts], targets: &[BitSet], facts: &BitSet) -> Vec<String> {
    questions
        .iter()
        .zip(targets)
        .filter(|(_, t)| !t.intersects(facts))
        .map(|(q, _)| q.id.clone())
        .collect()
}

/// Check a proposed path against feasibility and coverage
///
/// Returns one message per problem; an empty list means the path is
/// feasible and answers every question. Minimality is not checked.
#[must_use]
pub fn check_path(
    graph: &DiscoveryGraph,
    path: &[EntryId],
    questions: &[QuestionFacts],
) -> Vec<String> {
    let mut errors = Vec::new();
    let mut known = graph.initial_facts().clone();
    let mut visited = HashSet::new();

    for (step, id) in path.iter().enumerate() {
        let Some(e) = graph.entry_ix(id) else {
            errors.push(format!("path step {step} names unknown entry \"{id}\""));
            continue;
        };
        if !visited.insert(e) {
            errors.push(format!("path step {step} revisits entry \"{id}\""));
            continue;
        }
        if !traversal::is_visitable(graph, e, &known) {
            errors.push(format!(
                "path step {step} visits \"{id}\" before any of its prerequisites"
            ));
        }
        known.union_with(graph.reveals(e));
    }

    for q in questions {
        if !graph.fact_set(&q.answers).intersects(&known) {
            errors.push(format!("path leaves question \"{}\" unanswered", q.id));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use pretty_assertions::assert_eq;

    fn ids(path: &[EntryId]) -> Vec<&str> {
        path.iter().map(EntryId::as_str).collect()
    }

    #[test]
    fn prefers_single_entry_revealing_both_answers() {
        let mut b = GraphBuilder::new();
        b.fact("F1").fact("F2");
        b.entry("A", ["F1"], [] as [&str; 0]);
        b.entry("B", ["F2"], [] as [&str; 0]);
        b.entry("C", ["F1", "F2"], [] as [&str; 0]);
        let g = b.build();
        let qs = [QuestionFacts::new("q1", ["F1"]), QuestionFacts::new("q2", ["F2"])];

        let s = PathSolver::default().solve(&g, &qs).unwrap();
        assert_eq!(ids(&s.path), vec!["C"]);
    }

    #[test]
    fn or_set_answers_pick_cheapest_alternative() {
        let mut b = GraphBuilder::new();
        b.fact("near").fact("far").fact("key");
        b.entry("door", ["key"], [] as [&str; 0]);
        b.entry("vault", ["far"], ["key"]);
        b.entry("desk", ["near"], [] as [&str; 0]);
        let g = b.build();
        let qs = [QuestionFacts::new("q", ["far", "near"])];

        let s = PathSolver::default().solve(&g, &qs).unwrap();
        assert_eq!(ids(&s.path), vec!["desk"]);
    }

    #[test]
    fn initial_facts_can_unlock_and_answer() {
        let mut b = GraphBuilder::new();
        b.fact("intro").fact("F");
        b.entry("G", ["F"], ["intro"]);
        b.initial_fact("intro");
        let g = b.build();

        let s = PathSolver::default()
            .solve(&g, &[QuestionFacts::new("q", ["F"])])
            .unwrap();
        assert_eq!(ids(&s.path), vec!["G"]);

        let none = PathSolver::default()
            .solve(&g, &[QuestionFacts::new("q", ["intro"])])
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn empty_answer_set_is_rejected() {
        let g = GraphBuilder::new().build();
        let err = PathSolver::default()
            .solve(&g, &[QuestionFacts::new("q", [] as [&str; 0])])
            .unwrap_err();
        assert_eq!(
            err,
            SolveError::UnanswerableQuestion {
                question: "q".into()
            }
        );
    }

    #[test]
    fn budget_is_enforced() {
        let mut b = GraphBuilder::new();
        for i in 0..6 {
            let f = format!("F{i}");
            b.fact(f.as_str());
            b.entry(format!("E{i}"), [f.as_str()], [] as [&str; 0]);
        }
        let g = b.build();
        let qs: Vec<_> = (0..6)
            .map(|i| QuestionFacts::new(format!("q{i}"), [format!("F{i}")]))
            .collect();
        let solver = PathSolver::new(SolverConfig {
            max_states: 3,
            parallel: false,
        });
        assert_eq!(
            solver.solve(&g, &qs).unwrap_err(),
            SolveError::SearchBudgetExhausted { limit: 3 }
        );
    }

    #[test]
    fn check_path_reports_problems() {
        let mut b = GraphBuilder::new();
        b.fact("F1").fact("F2");
        b.entry("A", ["F1"], [] as [&str; 0]);
        b.entry("B", ["F2"], ["F1"]);
        let g = b.build();
        let qs = [QuestionFacts::new("q", ["F2"])];

        assert!(check_path(&g, &[EntryId::from("A"), EntryId::from("B")], &qs).is_empty());
        let errors = check_path(&g, &[EntryId::from("B"), EntryId::from("X")], &qs);
        assert_eq!(
            errors,
            vec![
                "path step 0 visits \"B\" before any of its prerequisites".to_string(),
                "path step 1 names unknown entry \"X\"".to_string(),
            ]
        );
    }
}
