//! Casebook Graph
//!
//! The fact/entry discovery graph behind a daily case:
//! - Builds the bipartite reveal/unlock graph from casebook entries
//! - Validates that every gated entry can eventually be opened
//! - Computes the exact shortest visitation path answering every question
//!
//! # Example
//!
//! ```rust
//! use casebook_graph::{GraphBuilder, DiscoveryValidator, PathSolver, QuestionFacts};
//!
//! let mut builder = GraphBuilder::new();
//! builder.fact("F1").fact("F2").fact("F3");
//! builder.entry("A", ["F1"], [] as [&str; 0]);
//! builder.entry("B", ["F2"], ["F1"]);
//! builder.entry("C", ["F3"], ["F1"]);
//! let graph = builder.build();
//!
//! assert!(DiscoveryValidator::validate(&graph).valid);
//!
//! let questions = [
//!     QuestionFacts::new("who", ["F2"]),
//!     QuestionFacts::new("why", ["F3"]),
//! ];
//! let solution = PathSolver::default().solve(&graph, &questions).unwrap();
//! assert_eq!(solution.len(), 3);
//! ```

#![warn(unreachable_pub)]

pub mod bits;
pub mod error;
pub mod graph;
pub mod solver;
pub mod traversal;
pub mod types;
pub mod validator;

pub use bits::BitSet;
pub use error::SolveError;
pub use graph::{DiscoveryEdge, DiscoveryGraph, DiscoveryNode, GraphBuilder, GraphIssue};
pub use solver::{check_path, PathSolver, QuestionFacts, Solution, SolverConfig};
pub use traversal::{closure, closure_from, is_visitable, Reach};
pub use types::{EntryId, EntryIx, FactId, FactIx, ValidationResult};
pub use validator::{DiscoveryValidator, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
