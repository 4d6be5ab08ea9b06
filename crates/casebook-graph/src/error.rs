//! Error types for path search

/// Optimal path search failures
///
/// None of these are content-validation failures. The first two mean the
/// casebook and the questions disagree; budget exhaustion is a resource limit
/// on an otherwise solvable search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    /// A question accepts no fact at all
    #[error("question \"{question}\" has no acceptable answer facts")]
    UnanswerableQuestion { question: String },

    /// No feasible sequence covers every question
    #[error("no feasible visitation order covers questions: {}", questions.join(", "))]
    Infeasible { questions: Vec<String> },

    /// The state budget ran out before the search completed
    #[error("search budget of {limit} states exhausted")]
    SearchBudgetExhausted { limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infeasible_lists_questions() {
        let err = SolveError::Infeasible {
            questions: vec!["q1".into(), "q2".into()],
        };
        assert_eq!(
            err.to_string(),
            "no feasible visitation order covers questions: q1, q2"
        );
    }
}
