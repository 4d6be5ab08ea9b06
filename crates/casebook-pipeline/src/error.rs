//! Error types for the casebook pipeline
//!
//! Failures fall into three classes:
//! - Content validation: a gated stage ran out of attempts
//! - Structural: the finished parts of the case disagree with each other
//! - Infrastructure: a collaborator broke, or the deadline passed

use std::path::PathBuf;

use casebook_graph::SolveError;
use serde::{Deserialize, Serialize};

use crate::state::{PipelineState, StageKey};

/// Stable name of a terminal pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    EventsInvalid,
    CharactersInvalid,
    LocationsInvalid,
    DiscoveryGraphInvalid,
    QuestionsInvalid,
    OptimalPathInfeasible,
    CoherenceInvalid,
    Timeout,
    InfrastructureFault,
}

/// Coarse failure class, used for alerting and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    ContentValidation,
    Structural,
    Infrastructure,
}

impl FailureReason {
    /// Stable identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventsInvalid => "EventsInvalid",
            Self::CharactersInvalid => "CharactersInvalid",
            Self::LocationsInvalid => "LocationsInvalid",
            Self::DiscoveryGraphInvalid => "DiscoveryGraphInvalid",
            Self::QuestionsInvalid => "QuestionsInvalid",
            Self::OptimalPathInfeasible => "OptimalPathInfeasible",
            Self::CoherenceInvalid => "CoherenceInvalid",
            Self::Timeout => "Timeout",
            Self::InfrastructureFault => "InfrastructureFault",
        }
    }

    /// Class of this failure
    #[must_use]
    pub const fn class(self) -> FailureClass {
        match self {
            Self::EventsInvalid
            | Self::CharactersInvalid
            | Self::LocationsInvalid
            | Self::DiscoveryGraphInvalid
            | Self::QuestionsInvalid => FailureClass::ContentValidation,
            Self::OptimalPathInfeasible | Self::CoherenceInvalid => FailureClass::Structural,
            Self::Timeout | Self::InfrastructureFault => FailureClass::Infrastructure,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a failed run
///
/// Carries everything gathered so far so the run can be inspected offline.
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed at {stage} ({reason}): {}", errors.join("; "))]
pub struct PipelineFailure {
    /// Stable failure name
    pub reason: FailureReason,
    /// Name of the step that failed
    pub stage: &'static str,
    /// Every error message behind the failure
    pub errors: Vec<String>,
    /// State accumulated up to the failure
    pub state: Box<PipelineState>,
}

impl PipelineFailure {
    /// Create a failure carrying `state`
    #[must_use]
    pub fn new(
        reason: FailureReason,
        stage: &'static str,
        errors: Vec<String>,
        state: PipelineState,
    ) -> Self {
        Self {
            reason,
            stage,
            errors,
            state: Box::new(state),
        }
    }

    /// Class of the failure reason
    #[inline]
    #[must_use]
    pub fn class(&self) -> FailureClass {
        self.reason.class()
    }
}

/// Generation service errors
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Service unreachable or returned a server-side error
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    /// Service refused the request
    #[error("generation request rejected: {0}")]
    Rejected(String),

    /// No fixture file for the stage
    #[error("no fixture for stage {stage} at {}", path.display())]
    MissingFixture { stage: String, path: PathBuf },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body was not JSON at all
    #[error("invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// A validator crashed instead of returning a verdict
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validator for {stage} failed: {message}")]
pub struct ValidatorFault {
    pub stage: StageKey,
    pub message: String,
}

impl ValidatorFault {
    /// Create a fault for `stage`
    #[must_use]
    pub fn new(stage: StageKey, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Case storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A case is already stored for the date
    #[error("a case is already stored at {0}")]
    AlreadyExists(String),

    /// Backend refused the write
    #[error("storage backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a single stage invocation
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The generation service failed
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The service answered with a payload that does not decode
    #[error("malformed {stage} payload: {message}")]
    Malformed { stage: StageKey, message: String },

    /// The view lacks a declared input
    #[error("missing inputs for {stage}: {missing:?}")]
    MissingInput {
        stage: &'static str,
        missing: Vec<StageKey>,
    },

    /// Optimal path search failed
    #[error("optimal path: {0}")]
    Path(#[from] SolveError),

    /// Cross-stage checks failed
    #[error("case is incoherent: {}", .0.join("; "))]
    Incoherent(Vec<String>),

    /// Background task died
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Reason reported when this error ends the run
    #[must_use]
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Path(SolveError::SearchBudgetExhausted { .. }) => {
                FailureReason::InfrastructureFault
            }
            Self::Path(_) => FailureReason::OptimalPathInfeasible,
            Self::Incoherent(_) => FailureReason::CoherenceInvalid,
            Self::Generation(_)
            | Self::Malformed { .. }
            | Self::MissingInput { .. }
            | Self::Internal(_) => FailureReason::InfrastructureFault,
        }
    }

    /// Individual error messages
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Incoherent(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Writing to the pipeline state failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Outputs are write-once
    #[error("stage output {0} is already recorded")]
    AlreadyWritten(StageKey),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::config::PipelineConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}
