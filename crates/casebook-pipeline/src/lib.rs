//! Casebook Pipeline - daily mystery case generation
//!
//! Drives a fixed chain of stages from template selection to a stored case:
//! - Generative stages call an external generation service
//! - Retry gates validate content and regenerate with feedback
//! - The discovery graph is checked for soundness and solved for the
//!   shortest visiting order
//! - A single deadline bounds the whole run
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use casebook_pipeline::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(FixtureGenerationService::new("fixtures"));
//! let store = Arc::new(JsonFileStore::new("cases"));
//! let orchestrator = Orchestrator::new(PipelineConfig::new(), service, store);
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//! let success = orchestrator.run(date).await?;
//! println!("stored {} at {}", success.case.id, success.receipt.location);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod coherence;
pub mod config;
pub mod deadline;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod service;
pub mod stage;
pub mod state;
pub mod types;
pub mod validators;

pub use coherence::coherence_errors;
pub use config::PipelineConfig;
pub use deadline::Deadline;
pub use error::{
    ConfigError, FailureClass, FailureReason, GenerationError, PipelineFailure, StageError,
    StateError, StoreError, ValidatorFault,
};
pub use gate::{
    allowed_transitions, validate_transition, GateOutcome, GateState, IllegalTransition,
    RetryGate, MAX_RETRIES,
};
pub use orchestrator::{assemble_case, Orchestrator, OrchestratorBuilder, PipelineSuccess, Step};
pub use service::{load_case, CaseStore, FixtureGenerationService, GenerationService, JsonFileStore};
pub use stage::{
    view_for, ComputeOptimalPath, GenerativeStage, SelectTemplate, Stage, ValidateCoherence,
};
pub use state::{Feedback, PipelineState, StageKey, StageOutput, StageOutputs, StateView};
pub use types::{
    discovery_graph, question_facts, Case, CaseId, CaseReceipt, CasebookEntry, Character,
    CharacterRole, CoherenceReport, Fact, FactSheet, Location, OptimalPath, Prose, Question,
    StoryEvent, Template,
};
pub use validators::{
    CasebookValidator, CharactersValidator, EventsValidator, LocationsValidator,
    QuestionsValidator, StageValidator,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the pipeline
    pub use crate::{
        Case, CaseStore, FailureReason, FixtureGenerationService, GenerationService,
        JsonFileStore, Orchestrator, PipelineConfig, PipelineFailure, PipelineState,
        PipelineSuccess, StageKey, StageOutput, StageOutputs, StateView,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
