//! Pipeline orchestrator
//!
//! Runs the fixed chain of plain and gated stages against one deadline,
//! assembles the [`Case`] and stores it exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::deadline::Deadline;
use crate::error::{FailureReason, PipelineFailure};
use crate::gate::{record, RetryGate};
use crate::service::{CaseStore, GenerationService};
use crate::stage::{
    view_for, ComputeOptimalPath, GenerativeStage, SelectTemplate, Stage, ValidateCoherence,
};
use crate::state::{PipelineState, StageKey, StageOutputs};
use crate::types::{Case, CaseId, CaseReceipt};
use crate::validators::{
    CasebookValidator, CharactersValidator, EventsValidator, LocationsValidator,
    QuestionsValidator, StageValidator,
};

const ASSEMBLE: &str = "assemble_case";
const STORE: &str = "store_case";

/// One link of the chain
pub enum Step {
    /// Runs once; any error ends the run
    Plain(Arc<dyn Stage>),
    /// Generate and validate with retries
    Gated(RetryGate),
}

impl Step {
    /// Step name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain(stage) => stage.name(),
            Self::Gated(gate) => gate.stage().name(),
        }
    }

    /// Whether the step is wrapped in a retry gate
    #[must_use]
    pub fn is_gated(&self) -> bool {
        matches!(self, Self::Gated(_))
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineSuccess {
    /// The stored case
    pub case: Case,
    /// Where storage put it
    pub receipt: CaseReceipt,
}

/// Builds an [`Orchestrator`], optionally replacing default validators
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    service: Arc<dyn GenerationService>,
    store: Arc<dyn CaseStore>,
    validators: HashMap<StageKey, Arc<dyn StageValidator>>,
}

impl OrchestratorBuilder {
    /// Replace the validator of the gate producing `key`
    #[must_use]
    pub fn validator(mut self, key: StageKey, validator: Arc<dyn StageValidator>) -> Self {
        self.validators.insert(key, validator);
        self
    }

    /// Assemble the chain
    #[must_use]
    pub fn build(mut self) -> Orchestrator {
        let service = Arc::clone(&self.service);
        let steps = vec![
            Step::Plain(Arc::new(SelectTemplate::new(
                self.config.templates.clone(),
                Arc::clone(&service),
            ))),
            self.gate(
                GenerativeStage::generate_events(Arc::clone(&service)),
                Arc::new(EventsValidator),
                FailureReason::EventsInvalid,
            ),
            self.gate(
                GenerativeStage::populate_characters(Arc::clone(&service)),
                Arc::new(CharactersValidator),
                FailureReason::CharactersInvalid,
            ),
            self.gate(
                GenerativeStage::build_locations(Arc::clone(&service)),
                Arc::new(LocationsValidator),
                FailureReason::LocationsInvalid,
            ),
            Step::Plain(Arc::new(GenerativeStage::distribute_facts(Arc::clone(&service)))),
            self.gate(
                GenerativeStage::design_casebook(Arc::clone(&service)),
                Arc::new(CasebookValidator),
                FailureReason::DiscoveryGraphInvalid,
            ),
            Step::Plain(Arc::new(GenerativeStage::generate_prose(Arc::clone(&service)))),
            self.gate(
                GenerativeStage::create_questions(Arc::clone(&service)),
                Arc::new(QuestionsValidator),
                FailureReason::QuestionsInvalid,
            ),
            Step::Plain(Arc::new(ComputeOptimalPath::new(self.config.solver))),
            Step::Plain(Arc::new(ValidateCoherence)),
        ];

        Orchestrator {
            steps,
            store: self.store,
            config: self.config,
        }
    }

    fn gate(
        &mut self,
        stage: GenerativeStage,
        default: Arc<dyn StageValidator>,
        failure: FailureReason,
    ) -> Step {
        let validator = self.validators.remove(&stage.output()).unwrap_or(default);
        Step::Gated(RetryGate::new(Arc::new(stage), validator, failure))
    }
}

/// Drives one daily run
pub struct Orchestrator {
    steps: Vec<Step>,
    store: Arc<dyn CaseStore>,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Orchestrator with the default validators
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        service: Arc<dyn GenerationService>,
        store: Arc<dyn CaseStore>,
    ) -> Self {
        Self::builder(config, service, store).build()
    }

    /// Start building an orchestrator
    #[must_use]
    pub fn builder(
        config: PipelineConfig,
        service: Arc<dyn GenerationService>,
        store: Arc<dyn CaseStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            service,
            store,
            validators: HashMap::new(),
        }
    }

    /// Steps in run order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generate, verify and store the case for `date`
    ///
    /// # Errors
    /// A [`PipelineFailure`] naming the reason and the failing step and
    /// carrying the state accumulated so far.
    pub async fn run(&self, date: NaiveDate) -> Result<PipelineSuccess, PipelineFailure> {
        let state = PipelineState::new(date);
        let span = tracing::info_span!("pipeline_run", %date, run_id = %state.run_id());
        let result = self.run_steps(state).instrument(span).await;
        match &result {
            Ok(success) => {
                tracing::info!(%date, case_id = %success.case.id, "Pipeline run succeeded");
            }
            Err(failure) => {
                tracing::error!(
                    %date,
                    reason = %failure.reason,
                    stage = failure.stage,
                    "Pipeline run failed"
                );
            }
        }
        result
    }

    async fn run_steps(&self, mut state: PipelineState) -> Result<PipelineSuccess, PipelineFailure> {
        let deadline = Deadline::after(self.config.deadline());
        tracing::info!(deadline_secs = self.config.deadline_secs, "Pipeline run started");

        for step in &self.steps {
            state = match step {
                Step::Plain(stage) => run_plain(stage.as_ref(), state, &deadline).await?,
                Step::Gated(gate) => gate.run(state, &deadline).await?.state,
            };
        }

        let case = match assemble_case(&state) {
            Ok(case) => case,
            Err(missing) => {
                let errors = missing.iter().map(|k| format!("{k} missing")).collect();
                return Err(PipelineFailure::new(
                    FailureReason::InfrastructureFault,
                    ASSEMBLE,
                    errors,
                    state,
                ));
            }
        };

        let receipt = match deadline.guard(self.store.store(&case)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return Err(PipelineFailure::new(
                    FailureReason::InfrastructureFault,
                    STORE,
                    vec![e.to_string()],
                    state,
                ))
            }
            Err(_) => {
                return Err(PipelineFailure::new(
                    FailureReason::Timeout,
                    STORE,
                    vec![deadline.exceeded_message()],
                    state,
                ))
            }
        };

        Ok(PipelineSuccess { case, receipt })
    }
}

async fn run_plain(
    stage: &dyn Stage,
    state: PipelineState,
    deadline: &Deadline,
) -> Result<PipelineState, PipelineFailure> {
    let name = stage.name();
    let view = match view_for(&state, stage) {
        Ok(view) => view,
        Err(e) => {
            return Err(PipelineFailure::new(
                e.failure_reason(),
                name,
                e.messages(),
                state,
            ))
        }
    };

    tracing::debug!(stage = name, "Running stage");
    match deadline.guard(stage.run(&view)).await {
        Ok(Ok(output)) => {
            let state = record(state, name, stage.output(), output)?;
            tracing::info!(stage = name, version = state.version(), "Stage complete");
            Ok(state)
        }
        Ok(Err(e)) => Err(PipelineFailure::new(
            e.failure_reason(),
            name,
            e.messages(),
            state,
        )),
        Err(_) => Err(PipelineFailure::new(
            FailureReason::Timeout,
            name,
            vec![deadline.exceeded_message()],
            state,
        )),
    }
}

/// Build the final case from a completed state
///
/// # Errors
/// The keys that have not been written.
pub fn assemble_case(state: &PipelineState) -> Result<Case, Vec<StageKey>> {
    let missing: Vec<StageKey> = StageKey::ALL
        .into_iter()
        .filter(|k| *k != StageKey::Coherence && !state.contains(*k))
        .collect();

    let (
        Some(template),
        Some(events),
        Some(characters),
        Some(locations),
        Some(facts),
        Some(casebook),
        Some(prose),
        Some(questions),
        Some(path),
    ) = (
        state.template(),
        state.events(),
        state.characters(),
        state.locations(),
        state.facts(),
        state.casebook(),
        state.prose(),
        state.questions(),
        state.optimal_path(),
    )
    else {
        return Err(missing);
    };

    Ok(Case {
        id: CaseId::new(),
        date: state.date(),
        generated_at: Utc::now(),
        template: template.clone(),
        events: events.to_vec(),
        characters: characters.to_vec(),
        locations: locations.to_vec(),
        facts: facts.facts.clone(),
        casebook: casebook.to_vec(),
        introduction_facts: facts.introduction.clone(),
        prose: prose.clone(),
        questions: questions.to_vec(),
        optimal_path: path.clone(),
    })
}
