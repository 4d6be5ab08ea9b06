//! Stage contract and the stages of the daily pipeline
//!
//! A stage reads a [`StateView`] holding only its declared inputs and
//! returns one [`StageOutput`]. Running a stage twice on the same view does
//! nothing beyond calling the generation service twice.

use std::sync::Arc;

use async_trait::async_trait;
use casebook_graph::{PathSolver, SolverConfig};
use chrono::Datelike;

use crate::coherence::{coherence_errors, CHECKS};
use crate::error::StageError;
use crate::service::GenerationService;
use crate::state::{PipelineState, StageKey, StageOutput, StageOutputs, StateView};
use crate::types::{discovery_graph, question_facts, CoherenceReport, OptimalPath, Template};

/// One step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Step name, also used as the generation service stage name
    fn name(&self) -> &'static str;

    /// Key the output is recorded under
    fn output(&self) -> StageKey;

    /// Keys this stage reads
    fn inputs(&self) -> &[StageKey];

    /// Produce the output from the view
    ///
    /// # Errors
    /// Any [`StageError`]; the caller decides whether it is retried.
    async fn run(&self, view: &StateView) -> Result<StageOutput, StageError>;
}

/// Project `state` for `stage`
///
/// # Errors
/// [`StageError::MissingInput`] when a declared input is absent.
pub fn view_for(state: &PipelineState, stage: &dyn Stage) -> Result<StateView, StageError> {
    state
        .view(stage.name(), stage.output(), stage.inputs())
        .map_err(|missing| StageError::MissingInput {
            stage: stage.name(),
            missing,
        })
}

/// Calls the generation service and decodes its payload
pub struct GenerativeStage {
    name: &'static str,
    output: StageKey,
    inputs: &'static [StageKey],
    service: Arc<dyn GenerationService>,
}

impl GenerativeStage {
    /// Generic generative stage
    #[must_use]
    pub fn new(
        name: &'static str,
        output: StageKey,
        inputs: &'static [StageKey],
        service: Arc<dyn GenerationService>,
    ) -> Self {
        Self {
            name,
            output,
            inputs,
            service,
        }
    }

    /// Causal story of the case
    #[must_use]
    pub fn generate_events(service: Arc<dyn GenerationService>) -> Self {
        Self::new("generate_events", StageKey::Events, &[StageKey::Template], service)
    }

    /// Cast of characters
    #[must_use]
    pub fn populate_characters(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "populate_characters",
            StageKey::Characters,
            &[StageKey::Template, StageKey::Events],
            service,
        )
    }

    /// Places the investigation can visit
    #[must_use]
    pub fn build_locations(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "build_locations",
            StageKey::Locations,
            &[StageKey::Template, StageKey::Events, StageKey::Characters],
            service,
        )
    }

    /// Facts and introduction facts
    #[must_use]
    pub fn distribute_facts(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "distribute_facts",
            StageKey::Facts,
            &[StageKey::Events, StageKey::Characters, StageKey::Locations],
            service,
        )
    }

    /// Casebook entries and their gating
    #[must_use]
    pub fn design_casebook(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "design_casebook",
            StageKey::Casebook,
            &[StageKey::Characters, StageKey::Locations, StageKey::Facts],
            service,
        )
    }

    /// Introduction and entry text
    #[must_use]
    pub fn generate_prose(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "generate_prose",
            StageKey::Prose,
            &[
                StageKey::Template,
                StageKey::Characters,
                StageKey::Locations,
                StageKey::Facts,
                StageKey::Casebook,
            ],
            service,
        )
    }

    /// Quiz questions
    #[must_use]
    pub fn create_questions(service: Arc<dyn GenerationService>) -> Self {
        Self::new(
            "create_questions",
            StageKey::Questions,
            &[
                StageKey::Template,
                StageKey::Characters,
                StageKey::Facts,
                StageKey::Casebook,
            ],
            service,
        )
    }
}

#[async_trait]
impl Stage for GenerativeStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn output(&self) -> StageKey {
        self.output
    }

    fn inputs(&self) -> &[StageKey] {
        self.inputs
    }

    async fn run(&self, view: &StateView) -> Result<StageOutput, StageError> {
        let payload = self.service.invoke(self.name, view).await?;
        StageOutput::decode(self.output, payload).map_err(|e| StageError::Malformed {
            stage: self.output,
            message: e.to_string(),
        })
    }
}

/// Picks the day's template
///
/// Deterministic in the run date over a configured catalog. With an empty
/// catalog the generation service is asked instead.
pub struct SelectTemplate {
    catalog: Vec<Template>,
    fallback: GenerativeStage,
}

impl SelectTemplate {
    /// Select from `catalog`, falling back to `service`
    #[must_use]
    pub fn new(catalog: Vec<Template>, service: Arc<dyn GenerationService>) -> Self {
        Self {
            catalog,
            fallback: GenerativeStage::new("select_template", StageKey::Template, &[], service),
        }
    }

    /// Catalog entry for `date`, if the catalog is non-empty
    #[must_use]
    pub fn pick(&self, date: chrono::NaiveDate) -> Option<&Template> {
        let len = i64::try_from(self.catalog.len()).ok().filter(|n| *n > 0)?;
        let ix = i64::from(date.num_days_from_ce()).rem_euclid(len);
        self.catalog.get(usize::try_from(ix).ok()?)
    }
}

#[async_trait]
impl Stage for SelectTemplate {
    fn name(&self) -> &'static str {
        "select_template"
    }

    fn output(&self) -> StageKey {
        StageKey::Template
    }

    fn inputs(&self) -> &[StageKey] {
        &[]
    }

    async fn run(&self, view: &StateView) -> Result<StageOutput, StageError> {
        match self.pick(view.date) {
            Some(template) => {
                tracing::debug!(template = %template.id, "Template picked from catalog");
                Ok(StageOutput::Template(template.clone()))
            }
            None => self.fallback.run(view).await,
        }
    }
}

/// Solves the shortest visiting order over the finished casebook
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeOptimalPath {
    config: SolverConfig,
}

impl ComputeOptimalPath {
    /// Stage using the given solver settings
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for ComputeOptimalPath {
    fn name(&self) -> &'static str {
        "compute_optimal_path"
    }

    fn output(&self) -> StageKey {
        StageKey::OptimalPath
    }

    fn inputs(&self) -> &[StageKey] {
        &[StageKey::Facts, StageKey::Casebook, StageKey::Questions]
    }

    async fn run(&self, view: &StateView) -> Result<StageOutput, StageError> {
        let missing = || StageError::MissingInput {
            stage: self.name(),
            missing: self.inputs().to_vec(),
        };
        let graph = discovery_graph(
            view.facts().ok_or_else(missing)?,
            view.casebook().ok_or_else(missing)?,
        );
        let questions = question_facts(view.questions().ok_or_else(missing)?);
        let solver = PathSolver::new(self.config);

        // CPU-bound search runs on the blocking pool.
        let solution = tokio::task::spawn_blocking(move || solver.solve(&graph, &questions))
            .await
            .map_err(|e| StageError::Internal(e.to_string()))??;

        tracing::info!(
            length = solution.len(),
            states = solution.states_explored,
            "Optimal path found"
        );
        Ok(StageOutput::OptimalPath(OptimalPath {
            entries: solution.path,
            states_explored: solution.states_explored,
        }))
    }
}

/// Final cross-stage consistency gate
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateCoherence;

#[async_trait]
impl Stage for ValidateCoherence {
    fn name(&self) -> &'static str {
        "validate_coherence"
    }

    fn output(&self) -> StageKey {
        StageKey::Coherence
    }

    fn inputs(&self) -> &[StageKey] {
        &[
            StageKey::Characters,
            StageKey::Locations,
            StageKey::Facts,
            StageKey::Casebook,
            StageKey::Prose,
            StageKey::Questions,
            StageKey::OptimalPath,
        ]
    }

    async fn run(&self, view: &StateView) -> Result<StageOutput, StageError> {
        let errors = coherence_errors(view);
        if !errors.is_empty() {
            return Err(StageError::Incoherent(errors));
        }
        Ok(StageOutput::Coherence(CoherenceReport {
            checks: CHECKS.iter().map(|c| (*c).to_string()).collect(),
        }))
    }
}
