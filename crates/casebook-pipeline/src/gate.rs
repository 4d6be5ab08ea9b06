//! Generate-then-validate retry gate
//!
//! A gate wraps one generative stage and its validator:
//!
//! ```text
//! Init -> Generate -> Validate -> Passed
//!            ^            |
//!            |            +-> IncrementAndRegenerate -> Generate
//!            |            +-> TerminalFailure
//! ```
//!
//! Rejected attempts increment the stage's retry counter and hand the
//! validator's errors back as feedback. After [`MAX_RETRIES`] retries the
//! gate fails with its stage-specific reason. Service errors and validator
//! faults end the run immediately.

use std::sync::Arc;

use casebook_graph::ValidationResult;

use crate::deadline::Deadline;
use crate::error::{FailureReason, PipelineFailure, StageError};
use crate::stage::{view_for, Stage};
use crate::state::{PipelineState, StageKey, StageOutput};
use crate::validators::StageValidator;

/// Retries allowed after the first attempt
pub const MAX_RETRIES: u32 = 2;

/// Phase of a gate run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    Init,
    Generate,
    Validate,
    IncrementAndRegenerate,
    Passed,
    TerminalFailure,
}

impl GateState {
    /// Whether no transition leaves this phase
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: GateState) -> Vec<GateState> {
    use GateState::*;
    match from {
        Init => vec![Generate],
        Generate => vec![Validate],
        Validate => vec![Passed, IncrementAndRegenerate, TerminalFailure],
        IncrementAndRegenerate => vec![Generate],
        Passed => vec![],
        TerminalFailure => vec![],
    }
}

/// Transition not in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal gate transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: GateState,
    pub to: GateState,
}

/// Check one transition against the table
///
/// # Errors
/// [`IllegalTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(from: GateState, to: GateState) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// Successful gate run
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// State with the accepted output recorded
    pub state: PipelineState,
    /// Attempts used, 1-based
    pub attempts: u32,
    /// Every phase entered, in order
    pub trace: Vec<GateState>,
}

struct Phases {
    current: GateState,
    trace: Vec<GateState>,
}

/// A generative stage guarded by a validator
pub struct RetryGate {
    stage: Arc<dyn Stage>,
    validator: Arc<dyn StageValidator>,
    failure: FailureReason,
}

impl RetryGate {
    /// Gate `stage` with `validator`, failing with `failure` once retries run out
    #[must_use]
    pub fn new(
        stage: Arc<dyn Stage>,
        validator: Arc<dyn StageValidator>,
        failure: FailureReason,
    ) -> Self {
        Self {
            stage,
            validator,
            failure,
        }
    }

    /// Wrapped stage
    #[inline]
    #[must_use]
    pub fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }

    /// Reason reported when retries run out
    #[inline]
    #[must_use]
    pub fn failure(&self) -> FailureReason {
        self.failure
    }

    /// Run the gate to completion
    ///
    /// # Errors
    /// The gate's own failure reason once retries are spent, `Timeout` when
    /// the deadline passes, `InfrastructureFault` for service errors and
    /// validator faults. Every failure carries the state as it stood.
    pub async fn run(
        &self,
        state: PipelineState,
        deadline: &Deadline,
    ) -> Result<GateOutcome, PipelineFailure> {
        self.run_inspect(state, deadline, |_, _| {}).await
    }

    /// [`RetryGate::run`], calling `inspect` on entry to every phase
    pub async fn run_inspect<F>(
        &self,
        state: PipelineState,
        deadline: &Deadline,
        mut inspect: F,
    ) -> Result<GateOutcome, PipelineFailure>
    where
        F: FnMut(GateState, &PipelineState) + Send,
    {
        let key = self.stage.output();
        let name = self.stage.name();
        let mut phases = Phases {
            current: GateState::Init,
            trace: vec![GateState::Init],
        };
        inspect(GateState::Init, &state);
        let mut state = state.with_gate_entered(key);

        loop {
            state = self.advance(&mut phases, GateState::Generate, state, &mut inspect)?;
            let view = match view_for(&state, self.stage.as_ref()) {
                Ok(view) => view,
                Err(e) => {
                    return Err(PipelineFailure::new(
                        FailureReason::InfrastructureFault,
                        name,
                        vec![e.to_string()],
                        state,
                    ))
                }
            };

            tracing::debug!(stage = name, attempt = view.attempt, "Generating");
            let Ok(generated) = deadline.guard(self.stage.run(&view)).await else {
                tracing::warn!(stage = name, attempt = view.attempt, "Deadline exceeded");
                return Err(PipelineFailure::new(
                    FailureReason::Timeout,
                    name,
                    vec![deadline.exceeded_message()],
                    state,
                ));
            };

            state = self.advance(&mut phases, GateState::Validate, state, &mut inspect)?;
            let (output, verdict) = match generated {
                Ok(output) => match self.validator.validate(&output, &view) {
                    Ok(verdict) => (Some(output), verdict),
                    Err(fault) => {
                        tracing::error!(stage = name, error = %fault, "Validator fault");
                        return Err(PipelineFailure::new(
                            FailureReason::InfrastructureFault,
                            name,
                            vec![fault.to_string()],
                            state,
                        ));
                    }
                },
                Err(e @ StageError::Malformed { .. }) => {
                    (None, ValidationResult::from_errors(vec![e.to_string()]))
                }
                Err(e) => {
                    tracing::error!(stage = name, error = %e, "Stage failed");
                    return Err(PipelineFailure::new(e.failure_reason(), name, e.messages(), state));
                }
            };

            if let (Some(output), true) = (output, verdict.valid) {
                state = self.advance(&mut phases, GateState::Passed, state, &mut inspect)?;
                let state = record(state.with_feedback_cleared(), name, key, output)?;
                tracing::info!(stage = name, attempts = view.attempt, "Gate passed");
                return Ok(GateOutcome {
                    state,
                    attempts: view.attempt,
                    trace: phases.trace,
                });
            }

            let errors = if verdict.errors.is_empty() {
                vec![format!("{name} output rejected")]
            } else {
                verdict.errors
            };

            if state.retry_count(key).unwrap_or(0) < MAX_RETRIES {
                tracing::warn!(
                    stage = name,
                    attempt = view.attempt,
                    errors = errors.len(),
                    "Output rejected, regenerating"
                );
                state = state.with_retry(key, errors);
                state = self.advance(
                    &mut phases,
                    GateState::IncrementAndRegenerate,
                    state,
                    &mut inspect,
                )?;
                continue;
            }

            state = self.advance(&mut phases, GateState::TerminalFailure, state, &mut inspect)?;
            tracing::error!(
                stage = name,
                reason = %self.failure,
                errors = ?errors,
                "Retries exhausted"
            );
            return Err(PipelineFailure::new(self.failure, name, errors, state));
        }
    }

    fn advance<F>(
        &self,
        phases: &mut Phases,
        to: GateState,
        state: PipelineState,
        inspect: &mut F,
    ) -> Result<PipelineState, PipelineFailure>
    where
        F: FnMut(GateState, &PipelineState),
    {
        if let Err(e) = validate_transition(phases.current, to) {
            return Err(PipelineFailure::new(
                FailureReason::InfrastructureFault,
                self.stage.name(),
                vec![e.to_string()],
                state,
            ));
        }
        phases.current = to;
        phases.trace.push(to);
        inspect(to, &state);
        Ok(state)
    }
}

/// Record `output` for the step `name`, which must produce `expected`
///
/// # Errors
/// `InfrastructureFault` for an output of the wrong kind or a key already
/// written; the failure carries the state as given.
pub(crate) fn record(
    state: PipelineState,
    name: &'static str,
    expected: StageKey,
    output: StageOutput,
) -> Result<PipelineState, PipelineFailure> {
    if output.key() != expected {
        let message = format!("{name} produced {} instead of {expected}", output.key());
        return Err(PipelineFailure::new(
            FailureReason::InfrastructureFault,
            name,
            vec![message],
            state,
        ));
    }
    match state.clone().with_output(output) {
        Ok(next) => Ok(next),
        Err(e) => Err(PipelineFailure::new(
            FailureReason::InfrastructureFault,
            name,
            vec![e.to_string()],
            state,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_are_absorbing() {
        assert!(GateState::Passed.is_terminal());
        assert!(GateState::TerminalFailure.is_terminal());
        assert!(!GateState::Validate.is_terminal());
    }

    #[test]
    fn transition_table() {
        assert!(validate_transition(GateState::Init, GateState::Generate).is_ok());
        assert!(validate_transition(GateState::Validate, GateState::IncrementAndRegenerate).is_ok());
        assert!(validate_transition(GateState::IncrementAndRegenerate, GateState::Generate).is_ok());

        let err = validate_transition(GateState::Generate, GateState::Passed).unwrap_err();
        assert_eq!(err.from, GateState::Generate);
        assert!(validate_transition(GateState::Passed, GateState::Generate).is_err());
        assert!(validate_transition(GateState::Init, GateState::Validate).is_err());
    }
}
