use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use casebook_graph::ValidationResult;
use casebook_pipeline::{
    Deadline, FailureReason, GateState, GenerativeStage, PipelineState, RetryGate, StageKey,
    StageOutput, StageOutputs, StateView, ValidatorFault, MAX_RETRIES,
};
use casebook_test_utils::{fixtures, ScriptedGenerationService};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Validator rejecting the first `failures` outputs it sees
struct RejectFirst {
    failures: u32,
    seen: AtomicU32,
}

impl casebook_pipeline::StageValidator for RejectFirst {
    fn validate(
        &self,
        _output: &StageOutput,
        _view: &StateView,
    ) -> Result<ValidationResult, ValidatorFault> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Ok(ValidationResult::from_errors(vec![format!("rejection {}", n + 1)]))
        } else {
            Ok(ValidationResult::valid())
        }
    }
}

fn characters_gate(service: &Arc<ScriptedGenerationService>, failures: u32) -> RetryGate {
    RetryGate::new(
        Arc::new(GenerativeStage::populate_characters(service.clone())),
        Arc::new(RejectFirst {
            failures,
            seen: AtomicU32::new(0),
        }),
        FailureReason::CharactersInvalid,
    )
}

fn base_state() -> PipelineState {
    fixtures::state_with(&[StageKey::Template, StageKey::Events])
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(60))
}

#[tokio::test]
async fn passes_first_time_without_retry() {
    let service = Arc::new(ScriptedGenerationService::coherent());
    let outcome = characters_gate(&service, 0)
        .run(base_state(), &deadline())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.trace,
        vec![GateState::Init, GateState::Generate, GateState::Validate, GateState::Passed]
    );
    assert_eq!(outcome.state.retry_count(StageKey::Characters), Some(0));
    assert!(outcome.state.characters().is_some());
    assert!(outcome.state.feedback().is_none());
}

#[tokio::test]
async fn one_rejection_regenerates_once() {
    let service = Arc::new(ScriptedGenerationService::coherent());
    let outcome = characters_gate(&service, 1)
        .run(base_state(), &deadline())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.trace,
        vec![
            GateState::Init,
            GateState::Generate,
            GateState::Validate,
            GateState::IncrementAndRegenerate,
            GateState::Generate,
            GateState::Validate,
            GateState::Passed,
        ]
    );
    assert_eq!(outcome.state.retry_count(StageKey::Characters), Some(1));
    // feedback is cleared once the gate passes
    assert!(outcome.state.feedback().is_none());
    assert_eq!(
        service.calls_for("populate_characters")[1].feedback,
        vec!["rejection 1".to_string()]
    );
}

#[tokio::test]
async fn third_rejection_is_terminal() {
    let service = Arc::new(ScriptedGenerationService::coherent());
    let failure = characters_gate(&service, 3)
        .run(base_state(), &deadline())
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::CharactersInvalid);
    assert_eq!(failure.errors, vec!["rejection 3".to_string()]);
    assert_eq!(failure.state.retry_count(StageKey::Characters), Some(MAX_RETRIES));
    assert_eq!(
        service.calls_for("populate_characters").len(),
        usize::try_from(MAX_RETRIES + 1).unwrap()
    );
}

#[tokio::test]
async fn missing_inputs_fail_before_generation() {
    let service = Arc::new(ScriptedGenerationService::coherent());
    let state = fixtures::state_with(&[StageKey::Template]);
    let failure = characters_gate(&service, 0)
        .run(state, &deadline())
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::InfrastructureFault);
    assert!(failure.errors[0].contains("missing inputs"));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn already_written_output_is_refused() {
    let service = Arc::new(ScriptedGenerationService::coherent());
    let state = fixtures::state_with(&[StageKey::Template, StageKey::Events, StageKey::Characters]);
    let failure = characters_gate(&service, 0)
        .run(state, &deadline())
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::InfrastructureFault);
    assert_eq!(
        failure.errors,
        vec!["stage output characters is already recorded".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_the_state_so_far() {
    let service = ScriptedGenerationService::coherent();
    service.delay("populate_characters", Duration::from_secs(120));
    let service = Arc::new(service);

    let before = base_state();
    let failure = characters_gate(&service, 0)
        .run(before.clone(), &deadline())
        .await
        .unwrap_err();

    assert_eq!(failure.reason, FailureReason::Timeout);
    assert_eq!(failure.state.template(), before.template());
    assert_eq!(failure.state.events(), before.events());
    assert!(failure.state.characters().is_none());
}

proptest! {
    #[test]
    fn prop_state_is_monotonic_across_retries(failures in 0u32..=3) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let service = Arc::new(ScriptedGenerationService::coherent());
        let before = base_state();
        let gate = characters_gate(&service, failures);

        let mut snapshots: Vec<(GateState, PipelineState)> = Vec::new();
        let result = rt.block_on(gate.run_inspect(before.clone(), &deadline(), |phase, state| {
            snapshots.push((phase, state.clone()));
        }));

        // versions never go backwards and prior outputs never change
        for pair in snapshots.windows(2) {
            prop_assert!(pair[0].1.version() <= pair[1].1.version());
        }
        for (_, snap) in &snapshots {
            prop_assert_eq!(snap.template(), before.template());
            prop_assert_eq!(snap.events(), before.events());
            prop_assert_eq!(snap.run_id(), before.run_id());
        }

        // each increment bumps the counter by exactly one and records feedback
        let increments: Vec<&PipelineState> = snapshots
            .iter()
            .filter(|(phase, _)| *phase == GateState::IncrementAndRegenerate)
            .map(|(_, s)| s)
            .collect();
        for (i, snap) in increments.iter().enumerate() {
            let expected = u32::try_from(i + 1).unwrap();
            prop_assert_eq!(snap.retry_count(StageKey::Characters), Some(expected));
            prop_assert!(snap.feedback().is_some());
        }
        prop_assert!(increments.len() <= usize::try_from(MAX_RETRIES).unwrap());

        let calls = service.calls_for("populate_characters").len();
        prop_assert!(calls <= 3);
        match result {
            Ok(outcome) => {
                prop_assert!(failures <= MAX_RETRIES);
                prop_assert_eq!(outcome.attempts, failures + 1);
                prop_assert!(outcome.state.version() > before.version());
            }
            Err(failure) => {
                prop_assert_eq!(failures, 3);
                prop_assert_eq!(failure.reason, FailureReason::CharactersInvalid);
                prop_assert_eq!(calls, 3);
                prop_assert_eq!(snapshots.last().map(|(p, _)| *p), Some(GateState::TerminalFailure));
            }
        }
    }
}
