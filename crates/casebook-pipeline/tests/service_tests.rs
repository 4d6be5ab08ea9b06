use std::sync::Arc;
use std::time::Duration;

use casebook_pipeline::{
    assemble_case, load_case, CaseStore, FixtureGenerationService, GenerationError,
    GenerationService, JsonFileStore, Orchestrator, PipelineConfig, PipelineState, StageKey,
    StoreError,
};
use casebook_test_utils::fixtures;
use pretty_assertions::assert_eq;
use serde_json::json;

fn events_view(state: &PipelineState) -> casebook_pipeline::StateView {
    state
        .view("generate_events", StageKey::Events, &[StageKey::Template])
        .unwrap()
}

#[tokio::test]
async fn fixture_falls_back_to_plain_file() {
    let dir = tempfile::tempdir().unwrap();
    fixtures::write_fixture_dir(dir.path()).unwrap();
    let service = FixtureGenerationService::new(dir.path());

    let state = fixtures::state_with(&[StageKey::Template]);
    let body = service
        .invoke("generate_events", &events_view(&state))
        .await
        .unwrap();
    assert_eq!(body, fixtures::events());
}

#[tokio::test]
async fn attempt_specific_fixture_wins() {
    let dir = tempfile::tempdir().unwrap();
    fixtures::write_fixture_dir(dir.path()).unwrap();
    std::fs::write(dir.path().join("generate_events.2.json"), b"[]").unwrap();
    let service = FixtureGenerationService::new(dir.path());

    let state = fixtures::state_with(&[StageKey::Template]);
    let first = service
        .invoke("generate_events", &events_view(&state))
        .await
        .unwrap();
    assert_eq!(first, fixtures::events());

    let retried = state
        .with_gate_entered(StageKey::Events)
        .with_retry(StageKey::Events, vec!["too short".to_string()]);
    let view = events_view(&retried);
    assert_eq!(view.attempt, 2);
    let second = service.invoke("generate_events", &view).await.unwrap();
    assert_eq!(second, json!([]));
}

#[tokio::test]
async fn missing_fixture_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let service = FixtureGenerationService::new(dir.path());

    let state = fixtures::state_with(&[StageKey::Template]);
    let err = service
        .invoke("generate_events", &events_view(&state))
        .await
        .unwrap_err();
    match err {
        GenerationError::MissingFixture { stage, path } => {
            assert_eq!(stage, "generate_events");
            assert_eq!(path, dir.path().join("generate_events.json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unparsable_fixture_is_invalid_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("generate_events.json"), b"{not json").unwrap();
    let service = FixtureGenerationService::new(dir.path());

    let state = fixtures::state_with(&[StageKey::Template]);
    let err = service
        .invoke("generate_events", &events_view(&state))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidBody(_)));
}

#[tokio::test]
async fn file_store_writes_once_per_date() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("cases"));
    let case = assemble_case(&fixtures::complete_state()).unwrap();

    let receipt = store.store(&case).await.unwrap();
    let path = store.path_for(fixtures::date());
    assert!(path.ends_with("2024-03-01.json"));
    assert_eq!(receipt.case_id, case.id);
    assert_eq!(receipt.location, path.display().to_string());

    let loaded = load_case(&path).await.unwrap();
    assert_eq!(loaded, case);

    let again = store.store(&case).await.unwrap_err();
    assert!(matches!(again, StoreError::AlreadyExists(_)));
    // the first case is untouched
    assert_eq!(load_case(&path).await.unwrap().id, case.id);
}

fn dir_listing(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn file_store_leaves_only_the_case_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    let case = assemble_case(&fixtures::complete_state()).unwrap();

    store.store(&case).await.unwrap();
    assert!(store.store(&case).await.is_err());
    assert_eq!(dir_listing(dir.path()), vec!["2024-03-01.json".to_string()]);
}

#[tokio::test]
async fn interrupted_store_never_leaves_a_partial_case() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());
    let case = assemble_case(&fixtures::complete_state()).unwrap();

    // usually dropped before the write can finish
    let _ = tokio::time::timeout(Duration::ZERO, store.store(&case)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let path = store.path_for(fixtures::date());
    if path.exists() {
        assert_eq!(load_case(&path).await.unwrap().id, case.id);
    } else {
        let receipt = store.store(&case).await.unwrap();
        assert_eq!(receipt.case_id, case.id);
        assert_eq!(load_case(&path).await.unwrap().id, case.id);
    }
    assert_eq!(dir_listing(dir.path()), vec!["2024-03-01.json".to_string()]);
}

#[tokio::test]
async fn run_from_fixture_directory_to_disk() {
    let fixtures_dir = tempfile::tempdir().unwrap();
    fixtures::write_fixture_dir(fixtures_dir.path()).unwrap();
    let out = tempfile::tempdir().unwrap();

    let store = JsonFileStore::new(out.path());
    let orchestrator = Orchestrator::new(
        PipelineConfig::new(),
        Arc::new(FixtureGenerationService::new(fixtures_dir.path())),
        Arc::new(store.clone()),
    );
    let success = orchestrator.run(fixtures::date()).await.unwrap();

    let stored = load_case(&store.path_for(fixtures::date())).await.unwrap();
    assert_eq!(stored, success.case);
    let path: Vec<&str> = stored
        .optimal_path
        .entries
        .iter()
        .map(|e| e.as_str())
        .collect();
    assert_eq!(path, fixtures::OPTIMAL_PATH.to_vec());

    // a second run for the same date is refused by the store
    let failure = orchestrator.run(fixtures::date()).await.unwrap_err();
    assert_eq!(failure.stage, "store_case");
    assert!(failure.errors[0].contains("already stored"));
}
