//! Testing utilities for the casebook workspace
//!
//! Scripted collaborators and a small coherent case to drive the pipeline.

#![allow(missing_docs)]

pub mod fixtures;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use casebook_pipeline::{
    Case, CaseReceipt, CaseStore, GenerationError, GenerationService, StageKey, StateView,
    StoreError,
};
use parking_lot::Mutex;
use serde_json::Value;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    Payload(Value),
    Unavailable(String),
}

/// What a stage was asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub stage: String,
    pub attempt: u32,
    pub feedback: Vec<String>,
    pub inputs: Vec<StageKey>,
}

/// Generation service answering from per-stage scripts
///
/// Queued replies are consumed first; after that the stage's default
/// payload is returned on every call.
#[derive(Debug, Default)]
pub struct ScriptedGenerationService {
    defaults: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service answering every stage with the coherent sample case
    pub fn coherent() -> Self {
        let service = Self::new();
        for (stage, payload) in fixtures::payloads() {
            service.set(stage, payload);
        }
        service
    }

    /// Default payload for `stage`
    pub fn set(&self, stage: &str, payload: Value) -> &Self {
        self.defaults.lock().insert(stage.to_string(), payload);
        self
    }

    /// Queue a one-shot reply for `stage`
    pub fn push(&self, stage: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .entry(stage.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue `payload` `times` times
    pub fn push_payloads(&self, stage: &str, payload: &Value, times: usize) -> &Self {
        for _ in 0..times {
            self.push(stage, Reply::Payload(payload.clone()));
        }
        self
    }

    /// Sleep before answering `stage`
    pub fn delay(&self, stage: &str, delay: Duration) -> &Self {
        self.delays.lock().insert(stage.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, stage: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.stage == stage)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn invoke(&self, stage: &str, request: &StateView) -> Result<Value, GenerationError> {
        self.calls.lock().push(Call {
            stage: stage.to_string(),
            attempt: request.attempt,
            feedback: request.feedback.clone(),
            inputs: request.inputs.keys().copied().collect(),
        });

        let delay = self.delays.lock().get(stage).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .get_mut(stage)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(Reply::Payload(value)) => Ok(value),
            Some(Reply::Unavailable(msg)) => Err(GenerationError::Unavailable(msg)),
            None => self
                .defaults
                .lock()
                .get(stage)
                .cloned()
                .ok_or_else(|| GenerationError::Rejected(format!("no script for {stage}"))),
        }
    }
}

/// Case store keeping cases in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    cases: Mutex<Vec<Case>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every write
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Store that sleeps before every write
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<Case> {
        self.cases.lock().clone()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn store(&self, case: &Case) -> Result<CaseReceipt, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(StoreError::Backend(message.clone()));
        }
        self.cases.lock().push(case.clone());
        Ok(CaseReceipt {
            case_id: case.id,
            location: format!("memory://{}", case.date),
        })
    }
}
