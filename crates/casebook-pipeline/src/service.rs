//! Collaborators at the edge of the pipeline
//!
//! The generation service produces raw stage payloads; the case store
//! persists finished cases. Both are traits so runs can be driven from
//! fixtures, test doubles or real backends.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{GenerationError, StoreError};
use crate::state::StateView;
use crate::types::{Case, CaseReceipt};

/// Produces the raw JSON payload for one stage attempt
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate the payload for `stage` given the stage's view
    ///
    /// # Errors
    /// Any service-side failure. The pipeline never retries these.
    async fn invoke(
        &self,
        stage: &str,
        request: &StateView,
    ) -> Result<serde_json::Value, GenerationError>;
}

/// Persists finished cases
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Store `case`; called once per successful run
    ///
    /// # Errors
    /// Any backend failure. The pipeline never retries these.
    async fn store(&self, case: &Case) -> Result<CaseReceipt, StoreError>;
}

/// Serves payloads from JSON files on disk
///
/// For stage `s` on attempt `n` it reads `<dir>/s.n.json` when present,
/// otherwise `<dir>/s.json`.
#[derive(Debug, Clone)]
pub struct FixtureGenerationService {
    dir: PathBuf,
}

impl FixtureGenerationService {
    /// Serve fixtures from `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Fixture directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn locate(&self, stage: &str, attempt: u32) -> Result<PathBuf, GenerationError> {
        let specific = self.dir.join(format!("{stage}.{attempt}.json"));
        if tokio::fs::try_exists(&specific).await? {
            return Ok(specific);
        }
        let fallback = self.dir.join(format!("{stage}.json"));
        if tokio::fs::try_exists(&fallback).await? {
            return Ok(fallback);
        }
        Err(GenerationError::MissingFixture {
            stage: stage.to_string(),
            path: fallback,
        })
    }
}

#[async_trait]
impl GenerationService for FixtureGenerationService {
    async fn invoke(
        &self,
        stage: &str,
        request: &StateView,
    ) -> Result<serde_json::Value, GenerationError> {
        let path = self.locate(stage, request.attempt).await?;
        tracing::debug!(stage, attempt = request.attempt, path = %path.display(), "Serving fixture");
        let body = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Writes each case to `<dir>/<date>.json`, refusing to overwrite
///
/// Writes go through a temp file in the same directory, so a case file is
/// either complete or absent.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store cases under `dir`, created on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path a case for `date` is written to
    #[must_use]
    pub fn path_for(&self, date: chrono::NaiveDate) -> PathBuf {
        self.dir.join(format!("{date}.json"))
    }
}

#[async_trait]
impl CaseStore for JsonFileStore {
    async fn store(&self, case: &Case) -> Result<CaseReceipt, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(case.date);
        let body = serde_json::to_vec_pretty(case)?;

        // Runs to completion even when the deadline drops this future.
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_new(&dir, &target, &body))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))??;

        tracing::info!(case_id = %case.id, path = %path.display(), "Case stored");
        Ok(CaseReceipt {
            case_id: case.id,
            location: path.display().to_string(),
        })
    }
}

fn write_new(dir: &Path, target: &Path, body: &[u8]) -> Result<(), StoreError> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(body)?;
    file.as_file().sync_all()?;
    file.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            StoreError::AlreadyExists(target.display().to_string())
        } else {
            StoreError::Io(e.error)
        }
    })?;
    Ok(())
}

/// Read a stored case back from disk
///
/// # Errors
/// IO or decode failures.
pub async fn load_case(path: &Path) -> Result<Case, StoreError> {
    let body = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}
