//! Assessment job orchestrator
//!
//! Drives one assessment from pending through completion.
//!
//! # State Progression
//! PENDING → IN_PROGRESS → COMPLETED | FAILED
//!
//! Transitions are evaluated lazily: on an explicit run request, right after
//! upload, or when a status read finds the job stale. There is no poller.
//!
//! - **Start** is the store's conditional `pending` → `in_progress` update; it
//!   hands out a run token and is the only way a run begins.
//! - **Stale pending**: a read of a pending job older than the staleness window
//!   starts it.
//! - **Stuck in progress**: a read of an in-progress job older than the timeout
//!   window fails it with "Assessment timed out". The worker is not stopped;
//!   its final write is rejected because the job is no longer in progress.
//!
//! # Phases of a run
//! - **PAIRING** (`phase_pairing`): find the pickup/return photo of every side
//! - **ASSESSING** (`phase_assessing`): detect, compare and annotate per side
//!
//! The number of concurrently executing runs is bounded by a semaphore.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::AssessmentSettings;
use crate::db::AssessmentStore;
use crate::models::{AssessmentJob, AssessmentResults, AssessmentStatus, AssessmentUpdate};
use crate::services::damage_detector::{DamageDetector, DetectionError};
use crate::services::object_storage::{ObjectStorage, StorageError};
use crate::services::summary::build_summary;

mod phase_assessing;
mod phase_pairing;

pub use phase_pairing::SidePair;

/// Errors that end a run as `failed`
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// Stored images cannot be paired into sides
    #[error("{0}")]
    InputShape(String),

    #[error("{0}")]
    Detection(#[from] DetectionError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Store(#[from] vdas_common::Error),

    #[error("{0}")]
    Worker(String),
}

impl AssessmentError {
    /// Stable category prefix of the persisted error string
    pub fn category(&self) -> &'static str {
        match self {
            AssessmentError::InputShape(_) => "InputShapeError",
            AssessmentError::Detection(DetectionError::Inference { .. }) => "InferenceError",
            AssessmentError::Detection(DetectionError::Fusion(_)) => "WorkerError",
            AssessmentError::Storage(_) => "StorageError",
            AssessmentError::Store(_) => "StoreError",
            AssessmentError::Worker(_) => "WorkerError",
        }
    }

    /// Error string stored on the failed job
    pub fn persisted_message(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}

/// Assessment orchestrator
///
/// Cheap to clone; clones share the store, clients and run permits.
#[derive(Clone)]
pub struct AssessmentOrchestrator {
    store: AssessmentStore,
    storage: Arc<dyn ObjectStorage>,
    detector: Arc<DamageDetector>,
    settings: Arc<AssessmentSettings>,
    run_permits: Arc<Semaphore>,
}

impl AssessmentOrchestrator {
    pub fn new(
        store: AssessmentStore,
        storage: Arc<dyn ObjectStorage>,
        detector: Arc<DamageDetector>,
        settings: AssessmentSettings,
    ) -> Self {
        let run_permits = Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1)));
        Self {
            store,
            storage,
            detector,
            settings: Arc::new(settings),
            run_permits,
        }
    }

    pub fn store(&self) -> &AssessmentStore {
        &self.store
    }

    pub fn settings(&self) -> &AssessmentSettings {
        &self.settings
    }

    /// Run a job to completion if it can be started
    ///
    /// Idempotent: returns `false` without doing anything when the job is
    /// absent or not pending.
    pub async fn run_job(&self, job_id: &str) -> Result<bool, AssessmentError> {
        let Some(run_token) = self.store.try_start(job_id, Utc::now()).await? else {
            tracing::debug!(job_id, "Job not startable, skipping run");
            return Ok(false);
        };

        self.execute(job_id, run_token).await;
        Ok(true)
    }

    /// Run a job in the background
    pub fn schedule(&self, job_id: &str) {
        let orchestrator = self.clone();
        let job_id = job_id.to_string();

        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_job(&job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "Failed to start assessment run");
            }
        });
    }

    /// Start a job and return its record without waiting for the run
    ///
    /// `None` when the job does not exist. A job that is not pending is
    /// returned unchanged.
    pub async fn start_job(&self, job_id: &str) -> Result<Option<AssessmentJob>, AssessmentError> {
        let now = Utc::now();
        let run_token = self.store.try_start(job_id, now).await?;
        let job = self.store.get_at(job_id, now).await?;

        if let Some(run_token) = run_token {
            tracing::info!(job_id, run_token, "Assessment run requested");
            self.spawn_execution(job_id, run_token);
        }

        Ok(job)
    }

    /// Current record of a job, applying lazy recovery transitions
    pub async fn evaluate_and_maybe_recover(
        &self,
        job_id: &str,
    ) -> Result<Option<AssessmentJob>, AssessmentError> {
        self.evaluate_at(job_id, Utc::now()).await
    }

    /// [`Self::evaluate_and_maybe_recover`] as of `now`
    pub async fn evaluate_at(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AssessmentJob>, AssessmentError> {
        let Some(job) = self.store.get_at(job_id, now).await? else {
            return Ok(None);
        };
        let age = now - job.created_at;

        match job.status {
            AssessmentStatus::Pending if age > self.settings.staleness_window => {
                let run_token = self.store.try_start(job_id, now).await?;
                let current = self.store.get_at(job_id, now).await?;

                if let Some(run_token) = run_token {
                    tracing::info!(
                        job_id,
                        run_token,
                        age_secs = age.num_seconds(),
                        "Restarting stale pending assessment"
                    );
                    self.spawn_execution(job_id, run_token);
                }
                Ok(current)
            }
            AssessmentStatus::InProgress if age > self.settings.timeout_window => {
                if self.store.mark_timed_out(job_id, now).await? {
                    tracing::warn!(
                        job_id,
                        age_secs = age.num_seconds(),
                        "Assessment timed out"
                    );
                }
                Ok(self.store.get_at(job_id, now).await?)
            }
            _ => Ok(Some(job)),
        }
    }

    fn spawn_execution(&self, job_id: &str, run_token: i64) {
        let orchestrator = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move { orchestrator.execute(&job_id, run_token).await });
    }

    /// Execute a claimed run and write its outcome
    async fn execute(&self, job_id: &str, run_token: i64) {
        let start_time = Instant::now();

        let outcome = match self.run_permits.acquire().await {
            Ok(_permit) => {
                tracing::info!(job_id, run_token, "Assessment run started");
                self.assess(job_id).await
            }
            Err(e) => Err(AssessmentError::Worker(format!("Run permits closed: {}", e))),
        };

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        let update = match &outcome {
            Ok((results, summary)) => {
                AssessmentUpdate::completed(Utc::now(), results.clone(), summary.clone())
            }
            Err(e) => AssessmentUpdate::failed(Utc::now(), e.persisted_message()),
        };

        match self.store.finish_run(job_id, run_token, &update).await {
            Ok(true) => match &outcome {
                Ok((results, _)) => tracing::info!(
                    job_id,
                    elapsed_ms,
                    sides = results.len(),
                    "Assessment completed"
                ),
                Err(e) => tracing::error!(
                    job_id,
                    elapsed_ms,
                    category = e.category(),
                    error = %e,
                    "Assessment failed"
                ),
            },
            Ok(false) => tracing::warn!(
                job_id,
                run_token,
                elapsed_ms,
                "Job no longer held by this run (timed out or superseded), discarding result"
            ),
            Err(e) => tracing::error!(
                job_id,
                elapsed_ms,
                error = %e,
                "Failed to persist assessment outcome"
            ),
        }
    }

    /// Pair, detect and compare every side; build the summary
    async fn assess(&self, job_id: &str) -> Result<(AssessmentResults, String), AssessmentError> {
        let pairs = self.phase_pairing(job_id).await?;
        let results = self.phase_assessing(job_id, &pairs).await?;

        let new_damages: Vec<_> = results
            .values()
            .flat_map(|side| side.new_damages.iter().cloned())
            .collect();
        let summary = build_summary(&new_damages);

        Ok((results, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::inference_client::InferenceError;

    #[test]
    fn test_error_categories() {
        let inference = AssessmentError::from(DetectionError::Inference {
            model_id: "m/1".to_string(),
            source: InferenceError::Api(500, "down".to_string()),
        });
        assert_eq!(inference.category(), "InferenceError");
        assert_eq!(
            inference.persisted_message(),
            "InferenceError: model m/1 failed: API error 500: down"
        );

        let shape = AssessmentError::InputShape("no sides".to_string());
        assert_eq!(shape.persisted_message(), "InputShapeError: no sides");

        let fusion = AssessmentError::from(DetectionError::Fusion("panicked".to_string()));
        assert_eq!(fusion.category(), "WorkerError");

        let store = AssessmentError::from(vdas_common::Error::Internal("x".to_string()));
        assert_eq!(store.category(), "StoreError");
    }
}
