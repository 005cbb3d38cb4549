//! Shared fixtures for vdas-ai integration tests
//!
//! - `MockProvider`: scripted inference provider that counts calls
//! - `TestEnv`: orchestrator over an in-memory store and temp-dir storage

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use vdas_ai::config::AssessmentSettings;
use vdas_ai::db::{self, AssessmentStore};
use vdas_ai::fusion::FusionParams;
use vdas_ai::models::{AssessmentJob, Side};
use vdas_ai::services::{
    AssessmentOrchestrator, DamageDetector, DetectionModels, InferenceError, InferenceProvider,
    InferenceResponse, LocalObjectStorage, ObjectStorage,
};

pub const DAMAGE_MODELS: [&str; 2] = ["damage-a/1", "damage-b/1"];
pub const SEVERITY_MODEL: &str = "severity/1";
pub const SEVERITY_LABEL: &str = "moderate";

/// Raw detector prediction
pub fn prediction(x: f64, y: f64, w: f64, h: f64, confidence: f64, class: &str, id: &str) -> Value {
    json!({
        "x": x, "y": y, "width": w, "height": h,
        "confidence": confidence, "class": class, "class_id": 0, "detection_id": id
    })
}

/// Inference provider answering from a script keyed by photo name
///
/// A photo's damage predictions are returned by every damage model; the
/// severity model returns the same boxes labelled [`SEVERITY_LABEL`].
#[derive(Default)]
pub struct MockProvider {
    /// `<side>-<phase>` → predictions
    script: HashMap<String, Vec<Value>>,
    fail_with: Option<(u16, String)>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_photo(mut self, name: &str, predictions: Vec<Value>) -> Self {
        self.script.insert(name.to_string(), predictions);
        self
    }

    pub fn failing(mut self, status: u16, body: &str) -> Self {
        self.fail_with = Some((status, body.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn infer(
        &self,
        image_url: &str,
        model_id: &str,
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((status, body)) = &self.fail_with {
            return Err(InferenceError::Api(*status, body.clone()));
        }

        let photo = image_url
            .rsplit('/')
            .next()
            .and_then(|file| file.split('.').next())
            .unwrap_or_default();
        let predictions = self.script.get(photo).cloned().unwrap_or_default();

        let predictions = if model_id == SEVERITY_MODEL {
            predictions
                .into_iter()
                .map(|mut p| {
                    p["class"] = json!(SEVERITY_LABEL);
                    p
                })
                .collect()
        } else {
            predictions
        };

        Ok(InferenceResponse { predictions })
    }
}

/// Current time at the precision the store persists (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Single-connection in-memory database with the assessment schema
pub async fn memory_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    db::init_tables(&pool).await.expect("Failed to create tables");
    pool
}

pub async fn memory_store() -> AssessmentStore {
    AssessmentStore::new(memory_pool().await, chrono::Duration::days(3))
}

/// Settings for tests: no annotation (fake image bytes do not decode)
pub fn test_settings() -> AssessmentSettings {
    AssessmentSettings {
        annotate: false,
        ..Default::default()
    }
}

pub struct TestEnv {
    pub orchestrator: AssessmentOrchestrator,
    pub store: AssessmentStore,
    pub storage: Arc<LocalObjectStorage>,
    pub provider: Arc<MockProvider>,
    pub objects_dir: TempDir,
}

pub async fn test_env(provider: MockProvider, settings: AssessmentSettings) -> TestEnv {
    let objects_dir = TempDir::new().expect("Failed to create temp dir");
    let store = memory_store().await;
    let storage = Arc::new(LocalObjectStorage::new(objects_dir.path(), "http://vdas.test"));
    let provider = Arc::new(provider);

    let detector = Arc::new(DamageDetector::new(
        provider.clone(),
        DetectionModels {
            damage_models: DAMAGE_MODELS.iter().map(|m| m.to_string()).collect(),
            severity_model: SEVERITY_MODEL.to_string(),
        },
        FusionParams::default(),
    ));
    let orchestrator = AssessmentOrchestrator::new(
        store.clone(),
        storage.clone() as Arc<dyn ObjectStorage>,
        detector,
        settings,
    );

    TestEnv {
        orchestrator,
        store,
        storage,
        provider,
        objects_dir,
    }
}

/// Store placeholder pickup and return photos for `sides`
pub async fn seed_photos(storage: &LocalObjectStorage, job_id: &str, sides: &[Side]) {
    for side in sides {
        for phase in ["pickup", "return"] {
            storage
                .upload(
                    b"not-really-a-jpeg".to_vec(),
                    &format!("{}/{}-{}.jpg", job_id, side, phase),
                    "image/jpeg",
                )
                .await
                .expect("Failed to seed photo");
        }
    }
}

/// Poll until the job reaches a terminal state
pub async fn wait_for_terminal(store: &AssessmentStore, job_id: &str) -> AssessmentJob {
    for _ in 0..200 {
        if let Some(job) = store.get(job_id).await.expect("store read failed") {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not reach a terminal state", job_id);
}
