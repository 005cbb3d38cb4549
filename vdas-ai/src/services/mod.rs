//! Service modules for the assessment workflow

pub mod annotator;
pub mod assessment_orchestrator;
pub mod damage_comparator;
pub mod damage_detector;
pub mod inference_client;
pub mod object_storage;
pub mod retention;
pub mod summary;
pub mod upload_intake;

pub use assessment_orchestrator::{AssessmentError, AssessmentOrchestrator};
pub use damage_comparator::{compare, ComparisonParams};
pub use damage_detector::{DamageDetector, DetectionError, DetectionModels};
pub use inference_client::{HostedInferenceClient, InferenceError, InferenceProvider, InferenceResponse};
pub use object_storage::{LocalObjectStorage, ObjectStorage, StorageError};
pub use upload_intake::{IntakeError, SideUpload, UploadedImage};
