//! Data models for the assessment service

pub mod assessment;
pub mod detection;
pub mod side;

pub use assessment::{AssessmentJob, AssessmentResults, AssessmentStatus, AssessmentUpdate, SideAssessment};
pub use detection::{ComparisonResult, Detection, FusedDetectionSet};
pub use side::{parse_side_phase, ImagePhase, Side};
