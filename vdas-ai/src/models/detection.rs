//! Damage detection value types

use serde::{Deserialize, Serialize};

use crate::geometry::{overlap_ratio, BoundingBox};

/// One candidate damage instance on an image
///
/// Treated as an immutable value: the `with_*` methods return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Detector confidence (0.0-1.0)
    pub confidence: f64,
    /// Detector-local category id, -1 when the detector did not report one
    pub class_id: i64,
    /// Category label, comparable across detectors
    pub class_name: String,
    /// Id unique within one detector response, empty when not reported
    pub detection_id: String,
    /// Severity label, only set once a severity detection confirmed this box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl Detection {
    pub fn new(
        bbox: BoundingBox,
        confidence: f64,
        class_id: i64,
        class_name: impl Into<String>,
        detection_id: impl Into<String>,
    ) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.into(),
            detection_id: detection_id.into(),
            severity: None,
        }
    }

    pub fn with_severity(&self, severity: impl Into<String>) -> Self {
        Self {
            severity: Some(severity.into()),
            ..self.clone()
        }
    }

    pub fn with_confidence(&self, confidence: f64) -> Self {
        Self {
            confidence,
            ..self.clone()
        }
    }

    /// IoU between this detection's box and another's
    pub fn overlap(&self, other: &Detection) -> f64 {
        overlap_ratio(&self.bbox, &other.bbox)
    }
}

/// Post-fusion detections for one image, in fusion output order
pub type FusedDetectionSet = Vec<Detection>;

/// Pickup vs. return classification of detections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub new_damages: Vec<Detection>,
    pub existing_damages: Vec<Detection>,
    pub resolved_damages: Vec<Detection>,
}
