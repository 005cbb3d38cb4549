//! Damage Comparator Service
//!
//! Matches the fused detections of a pickup photo against those of the return
//! photo of the same side and classifies every detection:
//! - **existing**: pickup damage still present at return
//! - **new**: damage only seen at return, or a pickup damage whose return
//!   confidence grew by more than [`WORSENED_CONFIDENCE_DELTA`]
//! - **resolved**: pickup damage with no counterpart at return
//!
//! Matching is greedy and pickup-first: each pickup detection claims the best
//! still-unclaimed return detection. No global assignment is attempted.

use crate::models::{ComparisonResult, Detection};

/// Confidence growth above which a matched damage counts as new
pub const WORSENED_CONFIDENCE_DELTA: f64 = 0.3;

/// Comparator tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonParams {
    /// Minimum IoU for a pickup/return pair to match
    pub overlap_threshold: f64,
    /// Only match detections with the same class name
    pub require_same_class: bool,
}

impl Default for ComparisonParams {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.3,
            require_same_class: true,
        }
    }
}

/// Classify pickup and return detections of one side
pub fn compare(
    pickup: &[Detection],
    returned: &[Detection],
    params: &ComparisonParams,
) -> ComparisonResult {
    let mut result = ComparisonResult::default();
    let mut claimed = vec![false; returned.len()];

    for pickup_detection in pickup {
        let mut best_match: Option<usize> = None;
        let mut best_overlap = 0.0;

        for (index, candidate) in returned.iter().enumerate() {
            if claimed[index] {
                continue;
            }
            if params.require_same_class && candidate.class_name != pickup_detection.class_name {
                continue;
            }

            let overlap = pickup_detection.overlap(candidate);
            if overlap >= params.overlap_threshold && overlap > best_overlap {
                best_overlap = overlap;
                best_match = Some(index);
            }
        }

        let Some(index) = best_match else {
            result.resolved_damages.push(pickup_detection.clone());
            continue;
        };

        claimed[index] = true;
        let delta = returned[index].confidence - pickup_detection.confidence;
        if delta > WORSENED_CONFIDENCE_DELTA {
            result
                .new_damages
                .push(pickup_detection.with_confidence(delta));
        } else {
            result.existing_damages.push(pickup_detection.clone());
        }
    }

    result.new_damages.extend(
        returned
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(detection, _)| detection.clone()),
    );

    result
}
