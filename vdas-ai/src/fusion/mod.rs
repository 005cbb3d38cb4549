//! Multi-detector damage fusion
//!
//! Combines the responses of several independent damage detectors for one image
//! into a single confirmed set, gated by a damage-severity detector.
//!
//! # Decision logic
//! 1. Normalize every detector response, dropping low-confidence predictions.
//! 2. No damage predictions at all, or no severity predictions: no damage.
//!    A missing severity signal overrides raw detector hits.
//! 3. Pool all damage predictions (detector order, then response order). Each
//!    pooled prediction's overlap cluster is resolved to its highest-confidence
//!    member (first in pool order on ties).
//! 4. Each pooled representative is emitted at most once, and representatives
//!    are deduplicated by `detection_id`. Empty ids are never marked seen, so
//!    distinct damages without ids are all kept.
//! 5. A representative is kept only when it overlaps a severity prediction
//!    (IoU > 0.5); that severity prediction's class becomes its severity.

mod normalize;

pub use normalize::normalize_predictions;

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::models::{Detection, FusedDetectionSet};

/// IoU a representative must exceed against a severity detection to be kept
pub const SEVERITY_OVERLAP_THRESHOLD: f64 = 0.5;

/// Fusion tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// IoU above which two pooled detections belong to the same cluster
    pub overlap_threshold: f64,
    /// Damage predictions below this confidence are dropped
    pub min_confidence: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
            min_confidence: 0.5,
        }
    }
}

/// Raw response of one named detector for one image
#[derive(Debug, Clone, Default)]
pub struct DetectorOutput {
    /// Model id that produced the predictions
    pub source: String,
    pub predictions: Vec<Value>,
}

impl DetectorOutput {
    pub fn new(source: impl Into<String>, predictions: Vec<Value>) -> Self {
        Self {
            source: source.into(),
            predictions,
        }
    }
}

/// Fuse damage detector outputs into one confirmed detection set
///
/// `detector_outputs` are the independent damage detectors, `severity_output`
/// the severity detector. All must describe the same image.
pub fn fuse(
    detector_outputs: &[DetectorOutput],
    severity_output: &DetectorOutput,
    params: &FusionParams,
) -> FusedDetectionSet {
    let normalized: Vec<Vec<Detection>> = detector_outputs
        .iter()
        .map(|output| normalize_predictions(&output.predictions, params.min_confidence))
        .collect();
    // Every severity prediction counts, whatever its confidence
    let severity = normalize_predictions(&severity_output.predictions, 0.0);

    if normalized.iter().all(Vec::is_empty) || severity.is_empty() {
        debug!(
            damage_predictions = normalized.iter().map(Vec::len).sum::<usize>(),
            severity_predictions = severity.len(),
            "No damage signal, returning empty detection set"
        );
        return Vec::new();
    }

    let pool: Vec<Detection> = normalized.into_iter().flatten().collect();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut emitted: HashSet<usize> = HashSet::new();
    let mut fused = Vec::new();

    for index in 0..pool.len() {
        let best = cluster_representative(&pool, index, params.overlap_threshold);
        if emitted.contains(&best) {
            continue;
        }
        let representative = &pool[best];
        let detection_id = representative.detection_id.as_str();

        if !detection_id.is_empty() && seen_ids.contains(detection_id) {
            continue;
        }

        let confirmation = severity
            .iter()
            .find(|s| representative.overlap(s) > SEVERITY_OVERLAP_THRESHOLD);

        if let Some(severity_detection) = confirmation {
            emitted.insert(best);
            if !detection_id.is_empty() {
                seen_ids.insert(detection_id);
            }
            let confirmed = if severity_detection.class_name.is_empty() {
                representative.clone()
            } else {
                representative.with_severity(severity_detection.class_name.as_str())
            };
            fused.push(confirmed);
        }
    }

    debug!(
        pooled = pool.len(),
        fused = fused.len(),
        "Fused damage detections"
    );

    fused
}

/// Pool index of the highest-confidence member of `pool[index]`'s overlap cluster
///
/// The cluster is `pool[index]` plus every pooled detection whose IoU with it
/// exceeds `overlap_threshold`, scanned in pool order; strict comparison keeps
/// the first maximal member.
fn cluster_representative(pool: &[Detection], index: usize, overlap_threshold: f64) -> usize {
    let anchor = &pool[index];
    let mut best: Option<usize> = None;

    for (j, candidate) in pool.iter().enumerate() {
        let in_cluster = j == index || anchor.overlap(candidate) > overlap_threshold;
        if !in_cluster {
            continue;
        }
        match best {
            Some(b) if candidate.confidence <= pool[b].confidence => {}
            _ => best = Some(j),
        }
    }

    best.unwrap_or(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn prediction(x: f64, y: f64, w: f64, h: f64, confidence: f64, class: &str, id: &str) -> Value {
        json!({
            "x": x, "y": y, "width": w, "height": h,
            "confidence": confidence, "class": class, "detection_id": id
        })
    }

    fn output(source: &str, predictions: Vec<Value>) -> DetectorOutput {
        DetectorOutput::new(source, predictions)
    }

    fn severity_over(x: f64, y: f64, w: f64, h: f64, class: &str) -> DetectorOutput {
        output("severity", vec![prediction(x, y, w, h, 0.3, class, "s1")])
    }

    #[test]
    fn test_empty_detectors_yield_empty_regardless_of_severity() {
        let fused = fuse(
            &[output("m1", vec![]), output("m2", vec![])],
            &severity_over(50.0, 50.0, 100.0, 100.0, "severe"),
            &FusionParams::default(),
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn test_low_confidence_only_counts_as_empty() {
        let fused = fuse(
            &[output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.2, "dent", "a")])],
            &severity_over(50.0, 50.0, 100.0, 100.0, "severe"),
            &FusionParams::default(),
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn test_missing_severity_signal_means_no_damage() {
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.95, "dent", "a")]),
                output("m2", vec![]),
            ],
            &output("severity", vec![]),
            &FusionParams::default(),
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn test_same_id_duplicate_keeps_higher_confidence() {
        // A: 100x100 at (50,50). Severity 100x60 inside A: IoU 0.6.
        // B: 100x90 inside A with the same id: IoU(A, B) = 0.9.
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", "dup")]),
                output("m2", vec![prediction(50.0, 50.0, 100.0, 90.0, 0.7, "dent", "dup")]),
            ],
            &severity_over(50.0, 50.0, 100.0, 60.0, "moderate"),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].confidence, 0.9);
        assert_eq!(fused[0].bbox.height, 100.0);
        assert_eq!(fused[0].severity.as_deref(), Some("moderate"));
    }

    #[test]
    fn test_cluster_member_with_other_id_collapses_to_representative() {
        // Two detectors report the same dent under different ids
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.6, "dent", "a")]),
                output("m2", vec![prediction(50.0, 50.0, 100.0, 95.0, 0.8, "dent", "b")]),
            ],
            &severity_over(50.0, 50.0, 100.0, 100.0, "minor"),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].detection_id, "b");
        assert_eq!(fused[0].confidence, 0.8);
    }

    #[test]
    fn test_unconfirmed_representative_dropped() {
        let fused = fuse(
            &[output(
                "m1",
                vec![
                    prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", "a"),
                    prediction(500.0, 500.0, 40.0, 40.0, 0.9, "scratch", "b"),
                ],
            )],
            &severity_over(50.0, 50.0, 100.0, 100.0, "severe"),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].detection_id, "a");
    }

    #[test]
    fn test_severity_overlap_must_exceed_half() {
        // Severity box 100x50 inside A: IoU exactly 0.5, not enough
        let fused = fuse(
            &[output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", "a")])],
            &severity_over(50.0, 50.0, 100.0, 50.0, "severe"),
            &FusionParams::default(),
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn test_confidence_tie_resolves_to_first_in_pool_order() {
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.8, "dent", "first")]),
                output("m2", vec![prediction(50.0, 50.0, 100.0, 95.0, 0.8, "dent", "second")]),
            ],
            &severity_over(50.0, 50.0, 100.0, 100.0, "minor"),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].detection_id, "first");
    }

    #[test]
    fn test_shared_representative_without_id_is_emitted_once() {
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", "")]),
                output("m2", vec![prediction(50.0, 50.0, 100.0, 98.0, 0.6, "dent", "")]),
            ],
            &severity_over(50.0, 50.0, 100.0, 100.0, "minor"),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].confidence, 0.9);
        assert_eq!(fused[0].severity.as_deref(), Some("minor"));
    }

    #[test]
    fn test_distinct_damages_without_ids_are_all_kept() {
        let fused = fuse(
            &[output(
                "m1",
                vec![
                    prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", ""),
                    prediction(400.0, 400.0, 60.0, 60.0, 0.8, "scratch", ""),
                ],
            )],
            &output(
                "severity",
                vec![
                    prediction(50.0, 50.0, 100.0, 100.0, 0.3, "minor", "s1"),
                    prediction(400.0, 400.0, 60.0, 60.0, 0.3, "severe", "s2"),
                ],
            ),
            &FusionParams::default(),
        );

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[1].severity.as_deref(), Some("severe"));
    }

    #[test]
    fn test_nan_box_cannot_pass_severity_gate() {
        let fused = fuse(
            &[output(
                "m1",
                vec![json!({
                    "x": "NaN", "y": 50, "width": 100, "height": 100,
                    "confidence": 0.9, "class": "dent", "detection_id": "a"
                })],
            )],
            &severity_over(50.0, 50.0, 100.0, 100.0, "severe"),
            &FusionParams::default(),
        );
        assert!(fused.is_empty());
    }

    #[test]
    fn test_first_matching_severity_supplies_label() {
        let severity = output(
            "severity",
            vec![
                prediction(500.0, 500.0, 10.0, 10.0, 0.9, "minor", "s0"),
                prediction(50.0, 50.0, 100.0, 100.0, 0.4, "severe", "s1"),
                prediction(50.0, 50.0, 100.0, 99.0, 0.9, "moderate", "s2"),
            ],
        );
        let fused = fuse(
            &[output("m1", vec![prediction(50.0, 50.0, 100.0, 100.0, 0.9, "dent", "a")])],
            &severity,
            &FusionParams::default(),
        );

        assert_eq!(fused[0].severity.as_deref(), Some("severe"));
    }

    #[test]
    fn test_preserves_pool_order() {
        let fused = fuse(
            &[
                output("m1", vec![prediction(50.0, 50.0, 20.0, 20.0, 0.7, "dent", "a")]),
                output("m2", vec![prediction(300.0, 300.0, 20.0, 20.0, 0.9, "scratch", "b")]),
            ],
            &output(
                "severity",
                vec![
                    prediction(300.0, 300.0, 20.0, 20.0, 0.5, "minor", "s1"),
                    prediction(50.0, 50.0, 20.0, 20.0, 0.5, "minor", "s2"),
                ],
            ),
            &FusionParams::default(),
        );

        let ids: Vec<&str> = fused.iter().map(|d| d.detection_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
