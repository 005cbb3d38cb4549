//! Phase 1: PAIRING
//!
//! Finds the stored pickup and return photo of every side of a job. Objects
//! are named `<side>-<phase>[.ext]` under `<job id>/`; anything else under the
//! prefix (annotated renders included) is ignored.

use std::collections::BTreeMap;

use super::{AssessmentError, AssessmentOrchestrator};
use crate::models::{parse_side_phase, ImagePhase, Side};

/// Storage keys of one side's photos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidePair {
    pub side: Side,
    pub pickup_key: String,
    pub return_key: String,
}

impl AssessmentOrchestrator {
    /// Phase 1: PAIRING - list the job's objects and pair them by side
    pub(super) async fn phase_pairing(&self, job_id: &str) -> Result<Vec<SidePair>, AssessmentError> {
        let prefix = format!("{}/", job_id);
        let keys = self.storage.list(&prefix).await?;

        tracing::debug!(job_id, objects = keys.len(), "Phase 1: PAIRING");
        pair_side_keys(&prefix, &keys)
    }
}

/// Pair object keys under `prefix` into sides, in side order
pub(super) fn pair_side_keys(prefix: &str, keys: &[String]) -> Result<Vec<SidePair>, AssessmentError> {
    let mut by_side: BTreeMap<Side, (Option<&String>, Option<&String>)> = BTreeMap::new();

    for key in keys {
        let Some(name) = key.strip_prefix(prefix) else {
            continue;
        };
        let stem = name.split('.').next().unwrap_or_default();
        let Some((side, phase)) = parse_side_phase(stem) else {
            tracing::debug!(key = %key, "Ignoring object that is not a side photo");
            continue;
        };

        let slot = by_side.entry(side).or_default();
        match phase {
            ImagePhase::Pickup => slot.0 = Some(key),
            ImagePhase::Return => slot.1 = Some(key),
        }
    }

    let mut pairs = Vec::with_capacity(by_side.len());
    for (side, slot) in by_side {
        match slot {
            (Some(pickup), Some(ret)) => pairs.push(SidePair {
                side,
                pickup_key: pickup.clone(),
                return_key: ret.clone(),
            }),
            (None, _) => {
                return Err(AssessmentError::InputShape(format!(
                    "Side {} has no pickup image",
                    side
                )))
            }
            (_, None) => {
                return Err(AssessmentError::InputShape(format!(
                    "Side {} has no return image",
                    side
                )))
            }
        }
    }

    if pairs.is_empty() {
        return Err(AssessmentError::InputShape(
            "No side images found for assessment".to_string(),
        ));
    }

    Ok(pairs)
}
