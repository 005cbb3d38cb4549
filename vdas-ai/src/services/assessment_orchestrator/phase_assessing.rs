//! Phase 2: ASSESSING
//!
//! Per side: detect damages on both photos concurrently, compare them on the
//! blocking pool, then render the annotated return photo. Any detection
//! failure fails the run; annotation failures only drop that side's render.

use futures::future::try_join;

use super::{AssessmentError, AssessmentOrchestrator, SidePair};
use crate::models::{AssessmentResults, SideAssessment};
use crate::services::annotator::annotate_side;
use crate::services::damage_comparator::compare;

impl AssessmentOrchestrator {
    /// Phase 2: ASSESSING - detect, compare and annotate every side
    pub(super) async fn phase_assessing(
        &self,
        job_id: &str,
        pairs: &[SidePair],
    ) -> Result<AssessmentResults, AssessmentError> {
        let mut results = AssessmentResults::new();

        for pair in pairs {
            let assessment = self.assess_side(job_id, pair).await?;
            results.insert(pair.side, assessment);
        }

        Ok(results)
    }

    async fn assess_side(&self, job_id: &str, pair: &SidePair) -> Result<SideAssessment, AssessmentError> {
        let pickup_url = self.storage.public_url(&pair.pickup_key);
        let return_url = self.storage.public_url(&pair.return_key);

        let (pickup, returned) = try_join(
            self.detector.detect(&pickup_url),
            self.detector.detect(&return_url),
        )
        .await?;

        let params = self.settings.comparison;
        let comparison = tokio::task::spawn_blocking(move || compare(&pickup, &returned, &params))
            .await
            .map_err(|e| AssessmentError::Worker(format!("Comparison task failed: {}", e)))?;

        tracing::info!(
            job_id,
            side = %pair.side,
            new = comparison.new_damages.len(),
            existing = comparison.existing_damages.len(),
            resolved = comparison.resolved_damages.len(),
            "Side assessed"
        );

        let annotated_return_image = if self.settings.annotate && !comparison.new_damages.is_empty() {
            match annotate_side(
                self.storage.clone(),
                job_id,
                pair.side,
                &pair.return_key,
                comparison.new_damages.clone(),
            )
            .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(job_id, side = %pair.side, error = %e, "Annotation skipped");
                    None
                }
            }
        } else {
            None
        };

        Ok(SideAssessment {
            side: pair.side,
            pickup_image: pickup_url,
            return_image: return_url,
            annotated_return_image,
            new_damages: comparison.new_damages,
            existing_damages: comparison.existing_damages,
            resolved_damages: comparison.resolved_damages,
        })
    }
}
