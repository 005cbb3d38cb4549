//! Retention sweeper
//!
//! Deletes expired assessment records and their stored images. Reads already
//! hide expired records, so the sweep only reclaims space.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::AssessmentStore;
use crate::services::object_storage::ObjectStorage;

/// Delete everything expired at `now`; returns the purged job ids
///
/// Object deletion failures are logged and do not stop the sweep.
pub async fn sweep_expired(
    store: &AssessmentStore,
    storage: &dyn ObjectStorage,
    now: DateTime<Utc>,
) -> vdas_common::Result<Vec<String>> {
    let purged = store.purge_expired(now).await?;

    for job_id in &purged {
        if let Err(e) = storage.delete_prefix(&format!("{}/", job_id)).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to delete expired objects");
        }
    }

    if !purged.is_empty() {
        tracing::info!(purged = purged.len(), "Retention sweep removed expired assessments");
    }

    Ok(purged)
}

/// Run [`sweep_expired`] every `interval` until the runtime shuts down
pub fn spawn_retention_sweeper(
    store: AssessmentStore,
    storage: Arc<dyn ObjectStorage>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&store, storage.as_ref(), Utc::now()).await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    })
}
