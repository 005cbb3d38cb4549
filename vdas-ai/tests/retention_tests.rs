//! Retention sweep tests

mod helpers;

use chrono::Duration;

use helpers::{now, seed_photos, test_env, test_settings, MockProvider};
use vdas_ai::models::{AssessmentUpdate, Side};
use vdas_ai::services::retention::sweep_expired;
use vdas_ai::services::ObjectStorage;

#[tokio::test]
async fn test_sweep_removes_expired_records_and_objects() {
    let env = test_env(MockProvider::new(), test_settings()).await;
    let t0 = now();

    seed_photos(&env.storage, "old", &[Side::Front]).await;
    seed_photos(&env.storage, "fresh", &[Side::Front]).await;
    env.store
        .set("old", &AssessmentUpdate::pending(t0 - Duration::days(4)))
        .await
        .unwrap();
    env.store.set("fresh", &AssessmentUpdate::pending(t0)).await.unwrap();

    let purged = sweep_expired(&env.store, env.storage.as_ref(), t0).await.unwrap();

    assert_eq!(purged, vec!["old".to_string()]);
    assert!(env.storage.list("old/").await.unwrap().is_empty());
    assert_eq!(env.storage.list("fresh/").await.unwrap().len(), 2);
    assert!(env.store.get("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn test_sweep_with_nothing_expired() {
    let env = test_env(MockProvider::new(), test_settings()).await;
    env.store.set("job-1", &AssessmentUpdate::pending(now())).await.unwrap();

    let purged = sweep_expired(&env.store, env.storage.as_ref(), now()).await.unwrap();

    assert!(purged.is_empty());
}
