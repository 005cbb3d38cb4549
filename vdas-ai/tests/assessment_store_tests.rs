//! Assessment store tests
//!
//! Merge-write semantics, expiry, and the conditional state-machine gates.

mod helpers;

use chrono::Duration;
use std::collections::BTreeMap;

use helpers::{memory_store, now as utc_now};
use vdas_ai::db::assessments::TIMED_OUT_ERROR;
use vdas_ai::models::{AssessmentStatus, AssessmentUpdate, Side, SideAssessment};

#[tokio::test]
async fn test_first_write_creates_pending_record_with_expiry() {
    let store = memory_store().await;
    let created = utc_now() - Duration::minutes(1);

    store.set("job-1", &AssessmentUpdate::pending(created)).await.unwrap();

    let job = store.get("job-1").await.unwrap().expect("record exists");
    assert_eq!(job.status, AssessmentStatus::Pending);
    assert_eq!(job.created_at, created);
    assert_eq!(job.expires_at, created + Duration::days(3));
    assert_eq!(job.run_token, 0);
    assert!(job.results.is_none());
}

#[tokio::test]
async fn test_write_without_status_defaults_to_pending() {
    let store = memory_store().await;

    store
        .set(
            "job-1",
            &AssessmentUpdate {
                summary: Some("x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let job = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, AssessmentStatus::Pending);
}

#[tokio::test]
async fn test_later_writes_merge_provided_fields_only() {
    let store = memory_store().await;
    let created = utc_now() - Duration::minutes(5);
    store.set("job-1", &AssessmentUpdate::pending(created)).await.unwrap();

    let later = utc_now();
    store
        .set(
            "job-1",
            &AssessmentUpdate {
                error: Some("boom".to_string()),
                created_at: Some(later),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let job = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, AssessmentStatus::Pending);
    assert_eq!(job.error.as_deref(), Some("boom"));
    // created_at and expiry never move
    assert_eq!(job.created_at, created);
    assert_eq!(job.expires_at, created + Duration::days(3));
}

#[tokio::test]
async fn test_expired_records_are_invisible() {
    let store = memory_store().await;
    let created = utc_now() - Duration::days(3) - Duration::seconds(1);
    store.set("old", &AssessmentUpdate::pending(created)).await.unwrap();

    assert!(store.get("old").await.unwrap().is_none());
    assert!(store.try_start("old", utc_now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_try_start_claims_once() {
    let store = memory_store().await;
    let now = utc_now();
    store.set("job-1", &AssessmentUpdate::pending(now)).await.unwrap();

    let first = store.try_start("job-1", now).await.unwrap();
    let second = store.try_start("job-1", now).await.unwrap();

    assert_eq!(first, Some(1));
    assert_eq!(second, None);

    let job = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, AssessmentStatus::InProgress);
    assert_eq!(job.started_at, Some(now));
    assert_eq!(job.run_token, 1);
}

#[tokio::test]
async fn test_try_start_missing_job() {
    let store = memory_store().await;
    assert!(store.try_start("nope", utc_now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_finish_run_requires_matching_token() {
    let store = memory_store().await;
    let now = utc_now();
    store.set("job-1", &AssessmentUpdate::pending(now)).await.unwrap();
    let token = store.try_start("job-1", now).await.unwrap().unwrap();

    let stale = store
        .finish_run("job-1", token + 1, &AssessmentUpdate::failed(now, "late"))
        .await
        .unwrap();
    assert!(!stale);

    let mut results = BTreeMap::new();
    results.insert(
        Side::Front,
        SideAssessment {
            side: Side::Front,
            pickup_image: "http://x/front-pickup.jpg".to_string(),
            return_image: "http://x/front-return.jpg".to_string(),
            annotated_return_image: None,
            new_damages: vec![],
            existing_damages: vec![],
            resolved_damages: vec![],
        },
    );
    let done = store
        .finish_run(
            "job-1",
            token,
            &AssessmentUpdate::completed(now, results.clone(), "The car is in good condition.".to_string()),
        )
        .await
        .unwrap();
    assert!(done);

    let job = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, AssessmentStatus::Completed);
    assert_eq!(job.results, Some(results));
    assert_eq!(job.completed_at, Some(now));
    assert!(job.error.is_none());

    // Terminal: a second finish is rejected
    assert!(!store
        .finish_run("job-1", token, &AssessmentUpdate::failed(now, "again"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_timed_out_job_rejects_late_completion() {
    let store = memory_store().await;
    let now = utc_now();
    store.set("job-1", &AssessmentUpdate::pending(now)).await.unwrap();
    let token = store.try_start("job-1", now).await.unwrap().unwrap();

    assert!(store.mark_timed_out("job-1", now).await.unwrap());
    assert!(!store.mark_timed_out("job-1", now).await.unwrap());

    let late = store
        .finish_run(
            "job-1",
            token,
            &AssessmentUpdate::completed(now, BTreeMap::new(), "late".to_string()),
        )
        .await
        .unwrap();
    assert!(!late);

    let job = store.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, AssessmentStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(TIMED_OUT_ERROR));
    assert!(job.summary.is_none());
}

#[tokio::test]
async fn test_mark_timed_out_ignores_pending_jobs() {
    let store = memory_store().await;
    store.set("job-1", &AssessmentUpdate::pending(utc_now())).await.unwrap();

    assert!(!store.mark_timed_out("job-1", utc_now()).await.unwrap());
    assert_eq!(
        store.get("job-1").await.unwrap().unwrap().status,
        AssessmentStatus::Pending
    );
}

#[tokio::test]
async fn test_purge_expired() {
    let store = memory_store().await;
    let now = utc_now();
    store
        .set("old", &AssessmentUpdate::pending(now - Duration::days(4)))
        .await
        .unwrap();
    store.set("fresh", &AssessmentUpdate::pending(now)).await.unwrap();

    let purged = store.purge_expired(now).await.unwrap();

    assert_eq!(purged, vec!["old".to_string()]);
    assert!(store.get("fresh").await.unwrap().is_some());
    assert!(store.purge_expired(now).await.unwrap().is_empty());
}
