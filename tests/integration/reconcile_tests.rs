//! Integration tests for gated, sequenced slice refreshes.

use std::sync::Arc;
use std::time::Duration;

use checkup_sync::models::checkup::{CheckupId, CheckupStatus};
use checkup_sync::models::slice::SliceName;
use checkup_sync::sync::{RefreshMode, RefreshOutcome};
use checkup_sync::AppError;

use super::test_helpers::{checkup, queue_entry, Harness};

#[tokio::test]
async fn refresh_replaces_whole_slice() {
    let h = Harness::new();
    h.state
        .update_todays_checkups(|records| {
            records.push(checkup(1, "Local Only", CheckupStatus::Waiting));
            records.push(checkup(2, "Drifted", CheckupStatus::Ongoing));
        })
        .await;
    h.backend
        .set_todays(vec![checkup(2, "Drifted", CheckupStatus::Completed)]);

    let outcome = h
        .reconciler
        .refresh_todays_checkups(RefreshMode::Scheduled)
        .await
        .unwrap();

    assert_eq!(outcome, RefreshOutcome::Applied { count: 1 });
    let todays = h.state.todays_checkups().await;
    assert_eq!(todays.len(), 1);
    assert_eq!(todays[0].status, CheckupStatus::Completed);
}

#[tokio::test]
async fn failed_fetch_leaves_local_state_alone() {
    let h = Harness::new();
    h.state
        .update_queue(|queue| queue.push(queue_entry(1, "Kept", CheckupStatus::Waiting)))
        .await;
    h.backend.fail_fetches(true);

    let result = h.reconciler.refresh_queue(RefreshMode::Scheduled).await;

    assert!(matches!(result, Err(AppError::Network(_))));
    assert_eq!(h.state.queue().await.len(), 1);
    assert!(!h.reconciler.queue_gate().is_in_flight());

    // A background pass only logs the failure.
    h.reconciler.reconcile_pass(RefreshMode::Scheduled).await;
    assert_eq!(h.state.queue().await.len(), 1);
}

#[tokio::test]
async fn refresh_of_unreconciled_slice_is_not_found() {
    let h = Harness::new();
    let result = h
        .reconciler
        .refresh(SliceName::Patients, RefreshMode::Forced)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn scheduled_refresh_is_skipped_while_one_is_outstanding() {
    let h = Harness::new();
    h.backend.set_fetch_delay(Duration::from_secs(10));
    let reconciler = Arc::clone(&h.reconciler);
    let slow = tokio::spawn(async move { reconciler.refresh_queue(RefreshMode::Scheduled).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.reconciler.queue_gate().is_in_flight());
    let skipped = h
        .reconciler
        .refresh_queue(RefreshMode::Scheduled)
        .await
        .unwrap();
    assert_eq!(skipped, RefreshOutcome::SkippedInFlight);
    assert_eq!(h.backend.calls("fetch_queue"), 1);

    let finished = slow.await.unwrap().unwrap();
    assert_eq!(finished, RefreshOutcome::Applied { count: 0 });
    assert!(!h.reconciler.queue_gate().is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn late_response_does_not_overwrite_newer_one() {
    let h = Harness::new();
    h.backend
        .set_queue(vec![queue_entry(1, "Old Snapshot", CheckupStatus::Waiting)]);
    h.backend.set_fetch_delay(Duration::from_secs(10));

    let reconciler = Arc::clone(&h.reconciler);
    let slow = tokio::spawn(async move { reconciler.refresh_queue(RefreshMode::Scheduled).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.backend.set_fetch_delay(Duration::ZERO);
    h.backend
        .set_queue(vec![queue_entry(2, "New Snapshot", CheckupStatus::DoctorNotified)]);
    let forced = h.reconciler.refresh_queue(RefreshMode::Forced).await.unwrap();
    assert_eq!(forced, RefreshOutcome::Applied { count: 1 });

    let late = slow.await.unwrap().unwrap();
    assert_eq!(late, RefreshOutcome::Stale);

    let queue = h.state.queue().await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, CheckupId::from(2));
}
