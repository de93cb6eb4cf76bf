//! Callback failures and retries.

use super::{batching, manual_coordinator};
use crate::{AssetEvent, ExperienceEvent, FlushScheduler};

#[tokio::test]
async fn failed_batch_stays_queued_and_is_retried() {
    let (coordinator, scheduler, callbacks) = manual_coordinator(batching(10, 2_000));
    let first = AssetEvent::view("https://first");
    let second = AssetEvent::click("https://second");
    coordinator.add_event(first.clone()).await.unwrap();
    coordinator.add_event(second.clone()).await.unwrap();

    callbacks.fail_next(1);
    let report = coordinator.flush().await;
    assert_eq!(report.failed_assets, 2);
    assert_eq!(report.delivered(), 0);
    assert_eq!(coordinator.pending_counts().assets, 2);
    assert_eq!(coordinator.stored_counts().unwrap().assets, 2);
    assert!(scheduler.is_armed(), "retry window opened");

    let third = AssetEvent::view("https://third");
    coordinator.add_event(third.clone()).await.unwrap();

    assert!(scheduler.fire().await);
    assert_eq!(
        callbacks.delivered_asset_ids(),
        vec![first.id, second.id, third.id],
        "failed events go before newer ones"
    );
    assert_eq!(coordinator.stored_counts().unwrap().assets, 0);
}

#[tokio::test]
async fn one_category_failing_does_not_block_the_other() {
    let (coordinator, _scheduler, callbacks) = manual_coordinator(batching(10, 2_000));
    coordinator.add_event(AssetEvent::view("https://a")).await.unwrap();
    coordinator.add_event(ExperienceEvent::view("exp-1")).await.unwrap();

    // Exactly one of the two concurrent callbacks fails.
    callbacks.fail_next(1);
    let report = coordinator.flush().await;
    assert_eq!(report.delivered(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(coordinator.pending_counts().total(), 1);
    assert_eq!(coordinator.stored_counts().unwrap().total(), 1);

    let report = coordinator.flush().await;
    assert_eq!(report.delivered(), 1);
    assert_eq!(callbacks.asset_batches().len(), 1);
    assert_eq!(callbacks.experience_batches().len(), 1);
    assert_eq!(coordinator.stored_counts().unwrap().total(), 0);
}

#[tokio::test]
async fn repeated_failures_never_lose_events() {
    let (coordinator, _scheduler, callbacks) = manual_coordinator(batching(10, 2_000));
    let event = ExperienceEvent::click("exp-7");
    coordinator.add_event(event.clone()).await.unwrap();

    callbacks.fail_next(3);
    for _ in 0..3 {
        assert_eq!(coordinator.flush().await.failed_experiences, 1);
    }
    assert_eq!(coordinator.flush().await.delivered_experiences, 1);

    let batches = callbacks.experience_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![event]);
}
