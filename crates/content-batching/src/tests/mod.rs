//! Integration tests for the batching pipeline.
//!
//! - `thresholds.rs`    - size, timer, max-wait and disabled-batching flushes
//! - `recovery.rs`      - crash safety and replay against SQLite queues
//! - `failures.rs`      - callback failures and retries
//! - `configuration.rs` - live configuration updates, clear and close

mod failures;

use crate::{
    AssetEvent, BatchCallbacks, BatchCoordinator, BatchError, BatchResult, ExperienceEvent,
    FlushScheduler, ManualFlushScheduler,
};
use async_trait::async_trait;
use hit_store::MemoryHitStore;
use pipeline_config_and_utils::BatchingConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every batch it receives. Fails the next `fail_next` calls.
#[derive(Default)]
pub(crate) struct RecordingCallbacks {
    assets: Mutex<Vec<Vec<AssetEvent>>>,
    experiences: Mutex<Vec<Vec<ExperienceEvent>>>,
    fail_next: AtomicUsize,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, calls: usize) {
        self.fail_next.store(calls, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn asset_batches(&self) -> Vec<Vec<AssetEvent>> {
        self.assets.lock().unwrap().clone()
    }

    pub fn experience_batches(&self) -> Vec<Vec<ExperienceEvent>> {
        self.experiences.lock().unwrap().clone()
    }

    pub fn delivered_asset_ids(&self) -> Vec<String> {
        self.asset_batches()
            .into_iter()
            .flatten()
            .map(|e| e.id)
            .collect()
    }
}

#[async_trait]
impl BatchCallbacks for RecordingCallbacks {
    async fn on_asset_batch(&self, events: Vec<AssetEvent>) -> BatchResult<()> {
        if self.should_fail() {
            return Err(BatchError::Callback("injected asset failure".into()));
        }
        self.assets.lock().unwrap().push(events);
        Ok(())
    }

    async fn on_experience_batch(&self, events: Vec<ExperienceEvent>) -> BatchResult<()> {
        if self.should_fail() {
            return Err(BatchError::Callback("injected experience failure".into()));
        }
        self.experiences.lock().unwrap().push(events);
        Ok(())
    }
}

pub(crate) fn batching(max_batch_size: usize, flush_interval_ms: u64) -> BatchingConfig {
    BatchingConfig {
        batching_enabled: true,
        max_batch_size,
        flush_interval_ms,
        max_wait_multiplier: 2.5,
    }
}

/// Coordinator over in-memory stores with a timer that only fires on demand.
pub(crate) fn manual_coordinator(
    config: BatchingConfig,
) -> (BatchCoordinator, Arc<ManualFlushScheduler>, Arc<RecordingCallbacks>) {
    let scheduler = Arc::new(ManualFlushScheduler::new());
    let callbacks = RecordingCallbacks::new();
    let coordinator = BatchCoordinator::new(
        config,
        Box::new(MemoryHitStore::new()),
        Box::new(MemoryHitStore::new()),
        scheduler.clone() as Arc<dyn FlushScheduler>,
    );
    coordinator.set_callbacks(callbacks.clone());
    (coordinator, scheduler, callbacks)
}

/// Basic workflow: add, flush, confirm, stores drained.
#[tokio::test]
async fn basic_workflow() {
    let (coordinator, _scheduler, callbacks) = manual_coordinator(batching(10, 2_000));

    coordinator
        .add_event(AssetEvent::view("https://cdn.example.com/a.png"))
        .await
        .unwrap();
    coordinator
        .add_event(ExperienceEvent::click("exp-1"))
        .await
        .unwrap();

    let pending = coordinator.pending_counts();
    assert_eq!((pending.assets, pending.experiences), (1, 1));
    assert_eq!(coordinator.stored_counts().unwrap().total(), 2);

    let report = coordinator.flush().await;
    assert_eq!(report.delivered(), 2);
    assert_eq!(callbacks.asset_batches().len(), 1);
    assert_eq!(callbacks.experience_batches().len(), 1);
    assert_eq!(coordinator.pending_counts().total(), 0);
    assert_eq!(coordinator.stored_counts().unwrap().total(), 0);
}

#[tokio::test]
async fn duplicate_event_is_counted_once() {
    let (coordinator, _scheduler, callbacks) = manual_coordinator(batching(10, 2_000));
    let event = AssetEvent::view("https://a");

    coordinator.add_event(event.clone()).await.unwrap();
    coordinator.add_event(event.clone()).await.unwrap();
    assert_eq!(coordinator.pending_counts().assets, 1);
    assert_eq!(coordinator.stored_counts().unwrap().assets, 1);

    coordinator.flush().await;
    assert_eq!(callbacks.delivered_asset_ids(), vec![event.id]);
}

#[tokio::test]
async fn without_callbacks_events_stay_queued() {
    let scheduler = Arc::new(ManualFlushScheduler::new());
    let coordinator = BatchCoordinator::new(
        batching(10, 2_000),
        Box::new(MemoryHitStore::new()),
        Box::new(MemoryHitStore::new()),
        scheduler as Arc<dyn FlushScheduler>,
    );

    coordinator.add_event(AssetEvent::view("https://a")).await.unwrap();
    let report = coordinator.flush().await;

    assert_eq!(report.delivered(), 0);
    assert_eq!(coordinator.pending_counts().assets, 1);
    assert_eq!(coordinator.stored_counts().unwrap().assets, 1);

    let callbacks = RecordingCallbacks::new();
    coordinator.set_callbacks(callbacks.clone());
    assert_eq!(coordinator.flush().await.delivered(), 1);
    assert_eq!(callbacks.asset_batches().len(), 1);
}
