//! Batch coordinator: decides when buffered events are flushed.

use crate::dispatch::BatchCallbacks;
use crate::event::{AssetEvent, ContentEvent, ExperienceEvent};
use crate::queue::{PersistentHitQueue, ReplaySummary};
use crate::scheduler::{FlushScheduler, TokioFlushScheduler};
use crate::{BatchError, BatchResult};
use futures_util::FutureExt;
use hit_store::{HitStore, MemoryHitStore, SqliteHitStore};
use pipeline_config_and_utils::BatchingConfig;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a flush ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Pending events reached the batch size.
    BatchFull,
    /// The oldest pending event waited longer than the max wait time.
    MaxWaitElapsed,
    /// The flush timer fired.
    Timer,
    /// Batching is off, every event is flushed immediately.
    BatchingDisabled,
    /// A configuration update required flushing first.
    ConfigurationChanged,
    /// Requested by the host.
    Manual,
    /// The coordinator is closing.
    Shutdown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BatchFull => "batch_full",
            Self::MaxWaitElapsed => "max_wait_elapsed",
            Self::Timer => "timer",
            Self::BatchingDisabled => "batching_disabled",
            Self::ConfigurationChanged => "configuration_changed",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Pending event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub assets: usize,
    pub experiences: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.assets + self.experiences
    }
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub reason: FlushReason,
    pub delivered_assets: usize,
    pub delivered_experiences: usize,
    pub failed_assets: usize,
    pub failed_experiences: usize,
}

impl FlushReport {
    fn new(reason: FlushReason) -> Self {
        Self {
            reason,
            delivered_assets: 0,
            delivered_experiences: 0,
            failed_assets: 0,
            failed_experiences: 0,
        }
    }

    pub fn delivered(&self) -> usize {
        self.delivered_assets + self.delivered_experiences
    }

    pub fn failed(&self) -> usize {
        self.failed_assets + self.failed_experiences
    }
}

/// Replay results for both queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub assets: ReplaySummary,
    pub experiences: ReplaySummary,
}

struct CoordinatorState {
    config: BatchingConfig,
    window_started_at: Option<Instant>,
    closed: bool,
}

impl CoordinatorState {
    fn flush_reason(&self, pending: PendingCounts) -> Option<FlushReason> {
        if pending.total() == 0 {
            return None;
        }
        if !self.config.batching_enabled {
            return Some(FlushReason::BatchingDisabled);
        }
        if pending.total() >= self.config.max_batch_size() {
            return Some(FlushReason::BatchFull);
        }
        let waited_too_long = self
            .window_started_at
            .is_some_and(|started| started.elapsed() >= self.config.max_wait_time());
        waited_too_long.then_some(FlushReason::MaxWaitElapsed)
    }
}

struct Inner {
    assets: PersistentHitQueue<AssetEvent>,
    experiences: PersistentHitQueue<ExperienceEvent>,
    scheduler: Arc<dyn FlushScheduler>,
    callbacks: RwLock<Option<Arc<dyn BatchCallbacks>>>,
    state: Mutex<CoordinatorState>,
    /// Held for the whole of a flush, callbacks included.
    flush_lock: tokio::sync::Mutex<()>,
}

/// Buffers asset and experience events durably and hands them to the
/// registered [`BatchCallbacks`] in batches.
///
/// A flush happens when any of these holds:
///
/// - pending events reach `max_batch_size`
/// - the flush timer, armed by the first event of a window, fires
/// - the first event of the window is older than the max wait time
/// - batching is disabled
///
/// Events are removed from the durable stores only after the callback for
/// their batch succeeded. A failed callback puts the batch back in front of
/// newer events.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

impl BatchCoordinator {
    pub fn new(
        config: BatchingConfig,
        asset_store: Box<dyn HitStore>,
        experience_store: Box<dyn HitStore>,
        scheduler: Arc<dyn FlushScheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                assets: PersistentHitQueue::new("assets", asset_store),
                experiences: PersistentHitQueue::new("experiences", experience_store),
                scheduler,
                callbacks: RwLock::new(None),
                state: Mutex::new(CoordinatorState {
                    config,
                    window_started_at: None,
                    closed: false,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Opens SQLite-backed queues at the given paths with a tokio timer.
    ///
    /// A queue file that cannot be opened is replaced by an in-memory store.
    pub fn open(
        config: BatchingConfig,
        asset_queue: &Path,
        experience_queue: &Path,
        runtime: Handle,
    ) -> Self {
        Self::new(
            config,
            open_store(asset_queue),
            open_store(experience_queue),
            Arc::new(TokioFlushScheduler::new(runtime)),
        )
    }

    /// Replays both durable queues and resumes batching of recovered events.
    pub async fn start(&self) -> BatchResult<RecoverySummary> {
        self.inner.start().await
    }

    pub fn set_callbacks(&self, callbacks: Arc<dyn BatchCallbacks>) {
        *self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(callbacks);
    }

    /// Persists, buffers and counts an event, flushing if a threshold is hit.
    ///
    /// An event whose id is already queued is ignored.
    pub async fn add_event(&self, event: impl Into<ContentEvent>) -> BatchResult<()> {
        self.inner.add_event(event.into()).await
    }

    /// Flushes everything pending now.
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush(FlushReason::Manual).await
    }

    pub async fn update_configuration(&self, config: BatchingConfig) {
        self.inner.update_configuration(config).await
    }

    /// Discards every pending event, in memory and on disk.
    pub async fn clear_pending_batch(&self) -> BatchResult<()> {
        self.inner.clear_pending_batch().await
    }

    /// Flushes pending work, stops accepting events and releases the
    /// queue stores. Undelivered records stay on disk for the next start.
    pub async fn close(&self) -> FlushReport {
        self.inner.close().await
    }

    /// Events buffered in memory and waiting for a flush.
    pub fn pending_counts(&self) -> PendingCounts {
        self.inner.pending()
    }

    pub fn config(&self) -> BatchingConfig {
        self.inner.lock_state().config.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Records currently held by the durable stores.
    pub fn stored_counts(&self) -> BatchResult<PendingCounts> {
        Ok(PendingCounts {
            assets: self.inner.assets.stored_count()?,
            experiences: self.inner.experiences.stored_count()?,
        })
    }
}

fn open_store(path: &Path) -> Box<dyn HitStore> {
    match SqliteHitStore::open(path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to open queue file, events will not survive a restart"
            );
            Box::new(MemoryHitStore::new())
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts are read from the accumulators, so they always match what a
    /// flush would drain.
    fn pending(&self) -> PendingCounts {
        PendingCounts {
            assets: self.assets.accumulator().len(),
            experiences: self.experiences.accumulator().len(),
        }
    }

    fn callbacks(&self) -> Option<Arc<dyn BatchCallbacks>> {
        self.callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs store work on the blocking pool.
    async fn blocking<R, F>(self: &Arc<Self>, f: F) -> BatchResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Inner) -> R + Send + 'static,
    {
        let inner = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| BatchError::Task(e.to_string()))
    }

    fn arm_timer(self: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(self);
        self.scheduler.arm(
            delay,
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timer().await;
                }
            }
            .boxed(),
        );
    }

    /// Opens a batching window if none is open.
    fn start_window(self: &Arc<Self>, state: &mut CoordinatorState) {
        if state.window_started_at.is_some() {
            return;
        }
        state.window_started_at = Some(Instant::now());
        if state.config.batching_enabled && !state.closed {
            self.arm_timer(state.config.flush_interval());
        }
    }

    async fn start(self: &Arc<Self>) -> BatchResult<RecoverySummary> {
        let summary = self
            .blocking(|inner| RecoverySummary {
                assets: inner.assets.replay(),
                experiences: inner.experiences.replay(),
            })
            .await?;

        let reason = {
            let mut state = self.lock_state();
            let pending = self.pending();
            if pending.total() > 0 {
                self.start_window(&mut state);
            }
            state.flush_reason(pending)
        };

        info!(
            recovered_assets = summary.assets.recovered,
            recovered_experiences = summary.experiences.recovered,
            "Batch coordinator started"
        );

        if let Some(reason) = reason {
            self.flush(reason).await;
        }
        Ok(summary)
    }

    async fn add_event(self: &Arc<Self>, event: ContentEvent) -> BatchResult<()> {
        let closed = self.lock_state().closed;
        if closed {
            return Err(BatchError::Closed);
        }

        let accepted = self
            .blocking(move |inner| match event {
                ContentEvent::Asset(e) => inner.assets.persist(e),
                ContentEvent::Experience(e) => inner.experiences.persist(e),
            })
            .await??;
        if !accepted {
            return Ok(());
        }

        let reason = {
            let mut state = self.lock_state();
            self.start_window(&mut state);
            state.flush_reason(self.pending())
        };

        if let Some(reason) = reason {
            self.flush(reason).await;
        }
        Ok(())
    }

    async fn on_timer(self: Arc<Self>) {
        {
            let mut state = self.lock_state();
            if self.pending().total() == 0 {
                state.window_started_at = None;
                return;
            }
        }
        self.flush(FlushReason::Timer).await;
    }

    async fn flush(self: &Arc<Self>, reason: FlushReason) -> FlushReport {
        let _flushing = self.flush_lock.lock().await;
        let mut report = FlushReport::new(reason);

        let Some(callbacks) = self.callbacks() else {
            warn!(%reason, "No batch callbacks registered, keeping events queued");
            return report;
        };

        let (assets, experiences) = {
            let mut state = self.lock_state();
            let assets = self.assets.accumulator().drain_all();
            let experiences = self.experiences.accumulator().drain_all();
            state.window_started_at = None;
            self.scheduler.cancel();
            (assets, experiences)
        };

        if assets.is_empty() && experiences.is_empty() {
            return report;
        }

        info!(
            %reason,
            assets = assets.len(),
            experiences = experiences.len(),
            "Flushing batch"
        );

        let (asset_result, experience_result) = tokio::join!(
            async {
                if assets.is_empty() {
                    Ok(())
                } else {
                    callbacks.on_asset_batch(assets.clone()).await
                }
            },
            async {
                if experiences.is_empty() {
                    Ok(())
                } else {
                    callbacks.on_experience_batch(experiences.clone()).await
                }
            }
        );

        match asset_result {
            Ok(()) => {
                self.assets.accumulator().mark_confirmed(&assets);
                report.delivered_assets = assets.len();
            }
            Err(e) => {
                warn!(count = assets.len(), error = %e, "Asset batch callback failed, will retry");
                report.failed_assets = self.assets.accumulator().requeue(assets);
            }
        }

        match experience_result {
            Ok(()) => {
                self.experiences.accumulator().mark_confirmed(&experiences);
                report.delivered_experiences = experiences.len();
            }
            Err(e) => {
                warn!(count = experiences.len(), error = %e, "Experience batch callback failed, will retry");
                report.failed_experiences = self.experiences.accumulator().requeue(experiences);
            }
        }

        if report.failed() > 0 {
            let mut state = self.lock_state();
            self.start_window(&mut state);
        }

        if report.delivered() > 0 {
            self.remove_confirmed().await;
        }

        debug!(
            %reason,
            delivered = report.delivered(),
            failed = report.failed(),
            "Flush finished"
        );
        report
    }

    /// Replays both queues so confirmed records leave the stores.
    async fn remove_confirmed(self: &Arc<Self>) {
        let summary = self
            .blocking(|inner| RecoverySummary {
                assets: inner.assets.replay(),
                experiences: inner.experiences.replay(),
            })
            .await;

        match summary {
            Ok(summary) => {
                let recovered = summary.assets.recovered + summary.experiences.recovered;
                if recovered > 0 {
                    let mut state = self.lock_state();
                    self.start_window(&mut state);
                }
            }
            Err(e) => warn!(error = %e, "Failed to remove confirmed records"),
        }
    }

    async fn update_configuration(self: &Arc<Self>, config: BatchingConfig) {
        let flush_first = {
            let state = self.lock_state();
            let pending = self.pending().total();
            let shrinking = config.max_batch_size() < pending;
            let disabling = state.config.batching_enabled && !config.batching_enabled;
            pending > 0 && (shrinking || disabling)
        };

        if flush_first {
            self.flush(FlushReason::ConfigurationChanged).await;
        }

        let (reason, batching_enabled) = {
            let mut state = self.lock_state();
            let interval_changed = state.config.flush_interval() != config.flush_interval();
            state.config = config;

            if !state.config.batching_enabled {
                self.scheduler.cancel();
            } else if state.window_started_at.is_some()
                && !state.closed
                && (interval_changed || !self.scheduler.is_armed())
            {
                self.arm_timer(state.config.flush_interval());
            }
            (state.flush_reason(self.pending()), state.config.batching_enabled)
        };

        info!(batching_enabled, "Batching configuration updated");

        if let Some(reason) = reason {
            self.flush(reason).await;
        }
    }

    async fn clear_pending_batch(self: &Arc<Self>) -> BatchResult<()> {
        self.blocking(|inner| {
            let mut state = inner.lock_state();
            state.window_started_at = None;
            inner.scheduler.cancel();
            inner.assets.clear()?;
            inner.experiences.clear()
        })
        .await??;

        info!("Cleared pending batch");
        Ok(())
    }

    async fn close(self: &Arc<Self>) -> FlushReport {
        self.lock_state().closed = true;
        let report = self.flush(FlushReason::Shutdown).await;
        self.scheduler.cancel();

        let closed = self
            .blocking(|inner| (inner.assets.close(), inner.experiences.close()))
            .await;
        match closed {
            Ok((assets, experiences)) => {
                for (queue, result) in [("assets", assets), ("experiences", experiences)] {
                    if let Err(e) = result {
                        warn!(queue, error = %e, "Failed to close queue store");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to close queue stores"),
        }

        info!(delivered = report.delivered(), failed = report.failed(), "Batch coordinator closed");
        report
    }
}
