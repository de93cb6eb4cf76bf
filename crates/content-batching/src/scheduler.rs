//! Flush timer abstraction.

use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Work run when a flush timer fires.
pub type FlushTask = BoxFuture<'static, ()>;

/// One-shot, cancellable timer.
///
/// At most one task is armed at a time: arming again replaces the previous
/// task without running it.
pub trait FlushScheduler: Send + Sync {
    /// Runs `task` once after `delay`.
    fn arm(&self, delay: Duration, task: FlushTask);

    /// Drops the armed task, if any. A task that has already started is
    /// left to finish.
    fn cancel(&self);

    fn is_armed(&self) -> bool;
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// [`FlushScheduler`] backed by `tokio::time::sleep`.
pub struct TokioFlushScheduler {
    runtime: Handle,
    slot: Arc<Mutex<TimerSlot>>,
}

impl TokioFlushScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    fn lock(slot: &Mutex<TimerSlot>) -> MutexGuard<'_, TimerSlot> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FlushScheduler for TokioFlushScheduler {
    fn arm(&self, delay: Duration, task: FlushTask) {
        let mut slot = Self::lock(&self.slot);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        // Spawned while holding the slot lock, so the task cannot observe
        // the slot before its own handle is stored.
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = Self::lock(&shared);
                if slot.generation != generation {
                    return;
                }
                // Disarm before running so the task can cancel or re-arm
                // without aborting itself.
                slot.handle = None;
            }
            task.await;
        });
        slot.handle = Some(handle);
    }

    fn cancel(&self) {
        let mut slot = Self::lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        Self::lock(&self.slot)
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokioFlushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct ArmedTask {
    delay: Duration,
    task: FlushTask,
}

/// [`FlushScheduler`] that only fires when told to. For tests and hosts
/// that drive flushing from their own clock.
#[derive(Default)]
pub struct ManualFlushScheduler {
    armed: Mutex<Option<ArmedTask>>,
    arm_count: Mutex<usize>,
}

impl ManualFlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn armed(&self) -> MutexGuard<'_, Option<ArmedTask>> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay of the currently armed task.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.armed().as_ref().map(|armed| armed.delay)
    }

    /// How many times `arm` has been called.
    pub fn arm_count(&self) -> usize {
        *self.arm_count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the armed task now. Returns false if nothing was armed.
    pub async fn fire(&self) -> bool {
        let armed = self.armed().take();
        match armed {
            Some(armed) => {
                armed.task.await;
                true
            }
            None => false,
        }
    }
}

impl FlushScheduler for ManualFlushScheduler {
    fn arm(&self, delay: Duration, task: FlushTask) {
        *self.armed() = Some(ArmedTask { delay, task });
        *self.arm_count.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
    }

    fn cancel(&self) {
        self.armed().take();
    }

    fn is_armed(&self) -> bool {
        self.armed().is_some()
    }
}
