//! Background task draining the featurization queue.

use crate::processor::{Consent, FeaturizationHitProcessor, ProcessOutcome};
use crate::{FeaturizationError, FeaturizationHit, FeaturizationResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wait after an unexpected processing error (store failure).
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wake-up channel capacity. One pending wake-up is enough.
const NOTIFY_CAPACITY: usize = 1;

/// Drives a [`FeaturizationHitProcessor`] from a tokio task.
///
/// The task processes hits until the queue is idle or paused, then sleeps
/// until [`notify`](Self::notify) is called. When the head hit asks for a
/// retry the task sleeps for the backoff delay instead.
pub struct FeaturizationWorker {
    processor: Arc<FeaturizationHitProcessor>,
    sender: mpsc::Sender<()>,
    receiver: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FeaturizationWorker {
    pub fn new(processor: Arc<FeaturizationHitProcessor>) -> Self {
        let (sender, receiver) = mpsc::channel(NOTIFY_CAPACITY);
        Self {
            processor,
            sender,
            receiver: Mutex::new(Some(receiver)),
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<FeaturizationHitProcessor> {
        &self.processor
    }

    /// Spawns the worker task. Fails if already started.
    pub fn start(&self) -> FeaturizationResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| FeaturizationError::Config("featurization worker already started".into()))?;

        let processor = Arc::clone(&self.processor);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            info!("Featurization worker started");
            loop {
                match drain(&processor).await {
                    // Wake-ups are ignored during backoff: the head hit
                    // blocks everything queued behind it.
                    Some(delay) => tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = tokio::time::sleep(delay) => {}
                    },
                    None => tokio::select! {
                        _ = shutdown.notified() => break,
                        message = receiver.recv() => {
                            if message.is_none() {
                                break;
                            }
                        }
                    },
                }
            }
            info!("Featurization worker stopped");
        });

        *self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        Ok(())
    }

    /// Wakes the worker.
    pub fn notify(&self) {
        if let Err(err) = self.sender.try_send(()) {
            debug!(error = %err, "Featurization worker already notified");
        }
    }

    /// Queues a hit and wakes the worker.
    pub fn queue(&self, hit: FeaturizationHit) -> FeaturizationResult<bool> {
        let queued = self.processor.queue(hit)?;
        if queued {
            self.notify();
        }
        Ok(queued)
    }

    /// Updates consent and wakes the worker so a grant takes effect now.
    pub async fn set_consent(&self, consent: Consent) -> FeaturizationResult<()> {
        self.processor.set_consent(consent).await?;
        self.notify();
        Ok(())
    }

    /// Stops the worker task and waits for it to finish its current hit.
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Featurization worker task failed");
            }
        }
    }
}

/// Processes hits until there is nothing to do now. Returns how long to
/// wait before trying again, or `None` to wait for a notification.
async fn drain(processor: &FeaturizationHitProcessor) -> Option<Duration> {
    loop {
        match processor.process_next().await {
            Ok(ProcessOutcome::Done) | Ok(ProcessOutcome::Dropped(_)) => continue,
            Ok(ProcessOutcome::Idle) | Ok(ProcessOutcome::Paused) => return None,
            Ok(ProcessOutcome::Retry { delay, .. }) => return Some(delay),
            Err(e) => {
                warn!(error = %e, "Featurization processing failed");
                return Some(ERROR_RETRY_DELAY);
            }
        }
    }
}
