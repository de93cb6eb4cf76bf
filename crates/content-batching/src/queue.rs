//! Durable event queue with crash recovery.

use crate::accumulator::Accumulator;
use crate::event::BufferedEvent;
use crate::BatchResult;
use hit_store::{HitRecord, HitStore};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of one [`PersistentHitQueue::replay`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Confirmed records deleted from the head of the store.
    pub removed: usize,
    /// Unconfirmed records loaded back into memory.
    pub recovered: usize,
    /// Undecodable records deleted from the head of the store.
    pub dropped: usize,
}

/// Pairs a [`HitStore`] with an [`Accumulator`].
///
/// Every event is written to the store before it is buffered, and a record
/// is only removed after its event has been confirmed by a callback.
pub struct PersistentHitQueue<T> {
    name: &'static str,
    store: Box<dyn HitStore>,
    accumulator: Accumulator<T>,
    /// Serializes store mutations so `remove_oldest` always hits the
    /// record that was just inspected.
    io_lock: Mutex<()>,
}

impl<T: BufferedEvent> PersistentHitQueue<T> {
    pub fn new(name: &'static str, store: Box<dyn HitStore>) -> Self {
        Self {
            name,
            store,
            accumulator: Accumulator::new(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn accumulator(&self) -> &Accumulator<T> {
        &self.accumulator
    }

    fn io(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persists and buffers an event.
    ///
    /// Returns false for an id that is already queued. A store failure is
    /// logged and the event is buffered as memory-only, so delivery
    /// continues without crash safety for that event.
    pub fn persist(&self, event: T) -> BatchResult<bool> {
        let _io = self.io();
        if self.accumulator.contains(event.event_id()) {
            debug!(queue = self.name, event_id = event.event_id(), "Ignoring duplicate event");
            return Ok(false);
        }

        let payload = serde_json::to_string(&event)?;
        match self.store.append(T::KIND, &payload) {
            Ok(_) => Ok(self.accumulator.add(event)),
            Err(e) => {
                warn!(
                    queue = self.name,
                    event_id = event.event_id(),
                    error = %e,
                    "Failed to persist event, keeping it in memory only"
                );
                Ok(self.accumulator.add_memory_only(event))
            }
        }
    }

    fn decode(&self, record: &HitRecord) -> Option<T> {
        if record.kind != T::KIND {
            warn!(
                queue = self.name,
                record_id = %record.id,
                kind = %record.kind,
                "Unexpected record kind"
            );
            return None;
        }
        match serde_json::from_str(&record.payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(
                    queue = self.name,
                    record_id = %record.id,
                    error = %e,
                    "Failed to decode record"
                );
                None
            }
        }
    }

    /// Reconciles the store with the in-memory state.
    ///
    /// Deletes confirmed and undecodable records from the head of the store,
    /// stopping at the first unconfirmed one. Every unconfirmed record still
    /// in the store is then loaded into the accumulator unless its id is
    /// already known there. Store errors end the pass early; whatever is left
    /// is picked up by the next replay.
    pub fn replay(&self) -> ReplaySummary {
        let _io = self.io();
        let mut summary = ReplaySummary::default();

        loop {
            let record = match self.store.peek_oldest() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    warn!(queue = self.name, error = %e, "Failed to read queue head");
                    return summary;
                }
            };

            let confirmed_id = match self.decode(&record) {
                Some(event) if self.accumulator.is_confirmed(event.event_id()) => {
                    Some(event.event_id().to_string())
                }
                Some(_) => break,
                None => None,
            };

            if let Err(e) = self.store.remove_oldest() {
                warn!(queue = self.name, record_id = %record.id, error = %e, "Failed to remove record");
                return summary;
            }

            match confirmed_id {
                Some(id) => {
                    self.accumulator.forget_confirmed(&id);
                    summary.removed += 1;
                }
                None => summary.dropped += 1,
            }
        }

        let records = match self.store.peek_batch(usize::MAX) {
            Ok(records) => records,
            Err(e) => {
                warn!(queue = self.name, error = %e, "Failed to read queued records");
                return summary;
            }
        };

        for record in records {
            let Some(event) = self.decode(&record) else {
                continue;
            };
            if self.accumulator.add(event) {
                summary.recovered += 1;
            }
        }

        if summary.recovered > 0 || summary.dropped > 0 {
            info!(
                queue = self.name,
                removed = summary.removed,
                recovered = summary.recovered,
                dropped = summary.dropped,
                "Replayed queue"
            );
        } else if summary.removed > 0 {
            debug!(queue = self.name, removed = summary.removed, "Removed confirmed records");
        }

        summary
    }

    /// Discards buffered events and every stored record.
    pub fn clear(&self) -> BatchResult<()> {
        let _io = self.io();
        self.accumulator.clear();
        self.store.clear()?;
        Ok(())
    }

    /// Releases the store's handles.
    pub fn close(&self) -> BatchResult<()> {
        let _io = self.io();
        self.store.close()?;
        Ok(())
    }

    /// Number of records in the durable store.
    pub fn stored_count(&self) -> BatchResult<usize> {
        Ok(self.store.count()?)
    }
}
