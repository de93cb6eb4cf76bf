//! In-memory event accumulation with confirmation tracking.

use crate::event::BufferedEvent;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

struct AccumulatorState<T> {
    buffered: VecDeque<T>,
    buffered_ids: HashSet<String>,
    in_flight: HashSet<String>,
    confirmed: HashSet<String>,
    /// Ids without a durable record. Never confirmed, since no replay
    /// would ever remove the confirmation.
    memory_only: HashSet<String>,
}

impl<T> Default for AccumulatorState<T> {
    fn default() -> Self {
        Self {
            buffered: VecDeque::new(),
            buffered_ids: HashSet::new(),
            in_flight: HashSet::new(),
            confirmed: HashSet::new(),
            memory_only: HashSet::new(),
        }
    }
}

/// Buffers events between flushes.
///
/// Every event id is in at most one of three places:
///
/// - buffered: waiting for the next flush
/// - in flight: handed to a callback, outcome unknown
/// - confirmed: delivered, durable record not yet removed
///
/// An id present anywhere is rejected by [`Accumulator::add`], so replaying
/// the durable store never produces a duplicate delivery.
pub struct Accumulator<T> {
    state: Mutex<AccumulatorState<T>>,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(AccumulatorState::default()),
        }
    }
}

impl<T: BufferedEvent> Accumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AccumulatorState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Buffers an event. Returns false if the id is already known.
    pub fn add(&self, event: T) -> bool {
        self.insert(event, true)
    }

    /// Buffers an event whose durable write failed. It is forgotten once
    /// delivered instead of waiting for a record that does not exist.
    pub fn add_memory_only(&self, event: T) -> bool {
        self.insert(event, false)
    }

    fn insert(&self, event: T, durable: bool) -> bool {
        let mut state = self.lock();
        let id = event.event_id();
        if state.buffered_ids.contains(id)
            || state.in_flight.contains(id)
            || state.confirmed.contains(id)
        {
            return false;
        }
        state.buffered_ids.insert(id.to_string());
        if !durable {
            state.memory_only.insert(id.to_string());
        }
        state.buffered.push_back(event);
        true
    }

    /// True if the id is buffered, in flight or confirmed.
    pub fn contains(&self, id: &str) -> bool {
        let state = self.lock();
        state.buffered_ids.contains(id) || state.in_flight.contains(id) || state.confirmed.contains(id)
    }

    /// Takes every buffered event, oldest first, and marks them in flight.
    pub fn drain_all(&self) -> Vec<T> {
        let mut state = self.lock();
        let drained: Vec<T> = state.buffered.drain(..).collect();
        state.buffered_ids.clear();
        for event in &drained {
            state.in_flight.insert(event.event_id().to_string());
        }
        drained
    }

    /// Records delivered events as confirmed.
    ///
    /// Ids that are no longer in flight (the batch was cleared meanwhile)
    /// are ignored. Memory-only events are dropped outright.
    pub fn mark_confirmed(&self, events: &[T]) {
        let mut state = self.lock();
        for event in events {
            let id = event.event_id();
            if state.in_flight.remove(id) && !state.memory_only.remove(id) {
                state.confirmed.insert(id.to_string());
            }
        }
    }

    /// Puts undelivered events back at the front of the buffer, keeping
    /// their original order.
    pub fn requeue(&self, events: Vec<T>) -> usize {
        let mut state = self.lock();
        let mut restored = 0;
        for event in events.into_iter().rev() {
            if state.in_flight.remove(event.event_id()) {
                state.buffered_ids.insert(event.event_id().to_string());
                state.buffered.push_front(event);
                restored += 1;
            }
        }
        restored
    }

    pub fn is_confirmed(&self, id: &str) -> bool {
        self.lock().confirmed.contains(id)
    }

    /// Drops a confirmation once its durable record is gone.
    pub fn forget_confirmed(&self, id: &str) {
        self.lock().confirmed.remove(id);
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.lock().buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn confirmed_len(&self) -> usize {
        self.lock().confirmed.len()
    }

    /// Forgets everything, including in-flight and confirmed ids.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.buffered.clear();
        state.buffered_ids.clear();
        state.in_flight.clear();
        state.confirmed.clear();
        state.memory_only.clear();
    }
}
