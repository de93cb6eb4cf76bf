//! In-memory hit store.

use crate::{HitRecord, HitStore, StoreError, StoreResult};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    records: VecDeque<HitRecord>,
    next_sequence: i64,
}

/// A hit store that keeps records in memory only.
///
/// Same ordering contract as [`crate::SqliteHitStore`]; nothing survives the
/// process. Used by tests and as the fallback when a queue file cannot be
/// opened.
#[derive(Debug, Default)]
pub struct MemoryHitStore {
    state: Mutex<MemoryState>,
}

impl MemoryHitStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> StoreResult<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(f(&mut state))
    }
}

impl HitStore for MemoryHitStore {
    fn append(&self, kind: &str, payload: &str) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.with_state(|state| {
            state.next_sequence += 1;
            state.records.push_back(HitRecord {
                sequence: state.next_sequence,
                id: id.clone(),
                kind: kind.to_string(),
                payload: payload.to_string(),
                created_at: Utc::now(),
            });
        })?;
        Ok(id)
    }

    fn peek_oldest(&self) -> StoreResult<Option<HitRecord>> {
        self.with_state(|state| state.records.front().cloned())
    }

    fn peek_batch(&self, limit: usize) -> StoreResult<Vec<HitRecord>> {
        self.with_state(|state| state.records.iter().take(limit).cloned().collect())
    }

    fn update_payload(&self, id: &str, payload: &str) -> StoreResult<()> {
        self.with_state(|state| {
            match state.records.iter_mut().find(|r| r.id == id) {
                Some(record) => {
                    record.payload = payload.to_string();
                    Ok(())
                }
                None => Err(StoreError::NotFound(id.to_string())),
            }
        })?
    }

    fn remove_oldest(&self) -> StoreResult<()> {
        self.with_state(|state| {
            state.records.pop_front();
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.with_state(|state| state.records.clear())
    }

    fn count(&self) -> StoreResult<usize> {
        self.with_state(|state| state.records.len())
    }
}
