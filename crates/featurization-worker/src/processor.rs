//! One-at-a-time processing of the featurization queue.

use crate::backoff::BackoffPolicy;
use crate::classify::{classify, FailureClass, Phase};
use crate::client::FeaturizationClient;
use crate::hit::{FeaturizationHit, FEATURIZATION_HIT_KIND};
use crate::{FeaturizationError, FeaturizationResult};
use hit_store::{HitRecord, HitStore};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Data collection consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    /// Hits are processed.
    Granted,
    /// Hits are queued but not sent.
    Pending,
    /// Queued hits are discarded and new ones refused.
    Denied,
}

/// Lifecycle of one queued hit.
///
/// `Pending -> Checking -> Registering | Done | Retrying | Dropped`,
/// `Registering -> Done | Retrying | Dropped`, `Retrying -> Pending` on the
/// next pass. `Done` and `Dropped` remove the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitState {
    Pending,
    Checking,
    Registering,
    Done,
    Retrying,
    Dropped,
}

impl fmt::Display for HitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Checking => "checking",
            Self::Registering => "registering",
            Self::Done => "done",
            Self::Retrying => "retrying",
            Self::Dropped => "dropped",
        };
        f.write_str(s)
    }
}

/// Why a record was removed without being registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The stored payload could not be decoded.
    Undecodable,
    /// The hit is missing required settings.
    Invalid(String),
    /// The service rejected the request permanently.
    Rejected(String),
}

/// Result of one [`FeaturizationHitProcessor::process_next`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing queued.
    Idle,
    /// Consent is not granted.
    Paused,
    /// The experience is registered; record removed.
    Done,
    /// Record removed without registering.
    Dropped(DropReason),
    /// Record kept; try again after `delay`.
    Retry { attempt: u32, delay: Duration },
}

/// Runs the check/register protocol against the head of a durable queue.
pub struct FeaturizationHitProcessor {
    client: Arc<dyn FeaturizationClient>,
    store: Box<dyn HitStore>,
    backoff: BackoffPolicy,
    consent: Mutex<Consent>,
    /// Experience ids queued by this process.
    queued: Mutex<HashSet<String>>,
    /// Held while the head record is being processed or the queue cleared.
    processing: tokio::sync::Mutex<()>,
}

impl FeaturizationHitProcessor {
    pub fn new(
        client: Arc<dyn FeaturizationClient>,
        store: Box<dyn HitStore>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            store,
            backoff,
            consent: Mutex::new(Consent::Granted),
            queued: Mutex::new(HashSet::new()),
            processing: tokio::sync::Mutex::new(()),
        }
    }

    fn queued(&self) -> MutexGuard<'_, HashSet<String>> {
        self.queued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn consent(&self) -> Consent {
        *self.consent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persists a registration request.
    ///
    /// Invalid hits fail with [`FeaturizationError::Config`] and are never
    /// stored. Returns false if the experience was already queued by this
    /// process.
    pub fn queue(&self, hit: FeaturizationHit) -> FeaturizationResult<bool> {
        hit.validate()?;
        if self.consent() == Consent::Denied {
            return Err(FeaturizationError::ConsentDenied);
        }

        let mut queued = self.queued();
        if queued.contains(&hit.experience_id) {
            debug!(experience_id = %hit.experience_id, "Experience already queued");
            return Ok(false);
        }

        let payload = serde_json::to_string(&hit)?;
        self.store.append(FEATURIZATION_HIT_KIND, &payload)?;
        queued.insert(hit.experience_id.clone());
        debug!(experience_id = %hit.experience_id, state = %HitState::Pending, "Queued featurization hit");
        Ok(true)
    }

    /// Updates consent. Denying consent discards the queue.
    pub async fn set_consent(&self, consent: Consent) -> FeaturizationResult<()> {
        *self.consent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = consent;
        info!(?consent, "Featurization consent updated");
        if consent == Consent::Denied {
            self.clear().await?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> FeaturizationResult<usize> {
        Ok(self.store.count()?)
    }

    /// Removes every queued hit.
    pub async fn clear(&self) -> FeaturizationResult<()> {
        let _processing = self.processing.lock().await;
        self.store.clear()?;
        self.queued().clear();
        Ok(())
    }

    /// Processes the oldest queued hit.
    pub async fn process_next(&self) -> FeaturizationResult<ProcessOutcome> {
        if self.consent() != Consent::Granted {
            return Ok(ProcessOutcome::Paused);
        }

        let _processing = self.processing.lock().await;
        let Some(record) = self.store.peek_oldest()? else {
            return Ok(ProcessOutcome::Idle);
        };

        let hit = match decode(&record) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Dropping undecodable featurization hit");
                self.store.remove_oldest()?;
                return Ok(ProcessOutcome::Dropped(DropReason::Undecodable));
            }
        };

        if let Err(e) = hit.validate() {
            return self.drop_hit(&hit, DropReason::Invalid(e.to_string()));
        }

        debug!(experience_id = %hit.experience_id, state = %HitState::Checking, "Processing featurization hit");
        let exists = match self.client.check_exists(&hit).await {
            Ok(exists) => exists,
            Err(e) => match classify(Phase::Check, &e) {
                FailureClass::NotFound => false,
                FailureClass::Recoverable => return self.retry(&record, hit, &e),
                FailureClass::Terminal => {
                    return self.drop_hit(&hit, DropReason::Rejected(e.to_string()))
                }
            },
        };

        if !exists {
            debug!(experience_id = %hit.experience_id, state = %HitState::Registering, "Registering experience");
            if let Err(e) = self.client.register(&hit).await {
                return match classify(Phase::Register, &e) {
                    FailureClass::Recoverable => self.retry(&record, hit, &e),
                    FailureClass::NotFound | FailureClass::Terminal => {
                        self.drop_hit(&hit, DropReason::Rejected(e.to_string()))
                    }
                };
            }
        }

        self.store.remove_oldest()?;
        self.queued().remove(&hit.experience_id);
        info!(
            experience_id = %hit.experience_id,
            state = %HitState::Done,
            already_registered = exists,
            "Featurization hit complete"
        );
        Ok(ProcessOutcome::Done)
    }

    fn retry(
        &self,
        record: &HitRecord,
        mut hit: FeaturizationHit,
        err: &FeaturizationError,
    ) -> FeaturizationResult<ProcessOutcome> {
        let delay = self.backoff.delay_for(hit.attempt_count);
        hit.attempt_count = hit.attempt_count.saturating_add(1);
        self.store
            .update_payload(&record.id, &serde_json::to_string(&hit)?)?;

        warn!(
            experience_id = %hit.experience_id,
            state = %HitState::Retrying,
            attempt = hit.attempt_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Featurization request failed, will retry"
        );
        Ok(ProcessOutcome::Retry {
            attempt: hit.attempt_count,
            delay,
        })
    }

    fn drop_hit(
        &self,
        hit: &FeaturizationHit,
        reason: DropReason,
    ) -> FeaturizationResult<ProcessOutcome> {
        error!(
            experience_id = %hit.experience_id,
            state = %HitState::Dropped,
            reason = ?reason,
            "Dropping featurization hit"
        );
        self.store.remove_oldest()?;
        self.queued().remove(&hit.experience_id);
        Ok(ProcessOutcome::Dropped(reason))
    }
}

fn decode(record: &HitRecord) -> FeaturizationResult<FeaturizationHit> {
    if record.kind != FEATURIZATION_HIT_KIND {
        return Err(FeaturizationError::Config(format!(
            "unexpected record kind: {}",
            record.kind
        )));
    }
    Ok(serde_json::from_str(&record.payload)?)
}
