//! # Featurization Worker
//!
//! Registers experience content with the featurization service, retrying
//! through outages.
//!
//! Each [`FeaturizationHit`] is written to a durable [`hit_store::HitStore`]
//! and processed one at a time, oldest first:
//!
//! ```text
//! check_exists ──► exists ───────────────────────────► Done (record removed)
//!      │ 404 / not exists
//!      ▼
//!   register ───► ok ───────────────────────────────► Done (record removed)
//!      │
//!      ├── 408 / 429 / 502 / 503 / 504 / network ────► Retry (record kept,
//!      │                                                 attempt_count + 1)
//!      └── anything else ─────────────────────────────► Dropped (record removed)
//! ```
//!
//! Retry delays follow [`BackoffPolicy`]: 5s doubling up to 300s. The
//! attempt count is stored with the record, so backoff continues across
//! restarts.

mod backoff;
mod classify;
mod client;
mod error;
mod hit;
mod processor;
mod worker;

pub use backoff::BackoffPolicy;
pub use classify::{classify, FailureClass, Phase, RECOVERABLE_STATUSES};
pub use client::{FeaturizationClient, HttpFeaturizationClient};
pub use error::{FeaturizationError, FeaturizationResult};
pub use hit::{ContentImage, ContentText, ExperienceContent, FeaturizationHit, FEATURIZATION_HIT_KIND};
pub use processor::{Consent, DropReason, FeaturizationHitProcessor, HitState, ProcessOutcome};
pub use worker::FeaturizationWorker;

#[cfg(test)]
mod tests;
