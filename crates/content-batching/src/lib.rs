//! # Content Batching
//!
//! Durable batching of content interaction events.
//!
//! Hosts report asset and experience interactions one at a time. Each event
//! is written to a per-category [`hit_store::HitStore`] before it is
//! buffered, and buffered events are handed to [`BatchCallbacks`] in
//! batches. A record leaves the store only after its batch was delivered,
//! so a crash at any point loses nothing and a restart delivers every
//! surviving event exactly once more.
//!
//! ## Flow
//!
//! ```text
//! add_event ──► PersistentHitQueue::persist ──► Accumulator
//!                                                   │ flush (size / timer / max wait)
//!                                                   ▼
//!                                     BatchCallbacks::on_*_batch
//!                                                   │ Ok
//!                                                   ▼
//!                         mark_confirmed ──► replay removes confirmed records
//! ```
//!
//! [`MetricsDispatcher`] is the usual callback: it folds a batch into
//! per-(content, location) view/click counts and hands them to a
//! [`MetricsSink`].

mod accumulator;
mod coordinator;
mod dispatch;
mod error;
mod event;
mod metrics;
mod queue;
mod scheduler;

pub use accumulator::Accumulator;
pub use coordinator::{BatchCoordinator, FlushReason, FlushReport, PendingCounts, RecoverySummary};
pub use dispatch::{BatchCallbacks, MetricsDispatcher, MetricsSink};
pub use error::{BatchError, BatchResult};
pub use event::{
    AssetEvent, BufferedEvent, ContentEvent, EventCategory, ExperienceEvent, Extras, InteractionType,
};
pub use metrics::{
    aggregate_assets, aggregate_experiences, merge_extras, AssetMetrics, ExperienceMetrics, MetricsKey,
};
pub use queue::{PersistentHitQueue, ReplaySummary};
pub use scheduler::{FlushScheduler, FlushTask, ManualFlushScheduler, TokioFlushScheduler};

#[cfg(test)]
mod tests;
