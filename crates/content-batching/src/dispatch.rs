//! Batch delivery traits.

use crate::event::{AssetEvent, ExperienceEvent};
use crate::metrics::{aggregate_assets, aggregate_experiences, AssetMetrics, ExperienceMetrics};
use crate::BatchResult;
use async_trait::async_trait;
use tracing::debug;

/// Receives flushed batches.
///
/// Returning `Err` leaves the events queued; they are delivered again with
/// the next flush.
#[async_trait]
pub trait BatchCallbacks: Send + Sync {
    async fn on_asset_batch(&self, events: Vec<AssetEvent>) -> BatchResult<()>;

    async fn on_experience_batch(&self, events: Vec<ExperienceEvent>) -> BatchResult<()>;
}

/// Sends aggregated metrics to the analytics edge.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn dispatch_asset_metrics(&self, metrics: Vec<AssetMetrics>) -> BatchResult<()>;

    async fn dispatch_experience_metrics(&self, metrics: Vec<ExperienceMetrics>) -> BatchResult<()>;
}

/// [`BatchCallbacks`] that aggregates each batch and forwards the metrics
/// to a [`MetricsSink`].
pub struct MetricsDispatcher<S> {
    sink: S,
}

impl<S: MetricsSink> MetricsDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[async_trait]
impl<S: MetricsSink> BatchCallbacks for MetricsDispatcher<S> {
    async fn on_asset_batch(&self, events: Vec<AssetEvent>) -> BatchResult<()> {
        let metrics: Vec<AssetMetrics> = aggregate_assets(&events).into_values().collect();
        debug!(events = events.len(), groups = metrics.len(), "Dispatching asset metrics");
        self.sink.dispatch_asset_metrics(metrics).await
    }

    async fn on_experience_batch(&self, events: Vec<ExperienceEvent>) -> BatchResult<()> {
        let metrics: Vec<ExperienceMetrics> = aggregate_experiences(&events).into_values().collect();
        debug!(events = events.len(), groups = metrics.len(), "Dispatching experience metrics");
        self.sink.dispatch_experience_metrics(metrics).await
    }
}
