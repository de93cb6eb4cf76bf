//! Metrics sink that writes aggregated metrics to the log.

use async_trait::async_trait;
use content_batching::{AssetMetrics, BatchResult, ExperienceMetrics, MetricsSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Logs every metrics group as one JSON document and counts them.
#[derive(Debug, Default)]
pub struct LoggingMetricsSink {
    asset_groups: AtomicUsize,
    experience_groups: AtomicUsize,
}

impl LoggingMetricsSink {
    pub fn asset_groups(&self) -> usize {
        self.asset_groups.load(Ordering::Relaxed)
    }

    pub fn experience_groups(&self) -> usize {
        self.experience_groups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetricsSink for LoggingMetricsSink {
    async fn dispatch_asset_metrics(&self, metrics: Vec<AssetMetrics>) -> BatchResult<()> {
        for group in &metrics {
            info!(metrics = %serde_json::to_string(group)?, "Asset metrics");
        }
        self.asset_groups.fetch_add(metrics.len(), Ordering::Relaxed);
        Ok(())
    }

    async fn dispatch_experience_metrics(&self, metrics: Vec<ExperienceMetrics>) -> BatchResult<()> {
        for group in &metrics {
            info!(metrics = %serde_json::to_string(group)?, "Experience metrics");
        }
        self.experience_groups.fetch_add(metrics.len(), Ordering::Relaxed);
        Ok(())
    }
}
