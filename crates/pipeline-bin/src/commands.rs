//! Subcommand implementations.

use crate::sink::LoggingMetricsSink;
use content_batching::{BatchCoordinator, MetricsDispatcher, PendingCounts};
use featurization_worker::{
    BackoffPolicy, Consent, FeaturizationHitProcessor, HttpFeaturizationClient, ProcessOutcome,
};
use hit_store::{HitStore, SqliteHitStore};
use pipeline_config_and_utils::{Config, Paths};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Record counts of the three durable queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub assets: usize,
    pub experiences: usize,
    pub featurization: usize,
}

fn queue_counts(paths: &Paths) -> CommandResult<QueueStatus> {
    Ok(QueueStatus {
        assets: SqliteHitStore::open(paths.asset_queue_file())?.count()?,
        experiences: SqliteHitStore::open(paths.experience_queue_file())?.count()?,
        featurization: SqliteHitStore::open(paths.featurization_queue_file())?.count()?,
    })
}

pub fn status(paths: &Paths) -> CommandResult<QueueStatus> {
    let status = queue_counts(paths)?;

    println!("Asset events:        {}", status.assets);
    println!("Experience events:   {}", status.experiences);
    println!("Featurization hits:  {}", status.featurization);
    Ok(status)
}

/// What a replay delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub recovered: usize,
    pub asset_groups: usize,
    pub experience_groups: usize,
    pub remaining: PendingCounts,
}

fn open_coordinator(config: &Config, paths: &Paths) -> BatchCoordinator {
    BatchCoordinator::open(
        config.batching.clone(),
        &paths.asset_queue_file(),
        &paths.experience_queue_file(),
        Handle::current(),
    )
}

pub async fn replay(config: &Config, paths: &Paths) -> CommandResult<ReplayOutcome> {
    let coordinator = open_coordinator(config, paths);
    let dispatcher = Arc::new(MetricsDispatcher::new(LoggingMetricsSink::default()));
    coordinator.set_callbacks(dispatcher.clone());

    let recovery = coordinator.start().await?;
    let report = coordinator.close().await;
    info!(
        delivered = report.delivered(),
        failed = report.failed(),
        "Replay flushed"
    );

    // The coordinator released its stores on close.
    let stored = queue_counts(paths)?;
    let outcome = ReplayOutcome {
        recovered: recovery.assets.recovered + recovery.experiences.recovered,
        asset_groups: dispatcher.sink().asset_groups(),
        experience_groups: dispatcher.sink().experience_groups(),
        remaining: PendingCounts {
            assets: stored.assets,
            experiences: stored.experiences,
        },
    };

    println!("Recovered events:    {}", outcome.recovered);
    println!("Asset metrics:       {}", outcome.asset_groups);
    println!("Experience metrics:  {}", outcome.experience_groups);
    println!("Still queued:        {}", outcome.remaining.total());
    Ok(outcome)
}

pub async fn clear(config: &Config, paths: &Paths) -> CommandResult<()> {
    let coordinator = open_coordinator(config, paths);
    coordinator.clear_pending_batch().await?;
    println!("Cleared pending interaction events");
    Ok(())
}

/// What one featurization drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeaturizeOutcome {
    pub done: usize,
    pub dropped: usize,
    /// Backoff requested by the head hit, if the drain stopped on a retry.
    pub retry_after: Option<Duration>,
    pub paused: bool,
    pub remaining: usize,
}

pub async fn featurize(
    config: &Config,
    paths: &Paths,
    consent: Consent,
) -> CommandResult<FeaturizeOutcome> {
    let client = HttpFeaturizationClient::from_config(&config.featurization)?;
    let processor = FeaturizationHitProcessor::new(
        Arc::new(client),
        Box::new(SqliteHitStore::open(paths.featurization_queue_file())?),
        BackoffPolicy::from_config(&config.featurization),
    );
    processor.set_consent(consent).await?;

    let mut outcome = FeaturizeOutcome::default();
    loop {
        match processor.process_next().await? {
            ProcessOutcome::Done => outcome.done += 1,
            ProcessOutcome::Dropped(_) => outcome.dropped += 1,
            ProcessOutcome::Retry { delay, .. } => {
                outcome.retry_after = Some(delay);
                break;
            }
            ProcessOutcome::Paused => {
                outcome.paused = true;
                break;
            }
            ProcessOutcome::Idle => break,
        }
    }
    outcome.remaining = processor.pending_count()?;

    println!("Registered:          {}", outcome.done);
    println!("Dropped:             {}", outcome.dropped);
    println!("Still queued:        {}", outcome.remaining);
    if outcome.paused {
        println!("Paused: consent not granted");
    }
    if let Some(delay) = outcome.retry_after {
        println!("Service unavailable, retry in {}s", delay.as_secs());
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_batching::AssetEvent;
    use featurization_worker::{ExperienceContent, FeaturizationHit};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Paths, Config) {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        (dir, paths, Config::new())
    }

    async fn seed_assets(config: &Config, paths: &Paths, count: usize) {
        let coordinator = open_coordinator(config, paths);
        for i in 0..count {
            coordinator
                .add_event(AssetEvent::view(format!("https://cdn.example.com/{i}.png")))
                .await
                .unwrap();
        }
    }

    fn seed_featurization(config: &Config, paths: &Paths) {
        let processor = FeaturizationHitProcessor::new(
            Arc::new(HttpFeaturizationClient::from_config(&config.featurization).unwrap()),
            Box::new(SqliteHitStore::open(paths.featurization_queue_file()).unwrap()),
            BackoffPolicy::default(),
        );
        processor
            .queue(FeaturizationHit::new("exp-1", "org", "ds", ExperienceContent::default()))
            .unwrap();
    }

    #[test]
    fn status_of_fresh_dir_is_empty() {
        let (_dir, paths, _) = setup();
        let status = status(&paths).unwrap();
        assert_eq!(
            status,
            QueueStatus {
                assets: 0,
                experiences: 0,
                featurization: 0
            }
        );
    }

    #[tokio::test]
    async fn replay_delivers_persisted_events() {
        let (_dir, paths, config) = setup();
        seed_assets(&config, &paths, 3).await;
        assert_eq!(status(&paths).unwrap().assets, 3);

        let outcome = replay(&config, &paths).await.unwrap();
        assert_eq!(outcome.recovered, 3);
        assert_eq!(outcome.asset_groups, 3);
        assert_eq!(outcome.remaining.total(), 0);
        assert_eq!(status(&paths).unwrap().assets, 0);
    }

    #[tokio::test]
    async fn clear_discards_persisted_events() {
        let (_dir, paths, config) = setup();
        seed_assets(&config, &paths, 2).await;

        clear(&config, &paths).await.unwrap();
        assert_eq!(status(&paths).unwrap().assets, 0);
    }

    #[tokio::test]
    async fn featurize_without_consent_keeps_hits() {
        let (_dir, paths, config) = setup();
        seed_featurization(&config, &paths);

        let outcome = featurize(&config, &paths, Consent::Pending).await.unwrap();
        assert!(outcome.paused);
        assert_eq!(outcome.remaining, 1);

        let outcome = featurize(&config, &paths, Consent::Denied).await.unwrap();
        assert_eq!(outcome.remaining, 0);
    }
}
