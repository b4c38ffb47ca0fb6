mod observability;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nagarik_domain::affinity::AffinityAggregator;
use nagarik_domain::config::SharedScoringConfig;
use nagarik_domain::error::DomainError;
use nagarik_domain::events::EventLogService;
use nagarik_domain::ports::locks::JobLock;
use nagarik_domain::quality::QualityAggregator;
use nagarik_domain::util::now_ms;
use nagarik_infra::config::AppConfig;
use nagarik_infra::locks::{InMemoryJobLock, RedisJobLock};
use nagarik_infra::logging::init_tracing;
use nagarik_infra::repositories::{
    InMemoryAffinityRepository, InMemoryContentStore, InMemoryEventRepository,
    InMemoryFollowFacts, InMemoryQualityScoreRepository,
};
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let lock: Arc<dyn JobLock> = if config.lock_backend.eq_ignore_ascii_case("redis") {
        Arc::new(
            RedisJobLock::connect_with_prefix(&config.redis_url, config.lock_prefix.clone())
                .await?,
        )
    } else {
        Arc::new(InMemoryJobLock::new())
    };

    let scoring = SharedScoringConfig::new(config.scoring());
    let lock_ttl = Duration::from_millis(config.aggregator_lock_ttl_ms.max(1));
    let events = Arc::new(InMemoryEventRepository::new());
    let quality_scores = Arc::new(InMemoryQualityScoreRepository::new());
    let affinities = Arc::new(InMemoryAffinityRepository::new());
    let content = Arc::new(InMemoryContentStore::new());
    let follows = Arc::new(InMemoryFollowFacts::new());

    let event_log = EventLogService::new(events.clone(), scoring.clone());
    let quality = QualityAggregator::new(
        events.clone(),
        quality_scores,
        lock.clone(),
        scoring.clone(),
        config.aggregator_batch_size,
        lock_ttl,
    );
    let affinity = AffinityAggregator::new(
        events,
        affinities,
        content,
        follows,
        lock,
        scoring,
        config.aggregator_batch_size,
        lock_ttl,
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(Notify::new());
    {
        let cancel = cancel.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            cancel.store(true, Ordering::Relaxed);
            shutdown.notify_waiters();
        });
    }

    let mut quality_timer = interval(Duration::from_millis(config.quality_interval_ms.max(1_000)));
    let mut affinity_timer =
        interval(Duration::from_millis(config.affinity_interval_ms.max(1_000)));
    let mut retention_timer =
        interval(Duration::from_millis(config.retention_interval_ms.max(1_000)));

    info!(
        quality_interval_ms = config.quality_interval_ms,
        affinity_interval_ms = config.affinity_interval_ms,
        retention_interval_ms = config.retention_interval_ms,
        "worker starting"
    );

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = quality_timer.tick() => run_quality(&quality, &cancel).await,
            _ = affinity_timer.tick() => run_affinity(&affinity, &cancel).await,
            _ = retention_timer.tick() => run_retention(&event_log).await,
        }
    }

    info!("worker shutdown");
    Ok(())
}

async fn run_quality(aggregator: &QualityAggregator, cancel: &AtomicBool) {
    let start = Instant::now();
    match aggregator.run_cancellable(now_ms(), cancel).await {
        Ok(summary) => {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            info!(
                posts_updated = summary.posts_updated,
                batches = summary.batches_committed,
                completed = summary.completed,
                "quality aggregation finished"
            );
            observability::register_aggregation_run(
                "quality",
                "success",
                elapsed_ms,
                summary.posts_updated,
            );
        }
        Err(DomainError::AggregationConflict(job)) => {
            // Another run holds the lock; the next tick retries.
            debug!(job, "quality aggregation skipped");
            observability::register_aggregation_run(
                "quality",
                "conflict",
                start.elapsed().as_secs_f64() * 1000.0,
                0,
            );
        }
        Err(err) => {
            warn!(error = %err, "quality aggregation failed");
            observability::register_aggregation_run(
                "quality",
                "error",
                start.elapsed().as_secs_f64() * 1000.0,
                0,
            );
        }
    }
}

async fn run_affinity(aggregator: &AffinityAggregator, cancel: &AtomicBool) {
    let start = Instant::now();
    match aggregator.run_cancellable(now_ms(), cancel).await {
        Ok(summary) => {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            info!(
                users_updated = summary.users_updated,
                users_pruned = summary.users_pruned,
                batches = summary.batches_committed,
                completed = summary.completed,
                "affinity aggregation finished"
            );
            observability::register_aggregation_run(
                "affinity",
                "success",
                elapsed_ms,
                summary.users_updated,
            );
        }
        Err(DomainError::AggregationConflict(job)) => {
            debug!(job, "affinity aggregation skipped");
            observability::register_aggregation_run(
                "affinity",
                "conflict",
                start.elapsed().as_secs_f64() * 1000.0,
                0,
            );
        }
        Err(err) => {
            warn!(error = %err, "affinity aggregation failed");
            observability::register_aggregation_run(
                "affinity",
                "error",
                start.elapsed().as_secs_f64() * 1000.0,
                0,
            );
        }
    }
}

async fn run_retention(event_log: &EventLogService) {
    match event_log.prune_expired(now_ms()).await {
        Ok(pruned) => {
            info!(pruned, "retention pruning finished");
            observability::register_retention_prune(pruned);
        }
        Err(err) => {
            warn!(error = %err, "retention pruning failed");
        }
    }
}
