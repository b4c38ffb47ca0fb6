use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::config::{QualityConfig, SharedScoringConfig};
use crate::error::DomainError;
use crate::events::{EventType, InteractionEvent};
use crate::ports::events::{EventFilter, EventRepository, EventWindow};
use crate::ports::locks::JobLock;
use crate::ports::scores::QualityScoreRepository;
use crate::scoring::{self, EventCounts};

pub const QUALITY_LOCK_NAME: &str = "aggregate:quality";

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Derived quality row for one post, keyed by post id. Fully recomputed on
/// every aggregator run; never incremented in place.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostQualityScore {
    pub post_id: String,
    pub impressions: u64,
    pub clicks: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub saves: u64,
    pub hides: u64,
    pub engagement_rate: f64,
    pub ctr_bayesian: f64,
    pub recency_decay: f64,
    pub quality_score: f64,
    pub last_interaction_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualityRunSummary {
    pub posts_updated: usize,
    pub batches_committed: usize,
    pub window_from_ms: i64,
    pub window_to_ms: i64,
    pub completed: bool,
}

#[derive(Clone)]
pub struct QualityAggregator {
    events: Arc<dyn EventRepository>,
    scores: Arc<dyn QualityScoreRepository>,
    lock: Arc<dyn JobLock>,
    config: SharedScoringConfig,
    batch_size: usize,
    lock_ttl: Duration,
}

impl QualityAggregator {
    pub fn new(
        events: Arc<dyn EventRepository>,
        scores: Arc<dyn QualityScoreRepository>,
        lock: Arc<dyn JobLock>,
        config: SharedScoringConfig,
        batch_size: usize,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            events,
            scores,
            lock,
            config,
            batch_size: batch_size.max(1),
            lock_ttl,
        }
    }

    pub async fn run(&self, now_ms: i64) -> DomainResult<QualityRunSummary> {
        self.run_cancellable(now_ms, &AtomicBool::new(false)).await
    }

    /// Full recompute over the trailing window. Acquires the job lock for
    /// the whole run; a concurrent run aborts with `AggregationConflict`.
    /// The cancel flag is honored between batches, so a stop request never
    /// leaves a batch half-written.
    pub async fn run_cancellable(
        &self,
        now_ms: i64,
        cancel: &AtomicBool,
    ) -> DomainResult<QualityRunSummary> {
        let guard = self
            .lock
            .acquire(QUALITY_LOCK_NAME, self.lock_ttl)
            .await?
            .ok_or_else(|| DomainError::AggregationConflict(QUALITY_LOCK_NAME.to_string()))?;

        let result = self.run_locked(now_ms, cancel).await;
        let released = self.lock.release(&guard).await;
        match (result, released) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), _) => Err(err),
        }
    }

    async fn run_locked(
        &self,
        now_ms: i64,
        cancel: &AtomicBool,
    ) -> DomainResult<QualityRunSummary> {
        let config = self.config.snapshot();
        let window = EventWindow::trailing_hours(now_ms, config.quality.window_hours);
        let post_ids = self.events.active_post_ids(&window).await?;

        let mut summary = QualityRunSummary {
            posts_updated: 0,
            batches_committed: 0,
            window_from_ms: window.from_ms,
            window_to_ms: window.to_ms,
            completed: true,
        };

        for chunk in post_ids.chunks(self.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                summary.completed = false;
                break;
            }
            let mut batch = Vec::with_capacity(chunk.len());
            for post_id in chunk {
                let filter = EventFilter {
                    post_id: Some(post_id.clone()),
                    ..EventFilter::default()
                };
                let events = self.events.query(&filter, &window).await?;
                if events.is_empty() {
                    // Active-id listing and this read may straddle a prune;
                    // a post with no surviving events gets no row.
                    continue;
                }
                batch.push(compute_post_quality(
                    post_id,
                    &events,
                    &config.quality,
                    now_ms,
                ));
            }
            if batch.is_empty() {
                continue;
            }
            summary.posts_updated += batch.len();
            self.scores.upsert_batch(&batch).await?;
            summary.batches_committed += 1;
        }

        Ok(summary)
    }
}

pub fn count_events(events: &[InteractionEvent]) -> EventCounts {
    let mut counts = EventCounts::default();
    for event in events {
        match event.event_type {
            EventType::Impression => counts.impressions += 1,
            EventType::Click => counts.clicks += 1,
            EventType::Like => counts.likes += 1,
            EventType::Comment => counts.comments += 1,
            EventType::Share => counts.shares += 1,
            EventType::Save => counts.saves += 1,
            EventType::Hide => counts.hides += 1,
            EventType::FollowAuthor => {}
        }
    }
    counts
}

pub fn compute_post_quality(
    post_id: &str,
    events: &[InteractionEvent],
    config: &QualityConfig,
    now_ms: i64,
) -> PostQualityScore {
    let counts = count_events(events);
    let last_interaction_at_ms = events
        .iter()
        .map(|event| event.created_at_ms)
        .max()
        .unwrap_or(now_ms);
    let age_hours = (now_ms - last_interaction_at_ms) as f64 / MS_PER_HOUR;

    let engagement_rate = scoring::engagement_rate(&counts, &config.engagement);
    let ctr_bayesian = scoring::ctr_bayesian(
        counts.clicks,
        counts.impressions,
        config.ctr_alpha,
        config.ctr_beta,
    );
    let recency_decay = scoring::recency_decay(age_hours, config.decay_lambda_per_hour);
    let quality_score = scoring::quality_score(engagement_rate, ctr_bayesian, recency_decay, config);

    PostQualityScore {
        post_id: post_id.to_string(),
        impressions: counts.impressions,
        clicks: counts.clicks,
        likes: counts.likes,
        comments: counts.comments,
        shares: counts.shares,
        saves: counts.saves,
        hides: counts.hides,
        engagement_rate,
        ctr_bayesian,
        recency_decay,
        quality_score,
        last_interaction_at_ms,
        updated_at_ms: now_ms,
    }
}
