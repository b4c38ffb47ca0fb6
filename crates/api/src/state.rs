use std::sync::Arc;
use std::time::Duration;

use nagarik_domain::affinity::AffinityAggregator;
use nagarik_domain::config::SharedScoringConfig;
use nagarik_domain::events::EventLogService;
use nagarik_domain::feed::FeedComposer;
use nagarik_domain::ports::candidates::ContentStore;
use nagarik_domain::ports::events::EventRepository;
use nagarik_domain::ports::follows::FollowFacts;
use nagarik_domain::ports::locks::JobLock;
use nagarik_domain::ports::scores::{AffinityRepository, QualityScoreRepository};
use nagarik_domain::ports::supplement::SupplementSource;
use nagarik_domain::quality::QualityAggregator;
use nagarik_infra::config::AppConfig;
use nagarik_infra::locks::{InMemoryJobLock, RedisJobLock};
use nagarik_infra::repositories::{
    InMemoryAffinityRepository, InMemoryContentStore, InMemoryEventRepository,
    InMemoryFollowFacts, InMemoryQualityScoreRepository,
};
use nagarik_infra::supplement::NewsSupplementClient;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub scoring: SharedScoringConfig,
    pub event_log: EventLogService,
    pub composer: FeedComposer,
    pub quality: QualityAggregator,
    pub affinity: AffinityAggregator,
    pub events: Arc<dyn EventRepository>,
    pub quality_scores: Arc<dyn QualityScoreRepository>,
    pub affinities: Arc<dyn AffinityRepository>,
    pub content: Arc<dyn ContentStore>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let lock: Arc<dyn JobLock> = if config.lock_backend.eq_ignore_ascii_case("redis") {
            Arc::new(
                RedisJobLock::connect_with_prefix(&config.redis_url, config.lock_prefix.clone())
                    .await?,
            )
        } else {
            Arc::new(InMemoryJobLock::new())
        };
        let supplement: Arc<dyn SupplementSource> =
            Arc::new(NewsSupplementClient::from_config(&config)?);
        Ok(Self::assemble(
            config,
            lock,
            supplement,
            Arc::new(InMemoryEventRepository::new()),
            Arc::new(InMemoryQualityScoreRepository::new()),
            Arc::new(InMemoryAffinityRepository::new()),
            Arc::new(InMemoryContentStore::new()),
            Arc::new(InMemoryFollowFacts::new()),
        ))
    }

    /// Wires services over explicit port implementations; tests keep their
    /// own handles to the concrete stores for seeding.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        config: AppConfig,
        lock: Arc<dyn JobLock>,
        supplement: Arc<dyn SupplementSource>,
        events: Arc<dyn EventRepository>,
        quality_scores: Arc<dyn QualityScoreRepository>,
        affinities: Arc<dyn AffinityRepository>,
        content: Arc<dyn ContentStore>,
        follows: Arc<dyn FollowFacts>,
    ) -> Self {
        let scoring = SharedScoringConfig::new(config.scoring());
        let lock_ttl = Duration::from_millis(config.aggregator_lock_ttl_ms.max(1));
        let event_log = EventLogService::new(events.clone(), scoring.clone());
        let quality = QualityAggregator::new(
            events.clone(),
            quality_scores.clone(),
            lock.clone(),
            scoring.clone(),
            config.aggregator_batch_size,
            lock_ttl,
        );
        let affinity = AffinityAggregator::new(
            events.clone(),
            affinities.clone(),
            content.clone(),
            follows.clone(),
            lock,
            scoring.clone(),
            config.aggregator_batch_size,
            lock_ttl,
        );
        let composer = FeedComposer::new(
            content.clone(),
            supplement,
            quality_scores.clone(),
            affinities.clone(),
            scoring.clone(),
        );

        Self {
            config,
            scoring,
            event_log,
            composer,
            quality,
            affinity,
            events,
            quality_scores,
            affinities,
            content,
        }
    }
}
