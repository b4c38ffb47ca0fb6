use std::sync::Arc;
use std::time::Duration;

use nagarik_domain::config::{ScoringConfig, SharedScoringConfig};
use nagarik_domain::error::DomainError;
use nagarik_domain::events::{AppendOutcome, EventIngestInput, EventLogService};
use nagarik_domain::feed::{FeedComposer, FeedRequest, ItemOrigin};
use nagarik_domain::identity::ActorIdentity;
use nagarik_domain::ports::candidates::CandidatePost;
use nagarik_domain::ports::events::EventRepository;
use nagarik_domain::ports::scores::{AffinityRepository, QualityScoreRepository};
use nagarik_domain::ports::supplement::SupplementItem;
use nagarik_domain::quality::QualityAggregator;
use nagarik_domain::affinity::AffinityAggregator;
use nagarik_domain::util::now_ms;
use nagarik_infra::locks::InMemoryJobLock;
use nagarik_infra::repositories::{
    InMemoryAffinityRepository, InMemoryContentStore, InMemoryEventRepository,
    InMemoryFollowFacts, InMemoryQualityScoreRepository,
};
use nagarik_infra::supplement::StaticSupplementSource;

struct Pipeline {
    events: Arc<InMemoryEventRepository>,
    quality_scores: Arc<InMemoryQualityScoreRepository>,
    affinities: Arc<InMemoryAffinityRepository>,
    content: Arc<InMemoryContentStore>,
    follows: Arc<InMemoryFollowFacts>,
    supplement: Arc<StaticSupplementSource>,
    event_log: EventLogService,
    quality: QualityAggregator,
    affinity: AffinityAggregator,
    composer: FeedComposer,
}

fn pipeline() -> Pipeline {
    let config = SharedScoringConfig::new(ScoringConfig::default());
    let events = Arc::new(InMemoryEventRepository::new());
    let quality_scores = Arc::new(InMemoryQualityScoreRepository::new());
    let affinities = Arc::new(InMemoryAffinityRepository::new());
    let content = Arc::new(InMemoryContentStore::new());
    let follows = Arc::new(InMemoryFollowFacts::new());
    let supplement = Arc::new(StaticSupplementSource::new());
    let lock = Arc::new(InMemoryJobLock::new());

    Pipeline {
        event_log: EventLogService::new(events.clone(), config.clone()),
        quality: QualityAggregator::new(
            events.clone(),
            quality_scores.clone(),
            lock.clone(),
            config.clone(),
            50,
            Duration::from_secs(60),
        ),
        affinity: AffinityAggregator::new(
            events.clone(),
            affinities.clone(),
            content.clone(),
            follows.clone(),
            lock.clone(),
            config.clone(),
            50,
            Duration::from_secs(60),
        ),
        composer: FeedComposer::new(
            content.clone(),
            supplement.clone(),
            quality_scores.clone(),
            affinities.clone(),
            config,
        ),
        events,
        quality_scores,
        affinities,
        content,
        follows,
        supplement,
    }
}

fn actor(user_id: &str) -> ActorIdentity {
    ActorIdentity {
        user_id: user_id.to_string(),
        username: format!("{user_id}-name"),
    }
}

fn ingest(post_id: &str, event_type: &str, at_ms: i64) -> EventIngestInput {
    EventIngestInput {
        post_id: post_id.to_string(),
        event_type: event_type.to_string(),
        weight: None,
        surface: None,
        session_id: Some("session-1".to_string()),
        user_agent: None,
        client_timestamp_ms: Some(at_ms),
    }
}

fn news_items(count: usize) -> Vec<SupplementItem> {
    (0..count)
        .map(|index| SupplementItem {
            id: format!("ext-{index:04}"),
            title: format!("headline {index}"),
            body: Some(format!("summary {index}")),
            source_name: "wire".into(),
            external_url: Some(format!("https://news.example/{index}")),
            image_url: None,
            published_at_ms: now_ms() - index as i64 * 60_000,
        })
        .collect()
}

async fn seed_posts(pipeline: &Pipeline, count: usize, author_id: &str) {
    let now = now_ms();
    for index in 0..count {
        let post_id = format!("post-{index:02}");
        pipeline
            .content
            .add_post(CandidatePost {
                post_id: post_id.clone(),
                author_id: author_id.to_string(),
                author_username: format!("{author_id}-name"),
                title: format!("{post_id} title"),
                body: None,
                created_at_ms: now - index as i64 * 60_000,
            })
            .await;
        pipeline.content.tag_topic(&post_id, "topic-roads", 1.0).await;
    }
}

#[tokio::test]
async fn events_flow_through_aggregation_into_the_feed() {
    let pipeline = pipeline();
    let now = now_ms();
    seed_posts(&pipeline, 3, "author-1").await;
    pipeline.supplement.set_items(news_items(60)).await;

    // A burst of engagement on post-01 should rank it above its peers.
    for _ in 0..20 {
        let outcome = pipeline
            .event_log
            .append(&actor("reader-1"), ingest("post-01", "impression", now - 60_000))
            .await
            .expect("append");
        assert!(matches!(outcome, AppendOutcome::Logged(_)));
    }
    for _ in 0..10 {
        pipeline
            .event_log
            .append(&actor("reader-1"), ingest("post-01", "click", now - 30_000))
            .await
            .expect("append");
    }
    pipeline
        .event_log
        .append(&actor("reader-1"), ingest("post-01", "like", now - 10_000))
        .await
        .expect("append");

    let quality_summary = pipeline.quality.run(now).await.expect("quality run");
    assert_eq!(quality_summary.posts_updated, 1);
    let affinity_summary = pipeline.affinity.run(now).await.expect("affinity run");
    assert_eq!(affinity_summary.users_updated, 1);

    let row = pipeline
        .quality_scores
        .get("post-01")
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(row.impressions, 20);
    assert_eq!(row.clicks, 10);
    assert!(row.quality_score > 0.0);

    let topics = pipeline
        .affinities
        .topics_for_user("reader-1")
        .await
        .expect("topics");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].topic_id, "topic-roads");
    assert!(topics[0].score > 0.1);

    let page = pipeline
        .composer
        .compose(FeedRequest {
            viewer: Some("reader-1".to_string()),
            session_id: Some("session-1".to_string()),
            page: 1,
            size: 20,
            category: None,
        })
        .await
        .expect("page");
    assert_eq!(page.items.len(), 20);
    assert!(!page.degraded);

    let internal: Vec<_> = page
        .items
        .iter()
        .filter(|item| item.origin == ItemOrigin::Internal)
        .collect();
    assert_eq!(internal.len(), 3);
    assert_eq!(internal[0].id, "post-01");
    assert_eq!(
        page.items
            .iter()
            .filter(|item| item.origin == ItemOrigin::External)
            .count(),
        17
    );
}

#[tokio::test]
async fn aggregation_reruns_are_idempotent_and_prune_stale_users() {
    let pipeline = pipeline();
    let now = now_ms();
    seed_posts(&pipeline, 2, "author-1").await;
    pipeline.follows.set_follow("reader-1", "author-1").await;

    pipeline
        .event_log
        .append(&actor("reader-1"), ingest("post-00", "like", now - 60_000))
        .await
        .expect("append");

    pipeline.quality.run(now).await.expect("first quality run");
    pipeline.affinity.run(now).await.expect("first affinity run");
    let first = pipeline
        .quality_scores
        .get("post-00")
        .await
        .expect("get")
        .expect("row");

    pipeline.quality.run(now).await.expect("second quality run");
    pipeline.affinity.run(now).await.expect("second affinity run");
    let second = pipeline
        .quality_scores
        .get("post-00")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(first.quality_score.to_bits(), second.quality_score.to_bits());

    let authors = pipeline
        .affinities
        .authors_for_user("reader-1")
        .await
        .expect("authors");
    assert_eq!(authors.len(), 1);
    assert!(authors[0].is_following);

    // Prune every event, then recompute: derived rows must disappear with
    // their source data.
    pipeline
        .event_log
        .prune_expired(now + 365 * 24 * 3_600_000)
        .await
        .expect("prune");
    let summary = pipeline.affinity.run(now).await.expect("third affinity run");
    assert_eq!(summary.users_updated, 0);
    assert!(
        pipeline
            .affinities
            .topics_for_user("reader-1")
            .await
            .expect("topics")
            .is_empty()
    );
}

#[tokio::test]
async fn feed_survives_supplement_outage_and_reports_degradation() {
    let pipeline = pipeline();
    seed_posts(&pipeline, 5, "author-1").await;
    pipeline.supplement.set_failing(true).await;

    let page = pipeline
        .composer
        .compose(FeedRequest {
            viewer: None,
            session_id: None,
            page: 1,
            size: 20,
            category: None,
        })
        .await
        .expect("page");
    assert!(page.degraded);
    assert!(page.items.iter().all(|item| item.origin == ItemOrigin::Internal));

    // With internal content also gone the page is an explicit error.
    pipeline.content.clear().await;
    let result = pipeline
        .composer
        .compose(FeedRequest {
            viewer: None,
            session_id: None,
            page: 1,
            size: 20,
            category: None,
        })
        .await;
    assert!(matches!(result, Err(DomainError::Unavailable(_))));
}

#[tokio::test]
async fn unknown_event_types_are_rejected_at_the_boundary() {
    let pipeline = pipeline();
    let result = pipeline
        .event_log
        .append(&actor("reader-1"), ingest("post-00", "upvote", now_ms()))
        .await;
    assert!(matches!(result, Err(DomainError::Validation(_))));
    assert_eq!(pipeline.events.count_since(0).await.expect("count"), 0);
}
