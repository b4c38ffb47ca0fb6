use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nagarik_domain::DomainResult;
use nagarik_domain::affinity::{UserAffinitySnapshot, UserAuthorAffinity, UserTopicAffinity};
use nagarik_domain::error::DomainError;
use nagarik_domain::events::InteractionEvent;
use nagarik_domain::ports::BoxFuture;
use nagarik_domain::ports::candidates::{
    CandidatePost, CandidateQuery, ContentStore, PostAuthor, PostTopic, Topic,
};
use nagarik_domain::ports::events::{EventFilter, EventRepository, EventWindow};
use nagarik_domain::ports::follows::FollowFacts;
use nagarik_domain::ports::scores::{AffinityRepository, QualityScoreRepository};
use nagarik_domain::quality::PostQualityScore;
use tokio::sync::RwLock;

/// Append-only in-memory event log. Appends only ever push; the single
/// mutation beyond that is time-based retention pruning.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: Arc<RwLock<Vec<InteractionEvent>>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(event: &InteractionEvent, filter: &EventFilter) -> bool {
    filter
        .post_id
        .as_deref()
        .is_none_or(|post_id| event.post_id == post_id)
        && filter
            .user_id
            .as_deref()
            .is_none_or(|user_id| event.user_id == user_id)
        && filter
            .event_type
            .is_none_or(|event_type| event.event_type == event_type)
}

impl EventRepository for InMemoryEventRepository {
    fn append(&self, event: &InteractionEvent) -> BoxFuture<'_, DomainResult<InteractionEvent>> {
        let event = event.clone();
        let events = self.events.clone();
        Box::pin(async move {
            let mut events = events.write().await;
            if events.iter().any(|existing| existing.event_id == event.event_id) {
                return Err(DomainError::Conflict);
            }
            events.push(event.clone());
            Ok(event)
        })
    }

    fn query(
        &self,
        filter: &EventFilter,
        window: &EventWindow,
    ) -> BoxFuture<'_, DomainResult<Vec<InteractionEvent>>> {
        let filter = filter.clone();
        let window = *window;
        let events = self.events.clone();
        Box::pin(async move {
            let events = events.read().await;
            Ok(events
                .iter()
                .filter(|event| window.contains(event.created_at_ms))
                .filter(|event| matches_filter(event, &filter))
                .cloned()
                .collect())
        })
    }

    fn active_post_ids(&self, window: &EventWindow) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let window = *window;
        let events = self.events.clone();
        Box::pin(async move {
            let events = events.read().await;
            let mut ids: Vec<String> = events
                .iter()
                .filter(|event| window.contains(event.created_at_ms))
                .map(|event| event.post_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        })
    }

    fn active_user_ids(&self, window: &EventWindow) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let window = *window;
        let events = self.events.clone();
        Box::pin(async move {
            let events = events.read().await;
            let mut ids: Vec<String> = events
                .iter()
                .filter(|event| window.contains(event.created_at_ms))
                .map(|event| event.user_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        })
    }

    fn delete_before(&self, cutoff_ms: i64) -> BoxFuture<'_, DomainResult<u64>> {
        let events = self.events.clone();
        Box::pin(async move {
            let mut events = events.write().await;
            let before = events.len();
            events.retain(|event| event.created_at_ms >= cutoff_ms);
            Ok((before - events.len()) as u64)
        })
    }

    fn count_since(&self, from_ms: i64) -> BoxFuture<'_, DomainResult<u64>> {
        let events = self.events.clone();
        Box::pin(async move {
            let events = events.read().await;
            Ok(events
                .iter()
                .filter(|event| event.created_at_ms >= from_ms)
                .count() as u64)
        })
    }
}

#[derive(Default)]
pub struct InMemoryQualityScoreRepository {
    scores: Arc<RwLock<HashMap<String, PostQualityScore>>>,
}

impl InMemoryQualityScoreRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QualityScoreRepository for InMemoryQualityScoreRepository {
    fn upsert_batch(&self, batch: &[PostQualityScore]) -> BoxFuture<'_, DomainResult<()>> {
        let batch = batch.to_vec();
        let scores = self.scores.clone();
        Box::pin(async move {
            // One write-guard scope per batch keeps the batch atomic for
            // readers.
            let mut scores = scores.write().await;
            for row in batch {
                scores.insert(row.post_id.clone(), row);
            }
            Ok(())
        })
    }

    fn get(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Option<PostQualityScore>>> {
        let post_id = post_id.to_string();
        let scores = self.scores.clone();
        Box::pin(async move { Ok(scores.read().await.get(&post_id).cloned()) })
    }

    fn get_many(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostQualityScore>>> {
        let post_ids = post_ids.to_vec();
        let scores = self.scores.clone();
        Box::pin(async move {
            let scores = scores.read().await;
            Ok(post_ids
                .iter()
                .filter_map(|post_id| scores.get(post_id).cloned())
                .collect())
        })
    }

    fn count_updated_since(&self, from_ms: i64) -> BoxFuture<'_, DomainResult<u64>> {
        let scores = self.scores.clone();
        Box::pin(async move {
            let scores = scores.read().await;
            Ok(scores
                .values()
                .filter(|row| row.updated_at_ms >= from_ms)
                .count() as u64)
        })
    }
}

#[derive(Default)]
pub struct InMemoryAffinityRepository {
    topics: Arc<RwLock<HashMap<String, Vec<UserTopicAffinity>>>>,
    authors: Arc<RwLock<HashMap<String, Vec<UserAuthorAffinity>>>>,
}

impl InMemoryAffinityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AffinityRepository for InMemoryAffinityRepository {
    fn replace_users(&self, batch: &[UserAffinitySnapshot]) -> BoxFuture<'_, DomainResult<()>> {
        let batch = batch.to_vec();
        let topics = self.topics.clone();
        let authors = self.authors.clone();
        Box::pin(async move {
            let mut topics = topics.write().await;
            let mut authors = authors.write().await;
            for snapshot in batch {
                if snapshot.topics.is_empty() {
                    topics.remove(&snapshot.user_id);
                } else {
                    topics.insert(snapshot.user_id.clone(), snapshot.topics);
                }
                if snapshot.authors.is_empty() {
                    authors.remove(&snapshot.user_id);
                } else {
                    authors.insert(snapshot.user_id.clone(), snapshot.authors);
                }
            }
            Ok(())
        })
    }

    fn retain_users(&self, user_ids: &[String]) -> BoxFuture<'_, DomainResult<u64>> {
        let keep: HashSet<String> = user_ids.iter().cloned().collect();
        let topics = self.topics.clone();
        let authors = self.authors.clone();
        Box::pin(async move {
            let mut topics = topics.write().await;
            let mut authors = authors.write().await;
            let mut removed: HashSet<String> = HashSet::new();
            topics.retain(|user_id, _| {
                let kept = keep.contains(user_id);
                if !kept {
                    removed.insert(user_id.clone());
                }
                kept
            });
            authors.retain(|user_id, _| {
                let kept = keep.contains(user_id);
                if !kept {
                    removed.insert(user_id.clone());
                }
                kept
            });
            Ok(removed.len() as u64)
        })
    }

    fn topics_for_user(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<UserTopicAffinity>>> {
        let user_id = user_id.to_string();
        let topics = self.topics.clone();
        Box::pin(async move {
            let mut rows = topics.read().await.get(&user_id).cloned().unwrap_or_default();
            rows.sort_by(|left, right| right.score.total_cmp(&left.score));
            Ok(rows)
        })
    }

    fn authors_for_user(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<UserAuthorAffinity>>> {
        let user_id = user_id.to_string();
        let authors = self.authors.clone();
        Box::pin(async move {
            let mut rows = authors.read().await.get(&user_id).cloned().unwrap_or_default();
            rows.sort_by(|left, right| right.score.total_cmp(&left.score));
            Ok(rows)
        })
    }

    fn topic_row_count(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let topics = self.topics.clone();
        Box::pin(async move {
            Ok(topics
                .read()
                .await
                .get(&user_id)
                .map(|rows| rows.len() as u64)
                .unwrap_or(0))
        })
    }

    fn author_row_count(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>> {
        let user_id = user_id.to_string();
        let authors = self.authors.clone();
        Box::pin(async move {
            Ok(authors
                .read()
                .await
                .get(&user_id)
                .map(|rows| rows.len() as u64)
                .unwrap_or(0))
        })
    }
}

/// Stand-in for the persistent content store collaborator: newest-first
/// candidate listing plus topic and author joins.
#[derive(Default)]
pub struct InMemoryContentStore {
    posts: Arc<RwLock<Vec<CandidatePost>>>,
    topics: Arc<RwLock<Vec<PostTopic>>>,
    topic_registry: Arc<RwLock<Vec<Topic>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_post(&self, post: CandidatePost) {
        self.posts.write().await.push(post);
    }

    pub async fn tag_topic(&self, post_id: &str, topic_id: &str, weight: f64) {
        self.topics.write().await.push(PostTopic {
            post_id: post_id.to_string(),
            topic_id: topic_id.to_string(),
            weight,
        });
    }

    pub async fn define_topic(&self, topic: Topic) {
        self.topic_registry.write().await.push(topic);
    }

    pub async fn clear(&self) {
        self.posts.write().await.clear();
        self.topics.write().await.clear();
    }
}

impl ContentStore for InMemoryContentStore {
    fn recent_candidates(
        &self,
        query: &CandidateQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<CandidatePost>>> {
        let limit = query.limit;
        let posts = self.posts.clone();
        Box::pin(async move {
            let posts = posts.read().await;
            let mut candidates: Vec<CandidatePost> = posts.iter().cloned().collect();
            candidates.sort_by(|left, right| {
                right
                    .created_at_ms
                    .cmp(&left.created_at_ms)
                    .then_with(|| right.post_id.cmp(&left.post_id))
            });
            candidates.truncate(limit);
            Ok(candidates)
        })
    }

    fn topics_for_posts(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostTopic>>> {
        let post_ids: HashSet<String> = post_ids.iter().cloned().collect();
        let topics = self.topics.clone();
        Box::pin(async move {
            let topics = topics.read().await;
            Ok(topics
                .iter()
                .filter(|topic| post_ids.contains(&topic.post_id))
                .cloned()
                .collect())
        })
    }

    fn authors_for_posts(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostAuthor>>> {
        let post_ids: HashSet<String> = post_ids.iter().cloned().collect();
        let posts = self.posts.clone();
        Box::pin(async move {
            let posts = posts.read().await;
            Ok(posts
                .iter()
                .filter(|post| post_ids.contains(&post.post_id))
                .map(|post| PostAuthor {
                    post_id: post.post_id.clone(),
                    author_id: post.author_id.clone(),
                })
                .collect())
        })
    }

    fn topic_details(&self, topic_ids: &[String]) -> BoxFuture<'_, DomainResult<Vec<Topic>>> {
        let topic_ids: HashSet<String> = topic_ids.iter().cloned().collect();
        let topic_registry = self.topic_registry.clone();
        Box::pin(async move {
            let topic_registry = topic_registry.read().await;
            Ok(topic_registry
                .iter()
                .filter(|topic| topic_ids.contains(&topic.id))
                .cloned()
                .collect())
        })
    }
}

/// Stand-in for the identity collaborator's follow-relationship facts.
#[derive(Default)]
pub struct InMemoryFollowFacts {
    follows: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryFollowFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_follow(&self, user_id: &str, author_id: &str) {
        self.follows
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(author_id.to_string());
    }

    pub async fn remove_follow(&self, user_id: &str, author_id: &str) {
        if let Some(followed) = self.follows.write().await.get_mut(user_id) {
            followed.remove(author_id);
        }
    }
}

impl FollowFacts for InMemoryFollowFacts {
    fn followed_authors(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<String>>> {
        let user_id = user_id.to_string();
        let follows = self.follows.clone();
        Box::pin(async move {
            let follows = follows.read().await;
            let mut authors: Vec<String> = follows
                .get(&user_id)
                .map(|followed| followed.iter().cloned().collect())
                .unwrap_or_default();
            authors.sort();
            Ok(authors)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagarik_domain::events::EventType;
    use nagarik_domain::util::uuid_v7_without_dashes;

    fn event(user_id: &str, post_id: &str, event_type: EventType, at_ms: i64) -> InteractionEvent {
        InteractionEvent {
            event_id: uuid_v7_without_dashes(),
            user_id: user_id.into(),
            post_id: post_id.into(),
            event_type,
            weight: event_type.default_weight(),
            surface: "main_feed".into(),
            session_id: None,
            device_type: "desktop".into(),
            created_at_ms: at_ms,
        }
    }

    #[tokio::test]
    async fn append_rejects_duplicate_event_ids() {
        let repository = InMemoryEventRepository::new();
        let first = event("user-1", "post-1", EventType::Click, 1_000);
        repository.append(&first).await.expect("append");
        let result = repository.append(&first).await;
        assert!(matches!(result, Err(DomainError::Conflict)));
    }

    #[tokio::test]
    async fn query_respects_filter_and_window() {
        let repository = InMemoryEventRepository::new();
        repository
            .append(&event("user-1", "post-1", EventType::Click, 1_000))
            .await
            .expect("append");
        repository
            .append(&event("user-2", "post-1", EventType::Like, 2_000))
            .await
            .expect("append");
        repository
            .append(&event("user-1", "post-2", EventType::Click, 9_000))
            .await
            .expect("append");

        let window = EventWindow {
            from_ms: 0,
            to_ms: 5_000,
        };
        let filter = EventFilter {
            post_id: Some("post-1".into()),
            ..EventFilter::default()
        };
        let rows = repository.query(&filter, &window).await.expect("query");
        assert_eq!(rows.len(), 2);

        let filter = EventFilter {
            user_id: Some("user-1".into()),
            event_type: Some(EventType::Click),
            ..EventFilter::default()
        };
        let rows = repository.query(&filter, &window).await.expect("query");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn delete_before_prunes_only_older_events() {
        let repository = InMemoryEventRepository::new();
        repository
            .append(&event("user-1", "post-1", EventType::Click, 1_000))
            .await
            .expect("append");
        repository
            .append(&event("user-1", "post-2", EventType::Click, 5_000))
            .await
            .expect("append");

        let pruned = repository.delete_before(3_000).await.expect("prune");
        assert_eq!(pruned, 1);
        assert_eq!(repository.count_since(0).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn replace_users_drops_emptied_dimensions() {
        let repository = InMemoryAffinityRepository::new();
        repository
            .replace_users(&[UserAffinitySnapshot {
                user_id: "user-1".into(),
                topics: vec![UserTopicAffinity {
                    user_id: "user-1".into(),
                    topic_id: "topic-a".into(),
                    score: 1.5,
                    interaction_count: 2,
                    last_interaction_at_ms: 1_000,
                }],
                authors: Vec::new(),
            }])
            .await
            .expect("replace");
        assert_eq!(repository.topic_row_count("user-1").await.expect("count"), 1);

        repository
            .replace_users(&[UserAffinitySnapshot {
                user_id: "user-1".into(),
                topics: Vec::new(),
                authors: Vec::new(),
            }])
            .await
            .expect("replace");
        assert_eq!(repository.topic_row_count("user-1").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn recent_candidates_come_newest_first() {
        let store = InMemoryContentStore::new();
        for (post_id, at_ms) in [("post-a", 1_000), ("post-b", 3_000), ("post-c", 2_000)] {
            store
                .add_post(CandidatePost {
                    post_id: post_id.into(),
                    author_id: "author-1".into(),
                    author_username: "author-one".into(),
                    title: post_id.into(),
                    body: None,
                    created_at_ms: at_ms,
                })
                .await;
        }

        let candidates = store
            .recent_candidates(&CandidateQuery { limit: 2 })
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].post_id, "post-b");
        assert_eq!(candidates[1].post_id, "post-c");
    }

    #[tokio::test]
    async fn follow_facts_round_trip() {
        let follows = InMemoryFollowFacts::new();
        follows.set_follow("user-1", "author-2").await;
        follows.set_follow("user-1", "author-1").await;
        assert_eq!(
            follows.followed_authors("user-1").await.expect("follows"),
            vec!["author-1".to_string(), "author-2".to_string()]
        );

        follows.remove_follow("user-1", "author-2").await;
        assert_eq!(
            follows.followed_authors("user-1").await.expect("follows"),
            vec!["author-1".to_string()]
        );
    }
}
