use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::config::{AffinityConfig, SharedScoringConfig};
use crate::error::DomainError;
use crate::events::{EventType, InteractionEvent};
use crate::ports::candidates::ContentStore;
use crate::ports::events::{EventFilter, EventRepository, EventWindow};
use crate::ports::follows::FollowFacts;
use crate::ports::locks::JobLock;
use crate::ports::scores::AffinityRepository;
use crate::scoring::decayed_weight;

pub const AFFINITY_LOCK_NAME: &str = "aggregate:affinity";

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserTopicAffinity {
    pub user_id: String,
    pub topic_id: String,
    pub score: f64,
    pub interaction_count: u64,
    pub last_interaction_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserAuthorAffinity {
    pub user_id: String,
    pub author_id: String,
    pub score: f64,
    pub interaction_count: u64,
    pub is_following: bool,
    pub last_interaction_at_ms: i64,
}

/// Complete recomputed affinity state for one user; replaces whatever the
/// table held for that user.
#[derive(Clone, Debug, PartialEq)]
pub struct UserAffinitySnapshot {
    pub user_id: String,
    pub topics: Vec<UserTopicAffinity>,
    pub authors: Vec<UserAuthorAffinity>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffinityRunSummary {
    pub users_updated: usize,
    pub users_pruned: u64,
    pub batches_committed: usize,
    pub window_from_ms: i64,
    pub window_to_ms: i64,
    pub completed: bool,
}

#[derive(Clone)]
pub struct AffinityAggregator {
    events: Arc<dyn EventRepository>,
    affinities: Arc<dyn AffinityRepository>,
    content: Arc<dyn ContentStore>,
    follows: Arc<dyn FollowFacts>,
    lock: Arc<dyn JobLock>,
    config: SharedScoringConfig,
    batch_size: usize,
    lock_ttl: Duration,
}

impl AffinityAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events: Arc<dyn EventRepository>,
        affinities: Arc<dyn AffinityRepository>,
        content: Arc<dyn ContentStore>,
        follows: Arc<dyn FollowFacts>,
        lock: Arc<dyn JobLock>,
        config: SharedScoringConfig,
        batch_size: usize,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            events,
            affinities,
            content,
            follows,
            lock,
            config,
            batch_size: batch_size.max(1),
            lock_ttl,
        }
    }

    pub async fn run(&self, now_ms: i64) -> DomainResult<AffinityRunSummary> {
        self.run_cancellable(now_ms, &AtomicBool::new(false)).await
    }

    pub async fn run_cancellable(
        &self,
        now_ms: i64,
        cancel: &AtomicBool,
    ) -> DomainResult<AffinityRunSummary> {
        let guard = self
            .lock
            .acquire(AFFINITY_LOCK_NAME, self.lock_ttl)
            .await?
            .ok_or_else(|| DomainError::AggregationConflict(AFFINITY_LOCK_NAME.to_string()))?;

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
    ) -> DomainResult<AffinityRunSummary> {
        let config = self.config.snapshot();
        let window = EventWindow::trailing_hours(now_ms, config.affinity.window_hours);
        let user_ids = self.events.active_user_ids(&window).await?;
        let users_pruned = self.affinities.retain_users(&user_ids).await?;

        let mut summary = AffinityRunSummary {
            users_updated: 0,
            users_pruned,
            batches_committed: 0,
            window_from_ms: window.from_ms,
            window_to_ms: window.to_ms,
            completed: true,
        };

        for chunk in user_ids.chunks(self.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                summary.completed = false;
                break;
            }
            let mut batch = Vec::with_capacity(chunk.len());
            for user_id in chunk {
                let snapshot = self
                    .compute_user_snapshot(user_id, &window, &config.affinity, now_ms)
                    .await?;
                batch.push(snapshot);
            }
            summary.users_updated += batch.len();
            self.affinities.replace_users(&batch).await?;
            summary.batches_committed += 1;
        }

        Ok(summary)
    }

    async fn compute_user_snapshot(
        &self,
        user_id: &str,
        window: &EventWindow,
        config: &AffinityConfig,
        now_ms: i64,
    ) -> DomainResult<UserAffinitySnapshot> {
        let filter = EventFilter {
            user_id: Some(user_id.to_string()),
            ..EventFilter::default()
        };
        let events = self.events.query(&filter, window).await?;

        let post_ids: Vec<String> = {
            let mut seen = HashSet::new();
            events
                .iter()
                .filter(|event| seen.insert(event.post_id.clone()))
                .map(|event| event.post_id.clone())
                .collect()
        };

        let mut topics_by_post: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for topic in self.content.topics_for_posts(&post_ids).await? {
            topics_by_post
                .entry(topic.post_id)
                .or_default()
                .push((topic.topic_id, topic.weight));
        }
        let author_by_post: HashMap<String, String> = self
            .content
            .authors_for_posts(&post_ids)
            .await?
            .into_iter()
            .map(|row| (row.post_id, row.author_id))
            .collect();
        let authoritative_follows: HashSet<String> = self
            .follows
            .followed_authors(user_id)
            .await?
            .into_iter()
            .collect();

        let snapshot = accumulate_affinities(
            user_id,
            &events,
            &topics_by_post,
            &author_by_post,
            &authoritative_follows,
            config,
            now_ms,
        );
        Ok(snapshot)
    }
}

struct DimensionAccumulator {
    score: f64,
    interaction_count: u64,
    last_interaction_at_ms: i64,
}

impl DimensionAccumulator {
    fn new() -> Self {
        Self {
            score: 0.0,
            interaction_count: 0,
            last_interaction_at_ms: i64::MIN,
        }
    }

    fn add(&mut self, contribution: f64, at_ms: i64) {
        self.score += contribution;
        self.interaction_count += 1;
        self.last_interaction_at_ms = self.last_interaction_at_ms.max(at_ms);
    }
}

pub fn accumulate_affinities(
    user_id: &str,
    events: &[InteractionEvent],
    topics_by_post: &HashMap<String, Vec<(String, f64)>>,
    author_by_post: &HashMap<String, String>,
    authoritative_follows: &HashSet<String>,
    config: &AffinityConfig,
    now_ms: i64,
) -> UserAffinitySnapshot {
    let mut topic_acc: HashMap<String, DimensionAccumulator> = HashMap::new();
    let mut author_acc: HashMap<String, DimensionAccumulator> = HashMap::new();
    let mut followed_in_window: HashSet<String> = HashSet::new();

    for event in events {
        let age_hours = (now_ms - event.created_at_ms) as f64 / MS_PER_HOUR;
        let weight = decayed_weight(
            config.weights.weight_for(event.event_type),
            age_hours,
            config.decay_lambda_per_hour,
        );

        // follow_author only feeds the author dimension.
        if event.event_type != EventType::FollowAuthor {
            if let Some(topics) = topics_by_post.get(&event.post_id) {
                for (topic_id, topic_weight) in topics {
                    topic_acc
                        .entry(topic_id.clone())
                        .or_insert_with(DimensionAccumulator::new)
                        .add(weight * topic_weight, event.created_at_ms);
                }
            }
        }

        if let Some(author_id) = author_by_post.get(&event.post_id) {
            author_acc
                .entry(author_id.clone())
                .or_insert_with(DimensionAccumulator::new)
                .add(weight, event.created_at_ms);
            if event.event_type == EventType::FollowAuthor {
                followed_in_window.insert(author_id.clone());
            }
        }
    }

    let mut topics: Vec<UserTopicAffinity> = topic_acc
        .into_iter()
        .filter(|(_, acc)| acc.score.abs() > config.min_score_magnitude)
        .map(|(topic_id, acc)| UserTopicAffinity {
            user_id: user_id.to_string(),
            topic_id,
            score: acc.score,
            interaction_count: acc.interaction_count,
            last_interaction_at_ms: acc.last_interaction_at_ms,
        })
        .collect();
    topics.sort_by(|left, right| left.topic_id.cmp(&right.topic_id));

    let mut authors: Vec<UserAuthorAffinity> = author_acc
        .into_iter()
        .filter_map(|(author_id, acc)| {
            // The identity collaborator's follow fact wins over event
            // absence; a followed author's row survives the magnitude
            // threshold so the relationship stays visible to ranking.
            let is_following =
                followed_in_window.contains(&author_id) || authoritative_follows.contains(&author_id);
            if acc.score.abs() > config.min_score_magnitude
                || authoritative_follows.contains(&author_id)
            {
                Some(UserAuthorAffinity {
                    user_id: user_id.to_string(),
                    author_id,
                    score: acc.score,
                    interaction_count: acc.interaction_count,
                    is_following,
                    last_interaction_at_ms: acc.last_interaction_at_ms,
                })
            } else {
                None
            }
        })
        .collect();
    authors.sort_by(|left, right| left.author_id.cmp(&right.author_id));

    UserAffinitySnapshot {
        user_id: user_id.to_string(),
        topics,
        authors,
    }
}
