use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::config::{ScoringConfig, SharedScoringConfig};
use crate::error::DomainError;
use crate::ports::candidates::{CandidateQuery, ContentStore};
use crate::ports::scores::{AffinityRepository, QualityScoreRepository};
use crate::ports::supplement::{SupplementQuery, SupplementSource};
use crate::util::stable_bucket;

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug)]
pub struct FeedRequest {
    pub viewer: Option<String>,
    pub session_id: Option<String>,
    /// 1-based page index.
    pub page: usize,
    pub size: usize,
    pub category: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    Internal,
    External,
}

impl ItemOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemOrigin::Internal => "internal",
            ItemOrigin::External => "external",
        }
    }
}

/// What the composer ranked an item by; reported back to the caller.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankBasis {
    Quality,
    AffinityBlend,
    SourceOrder,
}

impl RankBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            RankBasis::Quality => "quality",
            RankBasis::AffinityBlend => "affinity_blend",
            RankBasis::SourceOrder => "source_order",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposedItem {
    pub id: String,
    pub origin: ItemOrigin,
    pub title: String,
    pub body: Option<String>,
    pub author_id: Option<String>,
    pub author_name: String,
    pub created_at_ms: i64,
    pub score: f64,
    pub rank_basis: RankBasis,
    pub external_url: Option<String>,
    pub source_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedPage {
    pub items: Vec<ComposedItem>,
    pub page: usize,
    pub size: usize,
    pub total_estimate: u64,
    pub has_more: bool,
    pub degraded: bool,
}

/// Request-time blender of ranked internal posts and external supplementary
/// items. Read-only over every collaborator; each page is computed from the
/// request alone.
#[derive(Clone)]
pub struct FeedComposer {
    content: Arc<dyn ContentStore>,
    supplement: Arc<dyn SupplementSource>,
    quality: Arc<dyn QualityScoreRepository>,
    affinities: Arc<dyn AffinityRepository>,
    config: SharedScoringConfig,
}

impl FeedComposer {
    pub fn new(
        content: Arc<dyn ContentStore>,
        supplement: Arc<dyn SupplementSource>,
        quality: Arc<dyn QualityScoreRepository>,
        affinities: Arc<dyn AffinityRepository>,
        config: SharedScoringConfig,
    ) -> Self {
        Self {
            content,
            supplement,
            quality,
            affinities,
            config,
        }
    }

    pub async fn compose(&self, request: FeedRequest) -> DomainResult<FeedPage> {
        validate_request(&request)?;
        let config = self.config.snapshot();

        let target_posts = target_posts(
            request.size,
            config.blend.posts_ratio,
            config.blend.min_posts_per_page,
            config.blend.max_posts_per_page,
        );
        let target_supplement = request.size - target_posts;
        let internal_offset = (request.page - 1) * target_posts;

        let mut internal_failed = false;
        let internal = match self
            .ranked_internal(
                request.viewer.as_deref(),
                internal_offset,
                target_posts,
                &config,
            )
            .await
        {
            Ok(items) => items,
            Err(DomainError::TransientSource(_)) | Err(DomainError::Unavailable(_)) => {
                internal_failed = true;
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        // Shortfall on the internal side widens the external ask; a fully
        // empty internal page degrades to external-only at full size.
        let shortfall = target_posts - internal.len();
        let supplement_count = (target_supplement + shortfall).min(request.size);

        let mut external_failed = false;
        let external = if supplement_count == 0 {
            Vec::new()
        } else {
            let query = SupplementQuery {
                category: request.category.clone(),
                offset: external_offset(request.page, request.size, request.session_id.as_deref()),
                count: supplement_count,
            };
            match self.supplement.fetch(&query).await {
                Ok(items) => items,
                Err(DomainError::TransientSource(_)) | Err(DomainError::Unavailable(_)) => {
                    external_failed = true;
                    Vec::new()
                }
                Err(err) => return Err(err),
            }
        };

        if internal_failed && external_failed {
            return Err(DomainError::Unavailable(
                "internal and external content sources both failed".into(),
            ));
        }

        let mut items = internal;
        items.extend(external.into_iter().map(|item| ComposedItem {
            id: item.id,
            origin: ItemOrigin::External,
            title: item.title,
            body: item.body,
            author_id: None,
            author_name: item.source_name.clone(),
            created_at_ms: item.published_at_ms,
            score: 0.0,
            rank_basis: RankBasis::SourceOrder,
            external_url: item.external_url,
            source_name: Some(item.source_name),
        }));
        items.truncate(request.size);

        if items.is_empty() {
            // An empty page is never reported as success; by this point at
            // least one source answered and still nothing exists to show.
            return Err(DomainError::Unavailable(
                "no content available for this page".into(),
            ));
        }

        let has_more = items.len() == request.size;
        let total_estimate =
            (request.size * request.page + if has_more { request.size } else { 0 }) as u64;

        Ok(FeedPage {
            items,
            page: request.page,
            size: request.size,
            total_estimate,
            has_more,
            degraded: internal_failed || external_failed,
        })
    }

    /// Internal candidates ranked by quality, optionally blended with the
    /// viewer's affinity signal, sliced statelessly by page offset.
    async fn ranked_internal(
        &self,
        viewer: Option<&str>,
        offset: usize,
        limit: usize,
        config: &ScoringConfig,
    ) -> DomainResult<Vec<ComposedItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let fetch_limit = (offset + limit).min(config.blend.max_candidate_fetch);
        let candidates = self
            .content
            .recent_candidates(&CandidateQuery { limit: fetch_limit })
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.post_id.clone())
            .collect();
        let quality_by_post: HashMap<String, f64> = self
            .quality
            .get_many(&post_ids)
            .await?
            .into_iter()
            .map(|row| (row.post_id.clone(), row.quality_score))
            .collect();

        let personalization = match viewer {
            Some(viewer) => {
                Some(
                    self.viewer_personalization(viewer, &post_ids, config)
                        .await?,
                )
            }
            None => None,
        };
        let rank_basis = match &personalization {
            Some(signal) if signal.has_rows => RankBasis::AffinityBlend,
            _ => RankBasis::Quality,
        };

        let mut ranked: Vec<ComposedItem> = candidates
            .into_iter()
            .map(|candidate| {
                // A post with no derived score row ranks as score 0.
                let quality = quality_by_post
                    .get(&candidate.post_id)
                    .copied()
                    .unwrap_or(0.0);
                let personal = personalization
                    .as_ref()
                    .map(|signal| signal.for_post(&candidate.post_id, &candidate.author_id))
                    .unwrap_or(0.0);
                let score = quality + config.blend.affinity_weight * personal;
                ComposedItem {
                    id: candidate.post_id,
                    origin: ItemOrigin::Internal,
                    title: candidate.title,
                    body: candidate.body,
                    author_id: Some(candidate.author_id),
                    author_name: candidate.author_username,
                    created_at_ms: candidate.created_at_ms,
                    score,
                    rank_basis,
                    external_url: None,
                    source_name: None,
                }
            })
            .collect();

        ranked.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| right.created_at_ms.cmp(&left.created_at_ms))
                .then_with(|| right.id.cmp(&left.id))
        });

        Ok(ranked.into_iter().skip(offset).take(limit).collect())
    }

    async fn viewer_personalization(
        &self,
        viewer: &str,
        post_ids: &[String],
        config: &ScoringConfig,
    ) -> DomainResult<PersonalizationSignal> {
        let author_scores: HashMap<String, f64> = self
            .affinities
            .authors_for_user(viewer)
            .await?
            .into_iter()
            .map(|row| (row.author_id, row.score))
            .collect();
        let topic_scores: HashMap<String, f64> = self
            .affinities
            .topics_for_user(viewer)
            .await?
            .into_iter()
            .map(|row| (row.topic_id, row.score))
            .collect();

        let mut topics_by_post: HashMap<String, Vec<String>> = HashMap::new();
        if !topic_scores.is_empty() {
            for row in self.content.topics_for_posts(post_ids).await? {
                topics_by_post.entry(row.post_id).or_default().push(row.topic_id);
            }
        }

        Ok(PersonalizationSignal {
            has_rows: !author_scores.is_empty() || !topic_scores.is_empty(),
            author_scores,
            topic_scores,
            topics_by_post,
            topic_damping: config.affinity.topic_damping,
        })
    }
}

struct PersonalizationSignal {
    has_rows: bool,
    author_scores: HashMap<String, f64>,
    topic_scores: HashMap<String, f64>,
    topics_by_post: HashMap<String, Vec<String>>,
    topic_damping: f64,
}

impl PersonalizationSignal {
    /// Author affinity counts in full; topic affinity is damped. The
    /// stronger of the two carries the post.
    fn for_post(&self, post_id: &str, author_id: &str) -> f64 {
        let author = self.author_scores.get(author_id).copied().unwrap_or(0.0);
        let topic = self
            .topics_by_post
            .get(post_id)
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|topic_id| self.topic_scores.get(topic_id))
                    .fold(0.0f64, |acc, score| acc.max(*score))
            })
            .unwrap_or(0.0);
        author.max(self.topic_damping * topic)
    }
}

fn validate_request(request: &FeedRequest) -> DomainResult<()> {
    if request.page == 0 {
        return Err(DomainError::Validation("page must be at least 1".into()));
    }
    if request.size == 0 || request.size > MAX_PAGE_SIZE {
        return Err(DomainError::Validation(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Clamped internal share of one page.
pub fn target_posts(size: usize, posts_ratio: f64, min_posts: usize, max_posts: usize) -> usize {
    let by_ratio = (size as f64 * posts_ratio).floor() as usize;
    by_ratio.clamp(min_posts, max_posts.max(min_posts)).min(size)
}

/// Absolute offset into the external source's item sequence for one page.
/// Strides by the full page size so consecutive pages read disjoint ranges,
/// with a session-stable rotation so different sessions start elsewhere.
pub fn external_offset(page: usize, size: usize, session_id: Option<&str>) -> usize {
    let stride = session_id
        .map(|session| (stable_bucket(session) % size.max(1) as u64) as usize)
        .unwrap_or(0);
    (page - 1) * size + stride
}
