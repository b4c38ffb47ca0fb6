use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::events::EventType;

/// Weights applied to windowed event counts when computing a post's
/// engagement rate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngagementWeights {
    pub clicks: f64,
    pub likes: f64,
    pub comments: f64,
    pub shares: f64,
    pub saves: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            clicks: 0.6,
            likes: 0.2,
            comments: 0.15,
            shares: 0.05,
            saves: 0.05,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    pub window_hours: u64,
    pub ctr_alpha: f64,
    pub ctr_beta: f64,
    pub decay_lambda_per_hour: f64,
    pub engagement: EngagementWeights,
    pub blend_engagement: f64,
    pub blend_ctr: f64,
    pub blend_recency: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_hours: 7 * 24,
            ctr_alpha: 3.0,
            ctr_beta: 30.0,
            decay_lambda_per_hour: 0.1,
            engagement: EngagementWeights::default(),
            blend_engagement: 0.4,
            blend_ctr: 0.3,
            blend_recency: 0.3,
        }
    }
}

/// Per-event-type weights for the affinity sums. Types without an explicit
/// entry fall back to `default_weight`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AffinityEventWeights {
    pub click: f64,
    pub like: f64,
    pub comment: f64,
    pub share: f64,
    pub save: f64,
    pub follow_author: f64,
    pub hide: f64,
    pub default_weight: f64,
}

impl Default for AffinityEventWeights {
    fn default() -> Self {
        Self {
            click: 1.0,
            like: 1.2,
            comment: 1.5,
            share: 1.8,
            save: 1.6,
            follow_author: 2.0,
            hide: -2.0,
            default_weight: 0.5,
        }
    }
}

impl AffinityEventWeights {
    pub fn weight_for(&self, event_type: EventType) -> f64 {
        match event_type {
            EventType::Click => self.click,
            EventType::Like => self.like,
            EventType::Comment => self.comment,
            EventType::Share => self.share,
            EventType::Save => self.save,
            EventType::FollowAuthor => self.follow_author,
            EventType::Hide => self.hide,
            EventType::Impression => self.default_weight,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AffinityConfig {
    pub window_hours: u64,
    pub decay_lambda_per_hour: f64,
    pub min_score_magnitude: f64,
    pub weights: AffinityEventWeights,
    /// Topic-derived affinity is damped relative to direct author affinity
    /// when the two are combined into one personalization signal.
    pub topic_damping: f64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            window_hours: 30 * 24,
            decay_lambda_per_hour: 0.05,
            min_score_magnitude: 0.1,
            weights: AffinityEventWeights::default(),
            topic_damping: 0.8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlendConfig {
    pub posts_ratio: f64,
    pub min_posts_per_page: usize,
    pub max_posts_per_page: usize,
    /// Weight of the viewer's personalization signal in the internal
    /// ranking key; quality keeps weight 1.0.
    pub affinity_weight: f64,
    /// Upper bound on how many internal candidates a single page request
    /// may pull before ranking (offset + page worth of posts).
    pub max_candidate_fetch: usize,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            posts_ratio: 0.4,
            min_posts_per_page: 0,
            max_posts_per_page: 20,
            affinity_weight: 0.3,
            max_candidate_fetch: 512,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Fraction of impression events that are actually persisted; the rest
    /// are acknowledged and dropped. 1.0 keeps everything.
    pub impression_sample_rate: f64,
    pub retention_days: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            impression_sample_rate: 1.0,
            retention_days: 90,
        }
    }
}

/// One immutable snapshot of every tunable the scoring pipeline reads.
/// Swapping in a new snapshot affects only future aggregation runs and
/// future blending calls; historical events are never reinterpreted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    pub version: u64,
    pub quality: QualityConfig,
    pub affinity: AffinityConfig,
    pub blend: BlendConfig,
    pub ingest: IngestConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            version: 1,
            quality: QualityConfig::default(),
            affinity: AffinityConfig::default(),
            blend: BlendConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&self.blend.posts_ratio) {
            return Err(DomainError::Validation(
                "posts_ratio must be between 0 and 1".into(),
            ));
        }
        if self.blend.min_posts_per_page > self.blend.max_posts_per_page {
            return Err(DomainError::Validation(
                "min_posts_per_page must not exceed max_posts_per_page".into(),
            ));
        }
        if self.blend.max_candidate_fetch == 0 {
            return Err(DomainError::Validation(
                "max_candidate_fetch must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ingest.impression_sample_rate) {
            return Err(DomainError::Validation(
                "impression_sample_rate must be between 0 and 1".into(),
            ));
        }
        for (name, value) in [
            ("quality.ctr_alpha", self.quality.ctr_alpha),
            ("quality.ctr_beta", self.quality.ctr_beta),
            (
                "quality.decay_lambda_per_hour",
                self.quality.decay_lambda_per_hour,
            ),
            (
                "affinity.decay_lambda_per_hour",
                self.affinity.decay_lambda_per_hour,
            ),
            (
                "affinity.min_score_magnitude",
                self.affinity.min_score_magnitude,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::Validation(format!(
                    "{name} must be a non-negative finite number"
                )));
            }
        }
        if self.quality.window_hours == 0 || self.affinity.window_hours == 0 {
            return Err(DomainError::Validation(
                "aggregation windows must be at least one hour".into(),
            ));
        }
        Ok(())
    }
}

/// Hot-swappable handle over the current [`ScoringConfig`]. Readers take an
/// `Arc` snapshot once per operation, so an in-flight aggregation run or
/// blending call always sees one consistent version.
#[derive(Clone)]
pub struct SharedScoringConfig {
    inner: Arc<RwLock<Arc<ScoringConfig>>>,
}

impl SharedScoringConfig {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<ScoringConfig> {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Validates and installs a new configuration, assigning it the next
    /// version number. Returns the installed version.
    pub fn swap(&self, mut config: ScoringConfig) -> DomainResult<u64> {
        config.validate()?;
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        config.version = guard.version + 1;
        let version = config.version;
        *guard = Arc::new(config);
        Ok(version)
    }
}

impl Default for SharedScoringConfig {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
