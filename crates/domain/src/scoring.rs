use crate::config::{EngagementWeights, QualityConfig};

/// Windowed per-type counts for a single post.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub impressions: u64,
    pub clicks: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub saves: u64,
    pub hides: u64,
}

pub fn engagement_rate(counts: &EventCounts, weights: &EngagementWeights) -> f64 {
    let weighted = weights.clicks * counts.clicks as f64
        + weights.likes * counts.likes as f64
        + weights.comments * counts.comments as f64
        + weights.shares * counts.shares as f64
        + weights.saves * counts.saves as f64;
    weighted / (counts.impressions.max(1) as f64)
}

/// Click-through rate with pseudo-count smoothing. With zero impressions
/// this collapses to the prior alpha / (alpha + beta).
pub fn ctr_bayesian(clicks: u64, impressions: u64, alpha: f64, beta: f64) -> f64 {
    (clicks as f64 + alpha) / (impressions as f64 + alpha + beta)
}

pub fn recency_decay(age_hours: f64, lambda_per_hour: f64) -> f64 {
    (-lambda_per_hour * age_hours.max(0.0)).exp()
}

pub fn quality_score(
    engagement_rate: f64,
    ctr_bayesian: f64,
    recency_decay: f64,
    config: &QualityConfig,
) -> f64 {
    config.blend_engagement * engagement_rate
        + config.blend_ctr * ctr_bayesian
        + config.blend_recency * recency_decay
}

/// Contribution of one event to an affinity sum: its configured weight
/// down-weighted exponentially by age.
pub fn decayed_weight(base_weight: f64, age_hours: f64, lambda_per_hour: f64) -> f64 {
    base_weight * recency_decay(age_hours, lambda_per_hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn zero_impressions_yield_zero_engagement_and_prior_ctr() {
        let counts = EventCounts {
            likes: 4,
            comments: 2,
            ..EventCounts::default()
        };
        let rate = engagement_rate(&counts, &EngagementWeights::default());
        assert_approx(rate, 0.2 * 4.0 + 0.15 * 2.0, EPS);

        let empty = EventCounts::default();
        assert_approx(engagement_rate(&empty, &EngagementWeights::default()), 0.0, EPS);
        assert_approx(ctr_bayesian(0, 0, 3.0, 30.0), 3.0 / 33.0, EPS);
    }

    #[test]
    fn reference_post_matches_known_values() {
        // 100 impressions, 10 clicks, last interaction 2 hours ago.
        let counts = EventCounts {
            impressions: 100,
            clicks: 10,
            ..EventCounts::default()
        };
        let config = QualityConfig::default();
        let rate = engagement_rate(&counts, &config.engagement);
        assert_approx(rate, 0.06, EPS);

        let ctr = ctr_bayesian(counts.clicks, counts.impressions, 3.0, 30.0);
        assert_approx(ctr, 13.0 / 133.0, EPS);

        let decay = recency_decay(2.0, 0.1);
        assert_approx(decay, (-0.2f64).exp(), EPS);

        let score = quality_score(rate, ctr, decay, &config);
        assert_approx(score, 0.4 * 0.06 + 0.3 * (13.0 / 133.0) + 0.3 * (-0.2f64).exp(), EPS);
        assert_approx(score, 0.299, 1e-3);
    }

    #[test]
    fn decay_is_one_at_zero_age_and_clamps_negative_age() {
        assert_approx(recency_decay(0.0, 0.1), 1.0, EPS);
        assert_approx(recency_decay(-5.0, 0.1), 1.0, EPS);
    }

    #[test]
    fn decayed_weight_scales_base_by_age() {
        assert_approx(decayed_weight(1.2, 0.0, 0.05), 1.2, EPS);
        let aged = decayed_weight(1.2, 10.0, 0.05);
        assert_approx(aged, 1.2 * (-0.5f64).exp(), EPS);
        assert!(aged < 1.2);
    }

    #[test]
    fn negative_weights_stay_negative_under_decay() {
        let hidden = decayed_weight(-2.0, 3.0, 0.05);
        assert!(hidden < 0.0);
        assert!(hidden > -2.0);
    }
}
