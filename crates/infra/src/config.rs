use nagarik_domain::config::ScoringConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub redis_url: String,
    pub lock_backend: String,
    pub lock_prefix: String,
    pub supplement_base_url: String,
    pub supplement_api_key: String,
    pub supplement_country: String,
    pub supplement_timeout_ms: u64,
    pub supplement_page_size: usize,
    pub quality_interval_ms: u64,
    pub affinity_interval_ms: u64,
    pub retention_interval_ms: u64,
    pub aggregator_batch_size: usize,
    pub aggregator_lock_ttl_ms: u64,
    pub posts_ratio: f64,
    pub min_posts_per_page: usize,
    pub max_posts_per_page: usize,
    pub affinity_blend_weight: f64,
    pub max_candidate_fetch: usize,
    pub quality_window_hours: u64,
    pub quality_ctr_alpha: f64,
    pub quality_ctr_beta: f64,
    pub quality_decay_lambda: f64,
    pub affinity_window_hours: u64,
    pub affinity_decay_lambda: f64,
    pub affinity_min_score: f64,
    pub impression_sample_rate: f64,
    pub retention_days: u64,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("lock_backend", "memory")?
            .set_default("lock_prefix", "nagarik:locks")?
            .set_default("supplement_base_url", "https://newsapi.org/v2")?
            .set_default("supplement_api_key", "")?
            .set_default("supplement_country", "in")?
            .set_default("supplement_timeout_ms", 2500)?
            .set_default("supplement_page_size", 50)?
            .set_default("quality_interval_ms", 300_000)?
            .set_default("affinity_interval_ms", 600_000)?
            .set_default("retention_interval_ms", 3_600_000)?
            .set_default("aggregator_batch_size", 200)?
            .set_default("aggregator_lock_ttl_ms", 120_000)?
            .set_default("posts_ratio", 0.4)?
            .set_default("min_posts_per_page", 0)?
            .set_default("max_posts_per_page", 20)?
            .set_default("affinity_blend_weight", 0.3)?
            .set_default("max_candidate_fetch", 512)?
            .set_default("quality_window_hours", 168)?
            .set_default("quality_ctr_alpha", 3.0)?
            .set_default("quality_ctr_beta", 30.0)?
            .set_default("quality_decay_lambda", 0.1)?
            .set_default("affinity_window_hours", 720)?
            .set_default("affinity_decay_lambda", 0.05)?
            .set_default("affinity_min_score", 0.1)?
            .set_default("impression_sample_rate", 1.0)?
            .set_default("retention_days", 90)?
            .set_default("rate_limit_enabled", false)?
            .set_default("rate_limit_per_second", 100)?
            .set_default("rate_limit_burst", 200)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Initial scoring snapshot built from the loaded settings; later
    /// versions arrive through the hot-swap endpoint.
    pub fn scoring(&self) -> ScoringConfig {
        let mut scoring = ScoringConfig::default();
        scoring.quality.window_hours = self.quality_window_hours;
        scoring.quality.ctr_alpha = self.quality_ctr_alpha;
        scoring.quality.ctr_beta = self.quality_ctr_beta;
        scoring.quality.decay_lambda_per_hour = self.quality_decay_lambda;
        scoring.affinity.window_hours = self.affinity_window_hours;
        scoring.affinity.decay_lambda_per_hour = self.affinity_decay_lambda;
        scoring.affinity.min_score_magnitude = self.affinity_min_score;
        scoring.blend.posts_ratio = self.posts_ratio;
        scoring.blend.min_posts_per_page = self.min_posts_per_page;
        scoring.blend.max_posts_per_page = self.max_posts_per_page;
        scoring.blend.affinity_weight = self.affinity_blend_weight;
        scoring.blend.max_candidate_fetch = self.max_candidate_fetch;
        scoring.ingest.impression_sample_rate = self.impression_sample_rate;
        scoring.ingest.retention_days = self.retention_days;
        scoring
    }
}
