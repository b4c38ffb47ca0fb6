use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use nagarik_domain::ports::candidates::{CandidatePost, Topic};
use nagarik_domain::ports::locks::JobLock;
use nagarik_domain::ports::scores::QualityScoreRepository;
use nagarik_domain::ports::supplement::SupplementItem;
use nagarik_domain::quality::QUALITY_LOCK_NAME;
use nagarik_domain::util::now_ms;
use nagarik_infra::config::AppConfig;
use nagarik_infra::locks::InMemoryJobLock;
use nagarik_infra::repositories::{
    InMemoryAffinityRepository, InMemoryContentStore, InMemoryEventRepository,
    InMemoryFollowFacts, InMemoryQualityScoreRepository,
};
use nagarik_infra::supplement::StaticSupplementSource;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        lock_backend: "memory".to_string(),
        lock_prefix: "nagarik:locks:test".to_string(),
        supplement_base_url: "https://newsapi.example/v2".to_string(),
        supplement_api_key: String::new(),
        supplement_country: "in".to_string(),
        supplement_timeout_ms: 2_500,
        supplement_page_size: 50,
        quality_interval_ms: 300_000,
        affinity_interval_ms: 600_000,
        retention_interval_ms: 3_600_000,
        aggregator_batch_size: 50,
        aggregator_lock_ttl_ms: 120_000,
        posts_ratio: 0.4,
        min_posts_per_page: 0,
        max_posts_per_page: 20,
        affinity_blend_weight: 0.3,
        max_candidate_fetch: 512,
        quality_window_hours: 168,
        quality_ctr_alpha: 3.0,
        quality_ctr_beta: 30.0,
        quality_decay_lambda: 0.1,
        affinity_window_hours: 720,
        affinity_decay_lambda: 0.05,
        affinity_min_score: 0.1,
        impression_sample_rate: 1.0,
        retention_days: 90,
        rate_limit_enabled: false,
        rate_limit_per_second: 100,
        rate_limit_burst: 200,
    }
}

struct Harness {
    state: AppState,
    content: Arc<InMemoryContentStore>,
    supplement: Arc<StaticSupplementSource>,
    lock: Arc<InMemoryJobLock>,
}

fn harness() -> Harness {
    let lock = Arc::new(InMemoryJobLock::new());
    let supplement = Arc::new(StaticSupplementSource::new());
    let content = Arc::new(InMemoryContentStore::new());
    let state = AppState::assemble(
        test_config(),
        lock.clone(),
        supplement.clone(),
        Arc::new(InMemoryEventRepository::new()),
        Arc::new(InMemoryQualityScoreRepository::new()),
        Arc::new(InMemoryAffinityRepository::new()),
        content.clone(),
        Arc::new(InMemoryFollowFacts::new()),
    );
    Harness {
        state,
        content,
        supplement,
        lock,
    }
}

impl Harness {
    fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    async fn seed_posts(&self, count: usize) {
        let now = now_ms();
        for index in 0..count {
            self.content
                .add_post(CandidatePost {
                    post_id: format!("post-{index:02}"),
                    author_id: "author-1".to_string(),
                    author_username: "author-one".to_string(),
                    title: format!("post {index}"),
                    body: None,
                    created_at_ms: now - index as i64 * 60_000,
                })
                .await;
        }
    }

    async fn seed_news(&self, count: usize) {
        self.supplement
            .set_items(
                (0..count)
                    .map(|index| SupplementItem {
                        id: format!("ext-{index:04}"),
                        title: format!("headline {index}"),
                        body: Some(format!("summary {index}")),
                        source_name: "wire".to_string(),
                        external_url: Some(format!("https://news.example/{index}")),
                        image_url: None,
                        published_at_ms: now_ms() - index as i64 * 60_000,
                    })
                    .collect(),
            )
            .await;
    }
}

fn post_json(uri: &str, user_id: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get_request(uri: &str, user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::empty()).expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = harness().router();
    let response = app
        .oneshot(get_request("/health", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn event_ingestion_logs_and_returns_event_id() {
    let app = harness().router();
    let response = app
        .oneshot(post_json(
            "/v1/events",
            Some("user-1"),
            json!({"post_id": "post-1", "event_type": "like"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["event_id"].is_string());
}

#[tokio::test]
async fn event_ingestion_rejects_unknown_event_type() {
    let app = harness().router();
    let response = app
        .oneshot(post_json(
            "/v1/events",
            Some("user-1"),
            json!({"post_id": "post-1", "event_type": "upvote"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn event_ingestion_requires_identity() {
    let app = harness().router();
    let response = app
        .oneshot(post_json(
            "/v1/events",
            None,
            json!({"post_id": "post-1", "event_type": "like"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feed_blends_internal_shortfall_with_external_items() {
    let harness = harness();
    harness.seed_posts(3).await;
    harness.seed_news(60).await;

    let response = harness
        .router()
        .oneshot(get_request("/v1/feed?page=1&size=20", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 20);
    let internal = items
        .iter()
        .filter(|item| item["origin"] == "internal")
        .count();
    let external = items
        .iter()
        .filter(|item| item["origin"] == "external")
        .count();
    assert_eq!(internal, 3);
    assert_eq!(external, 17);
    assert_eq!(body["degraded"], false);
    assert_eq!(body["has_more"], true);
}

#[tokio::test]
async fn feed_degrades_to_external_only_without_posts() {
    let harness = harness();
    harness.seed_news(60).await;

    let response = harness
        .router()
        .oneshot(get_request("/v1/feed?page=1&size=20", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 20);
    assert!(items.iter().all(|item| item["origin"] == "external"));
}

#[tokio::test]
async fn feed_flags_degraded_page_when_supplement_fails() {
    let harness = harness();
    harness.seed_posts(10).await;
    harness.supplement.set_failing(true).await;

    let response = harness
        .router()
        .oneshot(get_request("/v1/feed?page=1&size=20", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["degraded"], true);
    let items = body["items"].as_array().expect("items");
    assert!(!items.is_empty());
    assert!(items.iter().all(|item| item["origin"] == "internal"));
}

#[tokio::test]
async fn feed_with_no_content_anywhere_is_service_unavailable() {
    let harness = harness();
    harness.supplement.set_failing(true).await;

    let response = harness
        .router()
        .oneshot(get_request("/v1/feed?page=1&size=20", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "no_content_available");
}

#[tokio::test]
async fn admin_refresh_quality_aggregates_logged_events() {
    let harness = harness();
    harness.seed_posts(1).await;
    let app = harness.router();

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/events",
                Some("user-1"),
                json!({"post_id": "post-00", "event_type": "impression"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/events",
            Some("user-1"),
            json!({"post_id": "post-00", "event_type": "click"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json("/v1/admin/refresh-quality", Some("admin-1"), json!({})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["updated"], 1);
    assert_eq!(body["completed"], true);

    let row = harness
        .state
        .quality_scores
        .get("post-00")
        .await
        .expect("get")
        .expect("row");
    assert_eq!(row.impressions, 5);
    assert_eq!(row.clicks, 1);
}

#[tokio::test]
async fn concurrent_refresh_returns_conflict() {
    let harness = harness();
    let guard = harness
        .lock
        .acquire(QUALITY_LOCK_NAME, Duration::from_secs(60))
        .await
        .expect("acquire")
        .expect("free lock");

    let response = harness
        .router()
        .oneshot(post_json("/v1/admin/refresh-quality", Some("admin-1"), json!({})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "conflict");

    harness.lock.release(&guard).await.expect("release");
}

#[tokio::test]
async fn stats_reports_interaction_and_affinity_counts() {
    let harness = harness();
    harness.seed_posts(1).await;
    harness.content.tag_topic("post-00", "topic-roads", 1.0).await;
    harness
        .content
        .define_topic(Topic {
            id: "topic-roads".to_string(),
            name: "Roads".to_string(),
            slug: "roads".to_string(),
            parent_id: None,
        })
        .await;
    let app = harness.router();

    for event_type in ["like", "like", "comment"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/events",
                Some("user-1"),
                json!({"post_id": "post-00", "event_type": event_type}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/admin/refresh-affinities",
            Some("admin-1"),
            json!({}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/v1/recommendations/stats", Some("user-1")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["interactions_24h"], 3);
    assert_eq!(body["author_affinities"], 1);
    assert_eq!(body["topic_affinities"], 1);
    assert_eq!(body["top_topics"][0]["topic_id"], "topic-roads");
    assert_eq!(body["top_topics"][0]["topic_name"], "Roads");
}

#[tokio::test]
async fn scoring_config_round_trips_and_validates() {
    let harness = harness();
    let app = harness.router();

    let response = app
        .clone()
        .oneshot(get_request("/v1/admin/scoring-config", Some("admin-1")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let mut config = body_json(response).await;
    assert_eq!(config["version"], 1);

    config["blend"]["posts_ratio"] = json!(0.7);
    let request = Request::builder()
        .method("PUT")
        .uri("/v1/admin/scoring-config")
        .header(CONTENT_TYPE, "application/json")
        .header("x-user-id", "admin-1")
        .body(Body::from(config.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["version"], 2);

    let mut bad = harness.state.scoring.snapshot().as_ref().clone();
    bad.blend.posts_ratio = 2.0;
    let request = Request::builder()
        .method("PUT")
        .uri("/v1/admin/scoring-config")
        .header(CONTENT_TYPE, "application/json")
        .header("x-user-id", "admin-1")
        .body(Body::from(serde_json::to_string(&bad).expect("serialize")))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
