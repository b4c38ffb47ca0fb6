use std::time::Instant;

use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::http::header;
use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use nagarik_domain::config::ScoringConfig;
use nagarik_domain::events::{AppendOutcome, EventIngestInput};
use nagarik_domain::feed::{ComposedItem, FeedPage, FeedRequest, ItemOrigin};
use nagarik_domain::identity::ActorIdentity;
use nagarik_domain::util::{format_ms_rfc3339, now_ms};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::IdentityContext;
use crate::observability;
use crate::state::AppState;
use crate::{middleware as app_middleware, validation};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const STATS_TOP_TOPICS: usize = 5;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/events", post(log_event))
        .route("/v1/recommendations/stats", get(recommendation_stats))
        .route("/v1/admin/refresh-quality", post(refresh_quality))
        .route("/v1/admin/refresh-affinities", post(refresh_affinities))
        .route(
            "/v1/admin/scoring-config",
            get(get_scoring_config).put(put_scoring_config),
        )
        .route_layer(middleware::from_fn(
            app_middleware::require_identity_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/v1/feed", get(feed))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(app_middleware::identity_middleware))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .layer(middleware::from_fn(app_middleware::metrics_layer));

    if state.config.rate_limit_enabled {
        app = app.layer(app_middleware::rate_limit_layer(
            state.config.rate_limit_per_second,
            state.config.rate_limit_burst,
        ));
    }

    app.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics() -> Result<String, ApiError> {
    observability::render_metrics().ok_or(ApiError::Internal)
}

#[derive(Debug, Deserialize, Validate)]
struct EventBody {
    #[validate(length(min = 1, max = 128))]
    post_id: String,
    #[validate(length(min = 1, max = 32))]
    event_type: String,
    surface: Option<String>,
    session_id: Option<String>,
    weight: Option<f64>,
    client_timestamp_ms: Option<i64>,
}

#[derive(Serialize)]
struct EventResponse {
    success: bool,
    message: &'static str,
    event_id: Option<String>,
}

async fn log_event(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    headers: HeaderMap,
    Json(body): Json<EventBody>,
) -> Result<Json<EventResponse>, ApiError> {
    validation::validate(&body)?;
    let actor = actor_from_identity(&identity)?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let input = EventIngestInput {
        post_id: body.post_id,
        event_type: body.event_type.clone(),
        weight: body.weight,
        surface: body.surface,
        session_id: body.session_id,
        user_agent,
        client_timestamp_ms: body.client_timestamp_ms,
    };

    match state.event_log.append(&actor, input).await {
        Ok(AppendOutcome::Logged(event)) => {
            observability::register_event_ingested(event.event_type.as_str(), "logged");
            Ok(Json(EventResponse {
                success: true,
                message: "event logged",
                event_id: Some(event.event_id),
            }))
        }
        Ok(AppendOutcome::SampledOut) => {
            observability::register_event_ingested(&body.event_type, "sampled_out");
            Ok(Json(EventResponse {
                success: true,
                message: "event sampled out",
                event_id: None,
            }))
        }
        Err(err) => {
            observability::register_event_rejected("validation");
            Err(err.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedParams {
    page: Option<usize>,
    size: Option<usize>,
    category: Option<String>,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct FeedItemBody {
    id: String,
    origin: &'static str,
    title: String,
    body: Option<String>,
    author_id: Option<String>,
    author_name: String,
    created_at: String,
    score: f64,
    rank_basis: &'static str,
    external_url: Option<String>,
    source_name: Option<String>,
}

#[derive(Serialize)]
struct FeedResponseBody {
    items: Vec<FeedItemBody>,
    page: usize,
    size: usize,
    total: u64,
    has_more: bool,
    degraded: bool,
}

async fn feed(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponseBody>, ApiError> {
    let request = FeedRequest {
        viewer: identity.user_id.clone(),
        session_id: params.session_id,
        page: params.page.unwrap_or(1),
        size: params.size.unwrap_or(20),
        category: params.category,
    };

    let page = state.composer.compose(request).await.map_err(|err| {
        observability::register_feed_page("failed", false);
        ApiError::from(err)
    })?;
    observability::register_feed_page(feed_outcome(&page), page.degraded);

    Ok(Json(FeedResponseBody {
        items: page.items.into_iter().map(feed_item_body).collect(),
        page: page.page,
        size: page.size,
        total: page.total_estimate,
        has_more: page.has_more,
        degraded: page.degraded,
    }))
}

fn feed_outcome(page: &FeedPage) -> &'static str {
    let internal = page
        .items
        .iter()
        .filter(|item| item.origin == ItemOrigin::Internal)
        .count();
    if internal == page.items.len() {
        "internal_only"
    } else if internal == 0 {
        "external_only"
    } else {
        "mixed"
    }
}

fn feed_item_body(item: ComposedItem) -> FeedItemBody {
    FeedItemBody {
        id: item.id,
        origin: item.origin.as_str(),
        title: item.title,
        body: item.body,
        author_id: item.author_id,
        author_name: item.author_name,
        created_at: format_ms_rfc3339(item.created_at_ms),
        score: item.score,
        rank_basis: item.rank_basis.as_str(),
        external_url: item.external_url,
        source_name: item.source_name,
    }
}

#[derive(Serialize)]
struct TopTopicBody {
    topic_id: String,
    topic_name: String,
    score: f64,
    interaction_count: u64,
}

#[derive(Serialize)]
struct StatsResponse {
    interactions_24h: u64,
    posts_with_quality_24h: u64,
    topic_affinities: u64,
    author_affinities: u64,
    top_topics: Vec<TopTopicBody>,
}

async fn recommendation_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
) -> Result<Json<StatsResponse>, ApiError> {
    let actor = actor_from_identity(&identity)?;
    let since_ms = now_ms() - DAY_MS;

    let interactions_24h = state.events.count_since(since_ms).await?;
    let posts_with_quality_24h = state.quality_scores.count_updated_since(since_ms).await?;
    let topic_affinities = state.affinities.topic_row_count(&actor.user_id).await?;
    let author_affinities = state.affinities.author_row_count(&actor.user_id).await?;

    let top_rows: Vec<_> = state
        .affinities
        .topics_for_user(&actor.user_id)
        .await?
        .into_iter()
        .take(STATS_TOP_TOPICS)
        .collect();
    let topic_ids: Vec<String> = top_rows.iter().map(|row| row.topic_id.clone()).collect();
    let names: std::collections::HashMap<String, String> = state
        .content
        .topic_details(&topic_ids)
        .await?
        .into_iter()
        .map(|topic| (topic.id, topic.name))
        .collect();
    let top_topics = top_rows
        .into_iter()
        .map(|row| TopTopicBody {
            topic_name: names
                .get(&row.topic_id)
                .cloned()
                .unwrap_or_else(|| row.topic_id.clone()),
            topic_id: row.topic_id,
            score: row.score,
            interaction_count: row.interaction_count,
        })
        .collect();

    Ok(Json(StatsResponse {
        interactions_24h,
        posts_with_quality_24h,
        topic_affinities,
        author_affinities,
        top_topics,
    }))
}

#[derive(Serialize)]
struct RunResponse {
    success: bool,
    updated: usize,
    batches: usize,
    completed: bool,
}

async fn refresh_quality(State(state): State<AppState>) -> Result<Json<RunResponse>, ApiError> {
    let start = Instant::now();
    let result = state.quality.run(now_ms()).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(summary) => {
            observability::register_aggregation_run("quality", "success", elapsed_ms);
            Ok(Json(RunResponse {
                success: true,
                updated: summary.posts_updated,
                batches: summary.batches_committed,
                completed: summary.completed,
            }))
        }
        Err(err) => {
            observability::register_aggregation_run("quality", "error", elapsed_ms);
            Err(err.into())
        }
    }
}

async fn refresh_affinities(State(state): State<AppState>) -> Result<Json<RunResponse>, ApiError> {
    let start = Instant::now();
    let result = state.affinity.run(now_ms()).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(summary) => {
            observability::register_aggregation_run("affinity", "success", elapsed_ms);
            Ok(Json(RunResponse {
                success: true,
                updated: summary.users_updated,
                batches: summary.batches_committed,
                completed: summary.completed,
            }))
        }
        Err(err) => {
            observability::register_aggregation_run("affinity", "error", elapsed_ms);
            Err(err.into())
        }
    }
}

async fn get_scoring_config(State(state): State<AppState>) -> Json<ScoringConfig> {
    Json(state.scoring.snapshot().as_ref().clone())
}

#[derive(Serialize)]
struct SwapResponse {
    success: bool,
    version: u64,
}

async fn put_scoring_config(
    State(state): State<AppState>,
    Json(config): Json<ScoringConfig>,
) -> Result<Json<SwapResponse>, ApiError> {
    let version = state.scoring.swap(config)?;
    tracing::info!(version, "scoring configuration swapped");
    Ok(Json(SwapResponse {
        success: true,
        version,
    }))
}

fn actor_from_identity(identity: &IdentityContext) -> Result<ActorIdentity, ApiError> {
    let user_id = identity.user_id.clone().ok_or(ApiError::Unauthorized)?;
    let username = identity.username.clone().unwrap_or_else(|| user_id.clone());
    Ok(ActorIdentity { user_id, username })
}
