use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::config::SharedScoringConfig;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::events::EventRepository;
use crate::util::{now_ms, stable_bucket, uuid_v7_without_dashes};

pub const DEFAULT_SURFACE: &str = "main_feed";

const MAX_SURFACE_LENGTH: usize = 64;
const MAX_SESSION_ID_LENGTH: usize = 128;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Like,
    Comment,
    Share,
    Save,
    Hide,
    FollowAuthor,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::Impression,
        EventType::Click,
        EventType::Like,
        EventType::Comment,
        EventType::Share,
        EventType::Save,
        EventType::Hide,
        EventType::FollowAuthor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Impression => "impression",
            EventType::Click => "click",
            EventType::Like => "like",
            EventType::Comment => "comment",
            EventType::Share => "share",
            EventType::Save => "save",
            EventType::Hide => "hide",
            EventType::FollowAuthor => "follow_author",
        }
    }

    pub fn parse(value: &str) -> Option<EventType> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == value)
    }

    /// Weight stored on the record when the caller does not supply one.
    /// The aggregators re-derive their own weights from configuration.
    pub fn default_weight(self) -> f64 {
        match self {
            EventType::Impression => 0.1,
            EventType::Click => 1.0,
            EventType::Like => 1.2,
            EventType::Comment => 1.5,
            EventType::Share => 1.8,
            EventType::Save => 1.6,
            EventType::Hide => -2.0,
            EventType::FollowAuthor => 2.0,
        }
    }
}

/// One immutable record of a user action against a post. Never updated or
/// deleted except by time-based retention pruning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    pub event_id: String,
    pub user_id: String,
    pub post_id: String,
    pub event_type: EventType,
    pub weight: f64,
    pub surface: String,
    pub session_id: Option<String>,
    pub device_type: String,
    pub created_at_ms: i64,
}

/// Raw ingestion payload. `event_type` arrives as text so that unknown
/// types are rejected here with a validation error rather than upstream.
#[derive(Clone, Debug)]
pub struct EventIngestInput {
    pub post_id: String,
    pub event_type: String,
    pub weight: Option<f64>,
    pub surface: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub client_timestamp_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AppendOutcome {
    Logged(InteractionEvent),
    SampledOut,
}

#[derive(Clone)]
pub struct EventLogService {
    repository: Arc<dyn EventRepository>,
    config: SharedScoringConfig,
}

impl EventLogService {
    pub fn new(repository: Arc<dyn EventRepository>, config: SharedScoringConfig) -> Self {
        Self { repository, config }
    }

    pub async fn append(
        &self,
        actor: &ActorIdentity,
        input: EventIngestInput,
    ) -> DomainResult<AppendOutcome> {
        let config = self.config.snapshot();
        let event_type = validate_event_type(&input.event_type)?;
        let post_id = input.post_id.trim();
        if post_id.is_empty() {
            return Err(DomainError::Validation("post_id is required".into()));
        }
        if actor.user_id.trim().is_empty() {
            return Err(DomainError::Validation("user_id is required".into()));
        }
        let surface = normalize_surface(input.surface.as_deref())?;
        let session_id = normalize_session_id(input.session_id.as_deref())?;
        let weight = match input.weight {
            Some(weight) if !weight.is_finite() => {
                return Err(DomainError::Validation("weight must be finite".into()));
            }
            Some(weight) => weight,
            None => event_type.default_weight(),
        };

        if event_type == EventType::Impression
            && !impression_sampled_in(
                session_id.as_deref().unwrap_or(&actor.user_id),
                post_id,
                config.ingest.impression_sample_rate,
            )
        {
            return Ok(AppendOutcome::SampledOut);
        }

        let event = InteractionEvent {
            event_id: uuid_v7_without_dashes(),
            user_id: actor.user_id.clone(),
            post_id: post_id.to_string(),
            event_type,
            weight,
            surface,
            session_id,
            device_type: device_type_from_user_agent(input.user_agent.as_deref()).to_string(),
            created_at_ms: input.client_timestamp_ms.unwrap_or_else(now_ms),
        };
        let event = self.repository.append(&event).await?;
        Ok(AppendOutcome::Logged(event))
    }

    /// Deletes events older than the configured retention horizon. Returns
    /// the number of pruned records.
    pub async fn prune_expired(&self, now_ms: i64) -> DomainResult<u64> {
        let config = self.config.snapshot();
        let cutoff_ms = now_ms - (config.ingest.retention_days as i64) * 24 * 60 * 60 * 1000;
        self.repository.delete_before(cutoff_ms).await
    }
}

fn validate_event_type(raw: &str) -> DomainResult<EventType> {
    EventType::parse(raw.trim())
        .ok_or_else(|| DomainError::Validation(format!("unknown event_type '{raw}'")))
}

fn normalize_surface(surface: Option<&str>) -> DomainResult<String> {
    let surface = surface.map(str::trim).filter(|value| !value.is_empty());
    match surface {
        Some(value) if value.len() > MAX_SURFACE_LENGTH => Err(DomainError::Validation(format!(
            "surface exceeds max length of {MAX_SURFACE_LENGTH}"
        ))),
        Some(value) => Ok(value.to_string()),
        None => Ok(DEFAULT_SURFACE.to_string()),
    }
}

fn normalize_session_id(session_id: Option<&str>) -> DomainResult<Option<String>> {
    let session_id = session_id.map(str::trim).filter(|value| !value.is_empty());
    match session_id {
        Some(value) if value.len() > MAX_SESSION_ID_LENGTH => {
            Err(DomainError::Validation(format!(
                "session_id exceeds max length of {MAX_SESSION_ID_LENGTH}"
            )))
        }
        Some(value) => Ok(Some(value.to_string())),
        None => Ok(None),
    }
}

/// Deterministic impression sampling: the same (session, post) pair is
/// consistently in or out of the sample at a given rate.
pub fn impression_sampled_in(session_key: &str, post_id: &str, sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return true;
    }
    if sample_rate <= 0.0 {
        return false;
    }
    let bucket = stable_bucket(&format!("{session_key}:{post_id}"));
    (bucket as f64) < sample_rate * (u64::MAX as f64)
}

pub fn device_type_from_user_agent(user_agent: Option<&str>) -> &'static str {
    let Some(user_agent) = user_agent else {
        return "desktop";
    };
    let lowered = user_agent.to_lowercase();
    if lowered.contains("tablet") || lowered.contains("ipad") {
        "tablet"
    } else if ["mobile", "android", "iphone"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        "mobile"
    } else {
        "desktop"
    }
}
