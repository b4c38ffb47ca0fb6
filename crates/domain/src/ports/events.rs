use crate::DomainResult;
use crate::events::{EventType, InteractionEvent};
use crate::ports::BoxFuture;

/// Match criteria for aggregator reads. All set fields must match.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    pub post_id: Option<String>,
    pub user_id: Option<String>,
    pub event_type: Option<EventType>,
}

/// Closed time window `[from_ms, to_ms]`. Windows from successive runs may
/// overlap; recompute is idempotent so that is safe.
#[derive(Clone, Copy, Debug)]
pub struct EventWindow {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl EventWindow {
    pub fn trailing_hours(now_ms: i64, hours: u64) -> Self {
        Self {
            from_ms: now_ms - (hours as i64) * 60 * 60 * 1000,
            to_ms: now_ms,
        }
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.from_ms && timestamp_ms <= self.to_ms
    }
}

/// Append-only interaction log. Writes are independent records; nothing
/// here performs a read-modify-write.
pub trait EventRepository: Send + Sync {
    fn append(&self, event: &InteractionEvent) -> BoxFuture<'_, DomainResult<InteractionEvent>>;

    /// Finite batch of events matching the filter inside the window. Used
    /// only by the aggregators, never on the request-serving path.
    fn query(
        &self,
        filter: &EventFilter,
        window: &EventWindow,
    ) -> BoxFuture<'_, DomainResult<Vec<InteractionEvent>>>;

    /// Sorted, deduplicated ids of posts with at least one event in the
    /// window. Drives quality batching.
    fn active_post_ids(&self, window: &EventWindow) -> BoxFuture<'_, DomainResult<Vec<String>>>;

    /// Sorted, deduplicated ids of users with at least one event in the
    /// window. Drives affinity batching.
    fn active_user_ids(&self, window: &EventWindow) -> BoxFuture<'_, DomainResult<Vec<String>>>;

    /// Retention pruning: drop events strictly older than the cutoff.
    fn delete_before(&self, cutoff_ms: i64) -> BoxFuture<'_, DomainResult<u64>>;

    fn count_since(&self, from_ms: i64) -> BoxFuture<'_, DomainResult<u64>>;
}
