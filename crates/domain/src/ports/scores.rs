use crate::DomainResult;
use crate::affinity::{UserAffinitySnapshot, UserAuthorAffinity, UserTopicAffinity};
use crate::ports::BoxFuture;
use crate::quality::PostQualityScore;

/// Derived per-post quality rows. Fully rewritten by recompute; a missing
/// row means score 0.
pub trait QualityScoreRepository: Send + Sync {
    /// Upserts one batch atomically: either every row in the batch is
    /// visible afterwards or none is.
    fn upsert_batch(&self, scores: &[PostQualityScore]) -> BoxFuture<'_, DomainResult<()>>;

    fn get(&self, post_id: &str) -> BoxFuture<'_, DomainResult<Option<PostQualityScore>>>;

    fn get_many(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostQualityScore>>>;

    fn count_updated_since(&self, from_ms: i64) -> BoxFuture<'_, DomainResult<u64>>;
}

/// Derived per-user affinity rows, topic and author dimensions. A sparse
/// cache: recompute replaces each user's rows wholesale.
pub trait AffinityRepository: Send + Sync {
    /// Replaces every listed user's rows with the snapshot contents in one
    /// batch commit.
    fn replace_users(&self, batch: &[UserAffinitySnapshot]) -> BoxFuture<'_, DomainResult<()>>;

    /// Drops all rows belonging to users outside the given set. Returns
    /// the number of users whose rows were removed.
    fn retain_users(&self, user_ids: &[String]) -> BoxFuture<'_, DomainResult<u64>>;

    fn topics_for_user(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<UserTopicAffinity>>>;

    fn authors_for_user(
        &self,
        user_id: &str,
    ) -> BoxFuture<'_, DomainResult<Vec<UserAuthorAffinity>>>;

    fn topic_row_count(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>>;

    fn author_row_count(&self, user_id: &str) -> BoxFuture<'_, DomainResult<u64>>;
}
