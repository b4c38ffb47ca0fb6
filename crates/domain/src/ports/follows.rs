use crate::DomainResult;
use crate::ports::BoxFuture;

/// Read-only view of the identity collaborator's authoritative follow
/// relationships.
pub trait FollowFacts: Send + Sync {
    fn followed_authors(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Vec<String>>>;
}
