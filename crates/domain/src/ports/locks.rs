use std::time::Duration;

use crate::DomainResult;
use crate::ports::BoxFuture;

/// Proof of holding a named lock; the token guards against releasing a
/// lock that expired and was re-acquired by another holder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockGuard {
    pub name: String,
    pub token: String,
}

/// Named mutual-exclusion lock scoping one aggregator job. Two runs of the
/// same job must never interleave; different jobs use different names and
/// may run concurrently.
pub trait JobLock: Send + Sync {
    /// Returns `None` when another holder currently owns the name.
    fn acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, DomainResult<Option<LockGuard>>>;

    fn release(&self, guard: &LockGuard) -> BoxFuture<'_, DomainResult<()>>;
}
