use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nagarik_domain::DomainResult;
use nagarik_domain::error::DomainError;
use nagarik_domain::ports::BoxFuture;
use nagarik_domain::ports::locks::{JobLock, LockGuard};
use nagarik_domain::util::uuid_v7_without_dashes;
use redis::aio::ConnectionManager;

const DEFAULT_PREFIX: &str = "nagarik:locks";

/// Named lock over Redis: `SET NX PX` to claim, token-compared Lua delete
/// to release so an expired-and-reclaimed lock is never released by the
/// previous holder.
#[derive(Clone)]
pub struct RedisJobLock {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisJobLock {
    pub async fn connect(redis_url: &str) -> DomainResult<Self> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> DomainResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| DomainError::TransientSource(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| DomainError::TransientSource(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}:{name}", self.prefix)
    }

    fn ttl_ms(ttl: Duration) -> u64 {
        let ms = ttl.as_millis() as u64;
        if ms == 0 { 1 } else { ms }
    }
}

impl JobLock for RedisJobLock {
    fn acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, DomainResult<Option<LockGuard>>> {
        let key = self.lock_key(name);
        let name = name.to_string();
        let token = uuid_v7_without_dashes();
        let ttl_ms = Self::ttl_ms(ttl);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let claimed: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|err| DomainError::TransientSource(err.to_string()))?;
            Ok(claimed.map(|_| LockGuard { name, token }))
        })
    }

    fn release(&self, guard: &LockGuard) -> BoxFuture<'_, DomainResult<()>> {
        let key = self.lock_key(&guard.name);
        let token = guard.token.clone();
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let script = redis::Script::new(
                r#"
                    if redis.call('GET', KEYS[1]) == ARGV[1] then
                        return redis.call('DEL', KEYS[1])
                    end
                    return 0
                "#,
            );
            let _: i32 = script
                .key(&key)
                .arg(&token)
                .invoke_async(&mut conn)
                .await
                .map_err(|err| DomainError::TransientSource(err.to_string()))?;
            Ok(())
        })
    }
}

/// Process-local lock with the same semantics, used by tests and the
/// single-process development setup.
#[derive(Default)]
pub struct InMemoryJobLock {
    inner: Mutex<HashMap<String, HeldLock>>,
}

struct HeldLock {
    token: String,
    expires_at: Instant,
}

impl InMemoryJobLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobLock for InMemoryJobLock {
    fn acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> BoxFuture<'_, DomainResult<Option<LockGuard>>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut held = self.inner.lock().expect("job lock state");
            if let Some(existing) = held.get(&name) {
                if existing.expires_at > Instant::now() {
                    return Ok(None);
                }
            }
            let token = uuid_v7_without_dashes();
            held.insert(
                name.clone(),
                HeldLock {
                    token: token.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
            Ok(Some(LockGuard { name, token }))
        })
    }

    fn release(&self, guard: &LockGuard) -> BoxFuture<'_, DomainResult<()>> {
        let name = guard.name.clone();
        let token = guard.token.clone();
        Box::pin(async move {
            let mut held = self.inner.lock().expect("job lock state");
            if held
                .get(&name)
                .is_some_and(|existing| existing.token == token)
            {
                held.remove(&name);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let lock = InMemoryJobLock::new();
        let guard = lock
            .acquire("aggregate:quality", Duration::from_secs(30))
            .await
            .expect("acquire")
            .expect("free lock");
        assert!(
            lock.acquire("aggregate:quality", Duration::from_secs(30))
                .await
                .expect("acquire")
                .is_none()
        );

        lock.release(&guard).await.expect("release");
        assert!(
            lock.acquire("aggregate:quality", Duration::from_secs(30))
                .await
                .expect("acquire")
                .is_some()
        );
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let lock = InMemoryJobLock::new();
        let quality = lock
            .acquire("aggregate:quality", Duration::from_secs(30))
            .await
            .expect("acquire");
        let affinity = lock
            .acquire("aggregate:affinity", Duration::from_secs(30))
            .await
            .expect("acquire");
        assert!(quality.is_some());
        assert!(affinity.is_some());
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimable_and_stale_release_is_ignored() {
        let lock = InMemoryJobLock::new();
        let stale = lock
            .acquire("aggregate:quality", Duration::from_millis(0))
            .await
            .expect("acquire")
            .expect("free lock");

        let fresh = lock
            .acquire("aggregate:quality", Duration::from_secs(30))
            .await
            .expect("acquire")
            .expect("expired lock reclaimed");

        // Releasing with the stale token must not free the fresh holder.
        lock.release(&stale).await.expect("release");
        assert!(
            lock.acquire("aggregate:quality", Duration::from_secs(30))
                .await
                .expect("acquire")
                .is_none()
        );

        lock.release(&fresh).await.expect("release");
    }
}
