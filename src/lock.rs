//! Distributed per-auction lock (§4.4, §5). Key `lock:auction:<auction_id>`,
//! TTL 5s, value a per-acquisition unique token (fencing token) so that only
//! the holder that set it can release it.

use std::{
    collections::HashSet,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use redis::{
    aio::ConnectionManager,
    AsyncCommands,
    ExistenceCheck,
    SetExpiry,
    SetOptions,
};
use uuid::Uuid;

pub const LOCK_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, thiserror::Error)]
pub enum LockError {
    #[error("transient lock service failure: {0}")]
    Transient(String),
}

impl crate::resilience::Retriable for LockError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// A held lock. Dropping without releasing is safe: the TTL bounds how long
/// a crashed holder can keep it.
pub struct LockGuard {
    pub auction_id: String,
    pub token: String,
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Attempt to acquire the lock for `auction_id`. Returns `None` if
    /// already held by another holder (caller must not-ack and let the bus
    /// redeliver, per §4.4).
    async fn try_acquire(&self, auction_id: &str) -> Result<Option<LockGuard>, LockError>;

    /// Check-and-delete: releases only if `guard.token` still matches the
    /// stored value. A mismatch (TTL already expired and reacquired by a
    /// peer) is not an error — it is the expected racy-release case §5
    /// documents.
    async fn release(&self, guard: LockGuard) -> Result<(), LockError>;
}

fn lock_key(auction_id: &str) -> String {
    format!("lock:auction:{auction_id}")
}

pub struct RedisLock {
    conn: ConnectionManager,
}

impl RedisLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Atomically deletes the key iff its value matches the supplied token.
/// Standard Redlock-style check-and-delete; without this a TTL-expired
/// holder could release a lock a different holder has since acquired.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(&self, auction_id: &str) -> Result<Option<LockGuard>, LockError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::PX(LOCK_TTL.as_millis() as usize));
        // SET key value NX PX 5000 in one round trip: the value is only
        // ever visible with its TTL already attached, so a crash between
        // "set" and "expire" can never leave a lock that nothing expires.
        let acquired: bool = conn
            .set_options(lock_key(auction_id), &token, options)
            .await
            .map_err(|e| LockError::Transient(e.to_string()))?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            auction_id: auction_id.to_string(),
            token,
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(lock_key(&guard.auction_id))
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Transient(e.to_string()))?;
        Ok(())
    }
}

/// In-process fake for tests: a set of currently-held auction ids plus the
/// token that holds each. TTL is not simulated (tests that need expiry
/// races construct the race directly rather than sleeping 5s).
#[derive(Default)]
pub struct InMemoryLock {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, auction_id: &str) -> Result<Option<LockGuard>, LockError> {
        let mut held = self.held.lock().unwrap();
        if !held.insert(auction_id.to_string()) {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            auction_id: auction_id.to_string(),
            token: Uuid::new_v4().to_string(),
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        self.held.lock().unwrap().remove(&guard.auction_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let lock = InMemoryLock::new();
        let guard = lock.try_acquire("a1").await.unwrap().unwrap();
        assert!(lock.try_acquire("a1").await.unwrap().is_none());
        lock.release(guard).await.unwrap();
        assert!(lock.try_acquire("a1").await.unwrap().is_some());
    }
}
