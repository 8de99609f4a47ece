//! In-memory windowed rate limiter
//!
//! Counters are kept per `(user, operation)` in fixed windows. `check_limit`
//! only reads; the caller increments once the guarded operation succeeded, so
//! a rejected upload never consumes quota. Check and increment are separate
//! calls and not atomic together: concurrent requests may overshoot the limit
//! by the number of in-flight checks.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stashguard_core::{AppResult, RateLimitBackend, RateLimitStatus, SecurityPolicy};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

const DEFAULT_SHARDS: usize = 16;
const MAX_BUCKETS_PER_SHARD: usize = 10_000;

type BucketKey = (Uuid, String);

#[derive(Debug, Clone)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl Bucket {
    fn new(window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: Instant::now() + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}

/// Sharded rate limiter to reduce lock contention
///
/// Keys are hashed to pick one of several independently locked maps.
pub struct InMemoryRateLimiter {
    shards: Vec<Mutex<HashMap<BucketKey, Bucket>>>,
    limit: u32,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_shards(limit, window, DEFAULT_SHARDS)
    }

    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self::new(policy.rate_limit_per_window, policy.rate_limit_window)
    }

    pub fn with_shards(limit: u32, window: Duration, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn shard(&self, key: &BucketKey) -> &Mutex<HashMap<BucketKey, Bucket>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn status(&self, count: u32, reset_in: Duration) -> RateLimitStatus {
        let reset_in = chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());
        RateLimitStatus {
            allowed: count < self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(count),
            reset_at: Utc::now() + reset_in,
        }
    }

    /// Drop buckets whose window has passed. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut cleaned = 0;
        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before = buckets.len();
            buckets.retain(|_, bucket| !bucket.is_expired(now));
            cleaned += before - buckets.len();
        }
        if cleaned > 0 {
            tracing::debug!(
                buckets_cleaned = cleaned,
                "Cleaned up expired rate limit buckets"
            );
        }
        cleaned
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimiter {
    async fn check_limit(&self, user_id: Uuid, operation: &str) -> AppResult<RateLimitStatus> {
        let key = (user_id, operation.to_string());
        let buckets = self.shard(&key).lock().await;
        let now = Instant::now();

        let status = match buckets.get(&key) {
            Some(bucket) if !bucket.is_expired(now) => {
                self.status(bucket.count, bucket.reset_at.saturating_duration_since(now))
            }
            _ => self.status(0, self.window),
        };
        Ok(status)
    }

    async fn increment_counter(&self, user_id: Uuid, operation: &str) -> AppResult<()> {
        let key = (user_id, operation.to_string());
        let mut buckets = self.shard(&key).lock().await;
        let now = Instant::now();

        if buckets.len() >= MAX_BUCKETS_PER_SHARD && !buckets.contains_key(&key) {
            buckets.retain(|_, bucket| !bucket.is_expired(now));
        }

        let bucket = buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(self.window));
        if bucket.is_expired(now) {
            *bucket = Bucket::new(self.window);
        }
        bucket.count = bucket.count.saturating_add(1);

        tracing::debug!(
            user_id = %user_id,
            operation = %operation,
            count = bucket.count,
            limit = self.limit,
            "Rate limit counter incremented"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_check_does_not_consume_quota() {
        let limiter = InMemoryRateLimiter::new(2, WINDOW);
        let user = Uuid::new_v4();

        for _ in 0..5 {
            let status = limiter.check_limit(user, "upload").await.unwrap();
            assert!(status.allowed);
            assert_eq!(status.remaining, 2);
        }
    }

    #[tokio::test]
    async fn test_increments_exhaust_limit() {
        let limiter = InMemoryRateLimiter::new(2, WINDOW);
        let user = Uuid::new_v4();

        limiter.increment_counter(user, "upload").await.unwrap();
        let status = limiter.check_limit(user, "upload").await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);

        limiter.increment_counter(user, "upload").await.unwrap();
        let status = limiter.check_limit(user, "upload").await.unwrap();
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
        assert!(status.reset_at > Utc::now());
    }

    #[tokio::test]
    async fn test_counters_are_per_user_and_operation() {
        let limiter = InMemoryRateLimiter::new(1, WINDOW);
        let user = Uuid::new_v4();
        limiter.increment_counter(user, "upload").await.unwrap();

        assert!(!limiter.check_limit(user, "upload").await.unwrap().allowed);
        assert!(limiter.check_limit(user, "presign").await.unwrap().allowed);
        assert!(limiter
            .check_limit(Uuid::new_v4(), "upload")
            .await
            .unwrap()
            .allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = InMemoryRateLimiter::new(1, Duration::from_secs(60));
        let user = Uuid::new_v4();
        limiter.increment_counter(user, "upload").await.unwrap();
        assert!(!limiter.check_limit(user, "upload").await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(limiter.check_limit(user, "upload").await.unwrap().allowed);
        assert_eq!(limiter.cleanup_expired().await, 1);
        limiter.increment_counter(user, "upload").await.unwrap();
        assert!(!limiter.check_limit(user, "upload").await.unwrap().allowed);
    }

    #[test]
    fn test_from_policy() {
        let limiter = InMemoryRateLimiter::from_policy(&SecurityPolicy::default());
        assert_eq!(limiter.limit(), 100);
    }
}
