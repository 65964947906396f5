// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Tiered token-bucket admission control
//!
//! One bucket per (actor or client key, endpoint, tier). Buckets refill
//! continuously at `requests_per_minute / 60` tokens per second up to
//! `burst_size`, so a bucket admits at most `burst_size + requests_per_minute`
//! requests in any one-minute window. Denials are cheap and never block.

mod bucket;
pub mod table;

pub use table::*;

use crate::error::{GuardError, GuardResult};
use bucket::TokenBucket;
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Bucket capacity
    pub limit: u32,
    /// Whole tokens left after this check
    pub remaining: u32,
    /// Time until the bucket is full again, `Duration::MAX` if it never refills
    pub reset_after: Duration,
    /// Time until the next request can succeed; `None` when waiting will not help
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn refused(limit: u32, reset_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_after,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    client: String,
    endpoint: String,
    tier: RateTier,
}

/// Rate limiter using token bucket algorithm
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<BucketKey, TokenBucket>,
    table: RateLimitTable,
    idle_window: Duration,
}

impl RateLimiter {
    /// Buckets idle longer than `idle_window` are dropped once refill has topped them up
    pub fn new(table: RateLimitTable, idle_window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            table,
            idle_window,
        }
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    pub fn idle_window(&self) -> Duration {
        self.idle_window
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn check(&self, client: &str, endpoint: &str, tier: RateTier) -> RateLimitDecision {
        self.check_at(client, endpoint, tier, Instant::now())
    }

    /// Admission check against an explicit clock reading
    pub fn check_at(&self, client: &str, endpoint: &str, tier: RateTier, now: Instant) -> RateLimitDecision {
        let Some(rule) = self.table.rule(endpoint, tier) else {
            warn!(client = client, endpoint = endpoint, tier = %tier, "No rate limit rule; denying");
            counter!("dotguard_rate_limit_denied", 1);
            return RateLimitDecision::refused(0, Duration::ZERO);
        };

        if rule.is_zero() {
            debug!(client = client, endpoint = endpoint, tier = %tier, "Zero allowance");
            counter!("dotguard_rate_limit_denied", 1);
            return RateLimitDecision::refused(0, Duration::ZERO);
        }

        let key = BucketKey {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
            tier,
        };

        // The entry guard holds the shard lock: refill and consume are atomic per bucket
        let mut bucket = self.buckets.entry(key).or_insert_with(|| TokenBucket::new(rule, now));

        let allowed = bucket.try_consume(now);
        let decision = RateLimitDecision {
            allowed,
            limit: rule.burst_size,
            remaining: bucket.remaining(),
            reset_after: bucket.reset_after().unwrap_or(Duration::MAX),
            retry_after: if allowed { None } else { bucket.retry_after() },
        };
        drop(bucket);

        if allowed {
            counter!("dotguard_rate_limit_allowed", 1);
            debug!(client = client, endpoint = endpoint, tier = %tier, remaining = decision.remaining, "Rate limit check passed");
        } else {
            counter!("dotguard_rate_limit_denied", 1);
            warn!(client = client, endpoint = endpoint, tier = %tier, retry_after_ms = ?decision.retry_after.map(|d| d.as_millis() as u64), "Rate limit exceeded");
        }

        decision
    }

    /// Admission check that turns a denial into [`GuardError::RateLimited`]
    pub fn require(&self, client: &str, endpoint: &str, tier: RateTier) -> GuardResult<RateLimitDecision> {
        let decision = self.check(client, endpoint, tier);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(GuardError::RateLimited {
                message: format!("Rate limit exceeded for endpoint '{}'", endpoint),
                retry_after: decision.retry_after,
            })
        }
    }

    /// Drop buckets idle for longer than the window
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        // A bucket that has not refilled completely still remembers spent tokens
        self.buckets.retain(|_, bucket| bucket.idle_for(now) <= self.idle_window || !bucket.is_full_at(now));

        let purged = before.saturating_sub(self.buckets.len());
        if purged > 0 {
            debug!("Cleaned up {} idle rate limit buckets", purged);
        }
        gauge!("dotguard_rate_limit_buckets", self.buckets.len() as f64);
        purged
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(limiter: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                limiter.purge_idle();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rule: RateLimitRule) -> RateLimiter {
        let table = RateLimitTable::default().with_rule(DEFAULT_ENDPOINT, RateTier::Free, rule);
        RateLimiter::new(table, Duration::from_secs(60))
    }

    #[test]
    fn test_burst_then_deny() {
        let limiter = limiter(RateLimitRule::new(5, 10));
        let now = Instant::now();

        for i in 0..10 {
            let decision = limiter.check_at("user-1", "projects:read", RateTier::Free, now);
            assert!(decision.allowed, "request {} should be admitted", i + 1);
            assert_eq!(decision.remaining, 9 - i);
        }

        let denied = limiter.check_at("user-1", "projects:read", RateTier::Free, now);
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 10);
        let retry = denied.retry_after.unwrap();
        assert!(retry > Duration::from_millis(11_900) && retry < Duration::from_millis(12_100), "retry_after {:?}", retry);
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let limiter = limiter(RateLimitRule::new(60, 1));
        let now = Instant::now();

        assert!(limiter.check_at("u", "e", RateTier::Free, now).allowed);
        assert!(!limiter.check_at("u", "e", RateTier::Free, now + Duration::from_millis(500)).allowed);
        assert!(limiter.check_at("u", "e", RateTier::Free, now + Duration::from_millis(1000)).allowed);
    }

    #[test]
    fn test_buckets_are_independent() {
        let limiter = limiter(RateLimitRule::new(60, 1));
        let now = Instant::now();

        assert!(limiter.check_at("u-1", "e", RateTier::Free, now).allowed);
        assert!(limiter.check_at("u-2", "e", RateTier::Free, now).allowed);
        assert!(limiter.check_at("u-1", "other", RateTier::Free, now).allowed);
        assert!(!limiter.check_at("u-1", "e", RateTier::Free, now).allowed);
        assert_eq!(limiter.bucket_count(), 3);
    }

    #[test]
    fn test_window_bounds_admissions() {
        let limiter = limiter(RateLimitRule::new(5, 10));
        let start = Instant::now();

        let admitted = (0..600).filter(|i| limiter.check_at("u", "e", RateTier::Free, start + Duration::from_millis(i * 100)).allowed).count();

        assert!(admitted <= 15, "admitted {}", admitted);
    }

    #[test]
    fn test_zero_allowance_denies_without_retry() {
        let limiter = RateLimiter::new(RateLimitTable::builtin(), Duration::from_secs(60));

        let decision = limiter.check("203.0.113.9", "projects:write", RateTier::Unauthenticated);

        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, None);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_unknown_endpoint_without_default_fails_closed() {
        let table = RateLimitTable::default().with_rule("projects:read", RateTier::Free, RateLimitRule::new(60, 10));
        let limiter = RateLimiter::new(table, Duration::from_secs(60));

        assert!(limiter.check("u", "projects:read", RateTier::Free).allowed);
        assert!(!limiter.check("u", "reports:read", RateTier::Free).allowed);
    }

    #[test]
    fn test_require_reports_retry_after() {
        let limiter = limiter(RateLimitRule::new(60, 1));

        assert!(limiter.require("u", "e", RateTier::Free).is_ok());
        let err = limiter.require("u", "e", RateTier::Free).unwrap_err();

        assert!(matches!(err, GuardError::RateLimited { .. }));
        assert!(err.retry_after().is_some_and(|d| d > Duration::ZERO));
    }

    #[test]
    fn test_idle_full_buckets_are_purged() {
        let limiter = limiter(RateLimitRule::new(60, 1));
        let now = Instant::now();

        assert!(limiter.check_at("u", "e", RateTier::Free, now).allowed);
        assert!(!limiter.check_at("u", "e", RateTier::Free, now + Duration::from_millis(500)).allowed);

        // Denied checks count as activity
        assert_eq!(limiter.purge_idle_at(now + Duration::from_secs(60)), 0);
        assert_eq!(limiter.purge_idle_at(now + Duration::from_secs(61)), 1);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_idle_bucket_keeps_spent_tokens_until_refilled() {
        let table = RateLimitTable::default().with_rule(DEFAULT_ENDPOINT, RateTier::Free, RateLimitRule::new(5, 10));
        let limiter = RateLimiter::new(table, Duration::from_secs(10));
        let start = Instant::now();

        let mut admitted = 0;
        for burst in 0..5u64 {
            let at = start + Duration::from_secs(burst * 11);
            limiter.purge_idle_at(at);
            admitted += (0..10).filter(|_| limiter.check_at("u", "e", RateTier::Free, at).allowed).count();
        }

        // 44 seconds: the initial burst plus under four refilled tokens
        assert_eq!(admitted, 13);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_one_shot_bucket_is_never_reset() {
        let limiter = limiter(RateLimitRule::new(0, 1));
        let now = Instant::now();

        assert!(limiter.check_at("u", "e", RateTier::Free, now).allowed);
        assert_eq!(limiter.purge_idle_at(now + Duration::from_secs(3600)), 0);

        let denied = limiter.check_at("u", "e", RateTier::Free, now + Duration::from_secs(3600));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, None);
        assert_eq!(denied.reset_after, Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_runs() {
        let table = RateLimitTable::default().with_rule(DEFAULT_ENDPOINT, RateTier::Free, RateLimitRule::new(60_000, 1));
        let limiter = Arc::new(RateLimiter::new(table, Duration::ZERO));
        limiter.check("u", "e", RateTier::Free);
        std::thread::sleep(Duration::from_millis(5));

        let handle = RateLimiter::start_cleanup_task(limiter.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(limiter.bucket_count(), 0);
        handle.abort();
    }
}
