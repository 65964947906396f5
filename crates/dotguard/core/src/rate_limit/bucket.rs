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

use super::RateLimitRule;
use std::time::{Duration, Instant};

/// Token bucket for rate limiting
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    pub(crate) fn new(rule: RateLimitRule, now: Instant) -> Self {
        Self {
            tokens: rule.burst_size as f64,
            max_tokens: rule.burst_size as f64,
            refill_rate: rule.refill_rate(),
            last_refill: now,
            last_seen: now,
        }
    }

    pub(crate) fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    pub(crate) fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    /// Time until one token is available, `None` if it never will be
    pub(crate) fn retry_after(&self) -> Option<Duration> {
        let needed = 1.0 - self.tokens;
        if needed <= 0.0 {
            Some(Duration::ZERO)
        } else if self.refill_rate <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }

    /// Time until the bucket is full again, `None` if it never refills
    pub(crate) fn reset_after(&self) -> Option<Duration> {
        let missing = self.max_tokens - self.tokens;
        if missing <= 0.0 {
            Some(Duration::ZERO)
        } else if self.refill_rate <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    /// Whether continuous refill has topped the bucket up by `now`
    pub(crate) fn is_full_at(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed * self.refill_rate >= self.max_tokens
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(RateLimitRule::new(60, 2), now); // 2 tokens, 1 per second

        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));
        assert_eq!(bucket.retry_after(), Some(Duration::from_secs(1)));

        // Refills continuously
        assert!(bucket.try_consume(now + Duration::from_millis(1000)));
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(RateLimitRule::new(600, 3), now);

        bucket.refill(now + Duration::from_secs(3600));

        assert_eq!(bucket.remaining(), 3);
        assert_eq!(bucket.reset_after(), Some(Duration::ZERO));
    }

    #[test]
    fn test_full_only_after_complete_refill() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(RateLimitRule::new(5, 10), now);
        assert!(bucket.is_full_at(now));

        assert!(bucket.try_consume(now));
        assert!(!bucket.is_full_at(now + Duration::from_secs(11)));
        assert!(bucket.is_full_at(now + Duration::from_secs(13)));
    }

    #[test]
    fn test_bucket_without_refill_never_recovers() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(RateLimitRule::new(0, 1), now);

        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now + Duration::from_secs(600)));
        assert_eq!(bucket.retry_after(), None);
        assert_eq!(bucket.reset_after(), None);
    }
}
