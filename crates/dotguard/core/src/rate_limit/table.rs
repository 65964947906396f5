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

//! Rate limit rules per endpoint and tier

use crate::error::{GuardError, GuardResult};
use crate::models::ServiceTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Endpoint name matching every endpoint without a row of its own
pub const DEFAULT_ENDPOINT: &str = "*";

/// Admission tier; unauthenticated traffic is a tier of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTier {
    Unauthenticated,
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl RateTier {
    pub const ALL: [RateTier; 5] = [RateTier::Unauthenticated, RateTier::Free, RateTier::Starter, RateTier::Professional, RateTier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateTier::Unauthenticated => "unauthenticated",
            RateTier::Free => "free",
            RateTier::Starter => "starter",
            RateTier::Professional => "professional",
            RateTier::Enterprise => "enterprise",
        }
    }
}

impl From<ServiceTier> for RateTier {
    fn from(tier: ServiceTier) -> Self {
        match tier {
            ServiceTier::Free => RateTier::Free,
            ServiceTier::Starter => RateTier::Starter,
            ServiceTier::Professional => RateTier::Professional,
            ServiceTier::Enterprise => RateTier::Enterprise,
        }
    }
}

impl fmt::Display for RateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateTier {
    type Err = GuardError;

    fn from_str(s: &str) -> GuardResult<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| GuardError::invalid_record(format!("unknown rate tier '{}'", s)))
    }
}

/// Bucket shape: refill speed and capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl RateLimitRule {
    pub const fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self { requests_per_minute, burst_size }
    }

    /// A rule that never admits anything
    pub const fn deny() -> Self {
        Self::new(0, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.burst_size == 0
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }
}

/// One row of the table in its configuration form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub endpoint: String,
    pub tier: RateTier,
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl RateLimitEntry {
    pub fn rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.requests_per_minute, self.burst_size)
    }
}

/// Rules keyed by endpoint and tier, with `*` rows as per-tier defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitTable {
    rules: BTreeMap<(String, RateTier), RateLimitRule>,
}

impl RateLimitTable {
    /// Build a table, rejecting two rows for the same endpoint and tier
    pub fn new(entries: Vec<RateLimitEntry>) -> GuardResult<Self> {
        let mut table = Self::default();

        for entry in entries {
            let key = (entry.endpoint.clone(), entry.tier);
            if table.rules.insert(key, entry.rule()).is_some() {
                return Err(GuardError::invalid_config(format!("duplicate rate limit for endpoint '{}' tier {}", entry.endpoint, entry.tier)));
            }
        }

        Ok(table)
    }

    /// Built-in limits; unauthenticated writes and admin calls get nothing
    pub fn builtin() -> Self {
        use RateTier::*;

        let rows: [(&str, [(RateTier, RateLimitRule); 5]); 5] = [
            (
                DEFAULT_ENDPOINT,
                [
                    (Unauthenticated, RateLimitRule::new(30, 10)),
                    (Free, RateLimitRule::new(60, 20)),
                    (Starter, RateLimitRule::new(300, 50)),
                    (Professional, RateLimitRule::new(1200, 200)),
                    (Enterprise, RateLimitRule::new(6000, 1000)),
                ],
            ),
            (
                "projects:write",
                [
                    (Unauthenticated, RateLimitRule::deny()),
                    (Free, RateLimitRule::new(10, 5)),
                    (Starter, RateLimitRule::new(60, 20)),
                    (Professional, RateLimitRule::new(300, 50)),
                    (Enterprise, RateLimitRule::new(1200, 200)),
                ],
            ),
            (
                "payouts:write",
                [
                    (Unauthenticated, RateLimitRule::deny()),
                    (Free, RateLimitRule::new(5, 2)),
                    (Starter, RateLimitRule::new(30, 10)),
                    (Professional, RateLimitRule::new(120, 30)),
                    (Enterprise, RateLimitRule::new(600, 100)),
                ],
            ),
            (
                "assets:upload",
                [
                    (Unauthenticated, RateLimitRule::deny()),
                    (Free, RateLimitRule::new(5, 5)),
                    (Starter, RateLimitRule::new(30, 10)),
                    (Professional, RateLimitRule::new(120, 40)),
                    (Enterprise, RateLimitRule::new(600, 150)),
                ],
            ),
            (
                "admin",
                [
                    (Unauthenticated, RateLimitRule::deny()),
                    (Free, RateLimitRule::new(30, 10)),
                    (Starter, RateLimitRule::new(60, 20)),
                    (Professional, RateLimitRule::new(120, 40)),
                    (Enterprise, RateLimitRule::new(300, 100)),
                ],
            ),
        ];

        let mut table = Self::default();
        for (endpoint, tiers) in rows {
            for (tier, rule) in tiers {
                table.rules.insert((endpoint.to_string(), tier), rule);
            }
        }
        table
    }

    /// Set or replace a single row
    pub fn with_rule(mut self, endpoint: impl Into<String>, tier: RateTier, rule: RateLimitRule) -> Self {
        self.rules.insert((endpoint.into(), tier), rule);
        self
    }

    /// Replace rows present in `overrides`, keeping everything else
    pub fn merged(mut self, overrides: &RateLimitTable) -> Self {
        for (key, rule) in &overrides.rules {
            self.rules.insert(key.clone(), *rule);
        }
        self
    }

    /// Rule for an endpoint, falling back to the tier's `*` row
    pub fn rule(&self, endpoint: &str, tier: RateTier) -> Option<RateLimitRule> {
        self.rules
            .get(&(endpoint.to_string(), tier))
            .or_else(|| self.rules.get(&(DEFAULT_ENDPOINT.to_string(), tier)))
            .copied()
    }

    pub fn entries(&self) -> Vec<RateLimitEntry> {
        self.rules
            .iter()
            .map(|((endpoint, tier), rule)| RateLimitEntry {
                endpoint: endpoint.clone(),
                tier: *tier,
                requests_per_minute: rule.requests_per_minute,
                burst_size: rule.burst_size,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_row_wins_over_default() {
        let table = RateLimitTable::builtin();

        assert_eq!(table.rule("projects:write", RateTier::Free), Some(RateLimitRule::new(10, 5)));
        assert_eq!(table.rule("projects:read", RateTier::Free), Some(RateLimitRule::new(60, 20)));
    }

    #[test]
    fn test_unauthenticated_writes_have_zero_allowance() {
        let table = RateLimitTable::builtin();

        for endpoint in ["projects:write", "payouts:write", "assets:upload", "admin"] {
            let rule = table.rule(endpoint, RateTier::Unauthenticated).unwrap();
            assert!(rule.is_zero(), "{} should deny anonymous traffic", endpoint);
        }
        assert!(!table.rule("projects:read", RateTier::Unauthenticated).unwrap().is_zero());
    }

    #[test]
    fn test_missing_default_yields_no_rule() {
        let table = RateLimitTable::default().with_rule("projects:read", RateTier::Free, RateLimitRule::new(5, 10));

        assert!(table.rule("projects:read", RateTier::Free).is_some());
        assert!(table.rule("projects:read", RateTier::Starter).is_none());
        assert!(table.rule("other", RateTier::Free).is_none());
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let entry = RateLimitEntry {
            endpoint: "admin".to_string(),
            tier: RateTier::Free,
            requests_per_minute: 1,
            burst_size: 1,
        };

        assert!(RateLimitTable::new(vec![entry.clone(), entry]).is_err());
    }

    #[test]
    fn test_merge_replaces_only_given_rows() {
        let overrides = RateLimitTable::default().with_rule("admin", RateTier::Free, RateLimitRule::new(1, 1));
        let table = RateLimitTable::builtin().merged(&overrides);

        assert_eq!(table.rule("admin", RateTier::Free), Some(RateLimitRule::new(1, 1)));
        assert_eq!(table.rule("admin", RateTier::Starter), Some(RateLimitRule::new(60, 20)));
        assert_eq!(table.len(), RateLimitTable::builtin().len());
    }

    #[test]
    fn test_tier_conversions() {
        assert_eq!(RateTier::from(ServiceTier::Professional), RateTier::Professional);
        assert_eq!("unauthenticated".parse::<RateTier>().unwrap(), RateTier::Unauthenticated);
        assert!("gold".parse::<RateTier>().is_err());
    }
}
