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

//! Per-endpoint caching policy

use super::PathTemplate;
use crate::error::{GuardError, GuardResult};
use crate::models::{Action, ServiceTier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

fn default_enabled() -> bool {
    true
}

/// Caching rule for every path matching `template`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub template: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_override_secs: Option<u64>,
    /// Mutations that make cached reads of this endpoint stale
    #[serde(default)]
    pub invalidated_by: Vec<String>,
}

impl CachePolicy {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            enabled: true,
            ttl_override_secs: None,
            invalidated_by: Vec::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override_secs = Some(ttl.as_secs());
        self
    }

    pub fn invalidated_by<I, S>(mut self, mutations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidated_by.extend(mutations.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledPolicy {
    policy: CachePolicy,
    template: PathTemplate,
}

/// Ordered policy rows; the first matching template wins
#[derive(Debug, Clone)]
pub struct CachePolicyTable {
    rows: Vec<CompiledPolicy>,
}

impl CachePolicyTable {
    pub fn new(policies: Vec<CachePolicy>) -> GuardResult<Self> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(policies.len());

        for policy in policies {
            let template = PathTemplate::parse(&policy.template)?;
            if !seen.insert(template.as_str().to_string()) {
                return Err(GuardError::invalid_config(format!("duplicate cache policy for '{}'", template)));
            }
            rows.push(CompiledPolicy { policy, template });
        }

        Ok(Self { rows })
    }

    /// Built-in endpoint table
    pub fn builtin() -> Self {
        let rows = builtin_policies()
            .into_iter()
            .filter_map(|policy| PathTemplate::parse(&policy.template).ok().map(|template| CompiledPolicy { policy, template }))
            .collect();

        Self { rows }
    }

    pub fn policies(&self) -> impl Iterator<Item = &CachePolicy> {
        self.rows.iter().map(|row| &row.policy)
    }

    pub fn lookup(&self, path: &str) -> Option<&CachePolicy> {
        self.rows.iter().find(|row| row.template.matches(path)).map(|row| &row.policy)
    }

    /// Default lifetime of a cached read for a service tier
    pub fn default_ttl(tier: ServiceTier) -> Duration {
        match tier {
            ServiceTier::Free => Duration::from_secs(60),
            ServiceTier::Starter => Duration::from_secs(5 * 60),
            ServiceTier::Professional => Duration::from_secs(15 * 60),
            ServiceTier::Enterprise => Duration::from_secs(30 * 60),
        }
    }

    /// How long a response may be cached, or `None` when it must not be
    ///
    /// Mutations, disabled endpoints and paths without a policy are never
    /// cached.
    pub fn ttl_for(&self, path: &str, action: Action, tier: ServiceTier) -> Option<Duration> {
        if action.is_mutation() {
            return None;
        }

        let policy = self.lookup(path)?;
        if !policy.enabled {
            return None;
        }

        Some(policy.ttl_override_secs.map(Duration::from_secs).unwrap_or_else(|| Self::default_ttl(tier)))
    }

    /// Templates purged by a mutation, with `:id` bound to the entity id
    pub fn invalidation_patterns(&self, mutation: &str, entity_id: Option<&str>) -> Vec<PathTemplate> {
        match entity_id {
            Some(id) => self.invalidation_patterns_with(mutation, &[("id", id)]),
            None => self.invalidation_patterns_with(mutation, &[]),
        }
    }

    /// Templates purged by a mutation, binding any named placeholders
    pub fn invalidation_patterns_with(&self, mutation: &str, bindings: &[(&str, &str)]) -> Vec<PathTemplate> {
        self.rows
            .iter()
            .filter(|row| row.policy.invalidated_by.iter().any(|m| m == mutation))
            .map(|row| match row.template.bind(bindings) {
                Ok(bound) => bound,
                Err(e) => {
                    // Over-invalidating beats serving stale reads
                    warn!(template = row.template.as_str(), mutation = mutation, "Purging unbound template: {}", e);
                    row.template.clone()
                }
            })
            .collect()
    }
}

impl Default for CachePolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_policies() -> Vec<CachePolicy> {
    vec![
        CachePolicy::new("/projects").invalidated_by(["project.create", "project.update", "project.delete", "project.transition"]),
        CachePolicy::new("/projects/:id").invalidated_by(["project.update", "project.delete", "project.transition"]),
        CachePolicy::new("/projects/:project_id/assets").invalidated_by(["asset.create", "asset.delete", "project.delete"]),
        CachePolicy::new("/projects/:project_id/payouts").invalidated_by(["payout.create", "payout.update", "payout.transition"]),
        CachePolicy::new("/payouts").invalidated_by(["payout.create", "payout.update", "payout.transition"]),
        CachePolicy::new("/payouts/:id").invalidated_by(["payout.update", "payout.transition"]),
        CachePolicy::new("/assets/:id").with_ttl(Duration::from_secs(60 * 60)).invalidated_by(["asset.delete"]),
        CachePolicy::new("/organization").with_ttl(Duration::from_secs(60 * 60)).invalidated_by(["organization.update"]),
        CachePolicy::new("/users/:id").invalidated_by(["user.update"]),
        CachePolicy::new("/audit-log").disabled(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = CachePolicyTable::new(builtin_policies()).unwrap();
        assert_eq!(table.policies().count(), CachePolicyTable::builtin().policies().count());
    }

    #[test]
    fn test_ttl_follows_tier() {
        let table = CachePolicyTable::builtin();

        assert_eq!(table.ttl_for("/projects", Action::Read, ServiceTier::Free), Some(Duration::from_secs(60)));
        assert_eq!(table.ttl_for("/projects", Action::Read, ServiceTier::Starter), Some(Duration::from_secs(300)));
        assert_eq!(table.ttl_for("/projects/7", Action::Read, ServiceTier::Professional), Some(Duration::from_secs(900)));
        assert_eq!(table.ttl_for("/projects/7", Action::Read, ServiceTier::Enterprise), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_override_wins_over_tier() {
        let table = CachePolicyTable::builtin();
        assert_eq!(table.ttl_for("/assets/a-1", Action::Read, ServiceTier::Free), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_mutations_and_disabled_endpoints_are_not_cached() {
        let table = CachePolicyTable::builtin();

        assert_eq!(table.ttl_for("/projects", Action::Create, ServiceTier::Enterprise), None);
        assert_eq!(table.ttl_for("/projects/7", Action::Delete, ServiceTier::Enterprise), None);
        assert_eq!(table.ttl_for("/audit-log", Action::Read, ServiceTier::Enterprise), None);
        assert_eq!(table.ttl_for("/unknown", Action::Read, ServiceTier::Enterprise), None);
    }

    #[test]
    fn test_invalidation_binds_entity_id() {
        let table = CachePolicyTable::builtin();
        let patterns: Vec<String> = table.invalidation_patterns("project.transition", Some("42")).iter().map(|p| p.to_string()).collect();

        assert_eq!(patterns, vec!["/projects".to_string(), "/projects/42".to_string()]);
    }

    #[test]
    fn test_invalidation_with_named_bindings() {
        let table = CachePolicyTable::builtin();
        let patterns = table.invalidation_patterns_with("payout.transition", &[("id", "po-1"), ("project_id", "p-9")]);
        let sources: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();

        assert_eq!(sources, vec!["/projects/p-9/payouts", "/payouts", "/payouts/po-1"]);
    }

    #[test]
    fn test_unbindable_id_falls_back_to_whole_template() {
        let table = CachePolicyTable::builtin();
        let patterns = table.invalidation_patterns("project.update", Some("a/b"));
        let sources: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();

        assert_eq!(sources, vec!["/projects", "/projects/:id"]);
        assert!(patterns[1].matches("/projects/p-1"));
    }

    #[test]
    fn test_duplicate_templates_are_rejected() {
        let result = CachePolicyTable::new(vec![CachePolicy::new("/projects/:id"), CachePolicy::new("/projects/:id/")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: CachePolicy = toml::from_str(r#"template = "/reports""#).unwrap();

        assert!(policy.enabled);
        assert!(policy.invalidated_by.is_empty());
        assert_eq!(policy.ttl_override_secs, None);
    }
}
