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

//! Configuration management for the guard core
//!
//! Sources, first match wins per field: `DOTGUARD_*` environment variables,
//! the TOML file named by `--config` or `DOTGUARD_CONFIG`, built-in defaults.

use crate::audit::DEFAULT_MAX_EVENTS;
use crate::cache::{CachePolicy, CachePolicyTable};
use crate::error::{GuardError, GuardResult};
use crate::rate_limit::{RateLimitEntry, RateLimitTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "DOTGUARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses
    pub max_entries: usize,

    /// Interval of the expired-entry sweep
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval_secs: 300, // 5 minutes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Buckets idle this long are dropped and start over full
    pub idle_window_secs: u64,

    /// Interval of the idle-bucket sweep
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            idle_window_secs: 120,
            cleanup_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Number of events kept in memory
    pub max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_events: DEFAULT_MAX_EVENTS }
    }
}

/// Configuration for the guard core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub cache: CacheConfig,

    pub rate_limit: RateLimitConfig,

    pub audit: AuditConfig,

    /// Replaces the built-in cache policy table when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policies: Option<Vec<CachePolicy>>,

    /// Rows replacing the matching built-in rate limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<Vec<RateLimitEntry>>,
}

impl GuardConfig {
    pub fn from_toml_str(content: &str) -> GuardResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> GuardResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading guard configuration");
        Self::from_toml_str(&content)
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> GuardResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `DOTGUARD_*` variables returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> GuardResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "DOTGUARD_CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = v;
        }
        if let Some(v) = parse_var(&lookup, "DOTGUARD_CACHE_CLEANUP_INTERVAL_SECS")? {
            self.cache.cleanup_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOTGUARD_RATE_LIMIT_IDLE_WINDOW_SECS")? {
            self.rate_limit.idle_window_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOTGUARD_RATE_LIMIT_CLEANUP_INTERVAL_SECS")? {
            self.rate_limit.cleanup_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "DOTGUARD_AUDIT_MAX_EVENTS")? {
            self.audit.max_events = v;
        }
        Ok(())
    }

    /// Resolve the effective configuration for a process
    pub fn resolve(cli_config: Option<PathBuf>) -> GuardResult<Self> {
        Self::resolve_with(cli_config, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(cli_config: Option<PathBuf>, lookup: F) -> GuardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if let Some(config_path) = cli_config {
            Self::load_from_file(config_path)?
        } else if let Some(env_config) = lookup(CONFIG_ENV) {
            Self::load_from_file(env_config)?
        } else {
            Self::default()
        };

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GuardResult<()> {
        if self.cache.max_entries == 0 {
            return Err(GuardError::invalid_config("cache.max_entries must be greater than zero"));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(GuardError::invalid_config("cache.cleanup_interval_secs must be greater than zero"));
        }
        if self.rate_limit.idle_window_secs == 0 {
            return Err(GuardError::invalid_config("rate_limit.idle_window_secs must be greater than zero"));
        }
        if self.rate_limit.cleanup_interval_secs == 0 {
            return Err(GuardError::invalid_config("rate_limit.cleanup_interval_secs must be greater than zero"));
        }
        if self.audit.max_events == 0 {
            return Err(GuardError::invalid_config("audit.max_events must be greater than zero"));
        }

        self.cache_policy_table()?;
        self.rate_limit_table()?;
        Ok(())
    }

    pub fn cache_policy_table(&self) -> GuardResult<CachePolicyTable> {
        match &self.cache_policies {
            Some(policies) => CachePolicyTable::new(policies.clone()),
            None => Ok(CachePolicyTable::builtin()),
        }
    }

    pub fn rate_limit_table(&self) -> GuardResult<RateLimitTable> {
        let table = RateLimitTable::builtin();
        match &self.rate_limits {
            Some(entries) => Ok(table.merged(&RateLimitTable::new(entries.clone())?)),
            None => Ok(table),
        }
    }

    /// This configuration with both tables spelled out in full
    pub fn effective(&self) -> GuardResult<Self> {
        let mut config = self.clone();
        config.cache_policies = Some(self.cache_policy_table()?.policies().cloned().collect());
        config.rate_limits = Some(self.rate_limit_table()?.entries());
        Ok(config)
    }

    pub fn cache_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_secs)
    }

    pub fn rate_limit_idle_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.idle_window_secs)
    }

    pub fn rate_limit_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.cleanup_interval_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> GuardResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| GuardError::invalid_config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}
