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

//! Response cache with TTL expiry and LRU eviction

use super::{CacheKey, PathTemplate};
use crate::models::OrganizationId;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cache entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
    last_accessed: Instant,
    /// Monotonic access order; breaks ties between equal `last_accessed`
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,

    /// Total cache misses, expired reads included
    pub misses: u64,

    /// Entries dropped to stay within capacity
    pub evictions: u64,

    /// Entries dropped because their TTL ran out
    pub expirations: u64,

    /// Entries dropped by pattern invalidation
    pub invalidations: u64,

    /// Current cache size
    pub current_size: usize,

    /// Maximum cache size reached
    pub max_size_reached: usize,
}

impl CacheStats {
    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 { 0.0 } else { self.hits as f64 / (self.hits + self.misses) as f64 }
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    sequence: u64,
    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn next_seq(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn update_size(&mut self) {
        self.stats.current_size = self.entries.len();
        if self.stats.current_size > self.stats.max_size_reached {
            self.stats.max_size_reached = self.stats.current_size;
        }
        gauge!("dotguard_cache_entries", self.stats.current_size as f64);
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let victim = self.entries.iter().min_by_key(|(_, entry)| (entry.last_accessed, entry.access_seq)).map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        self.stats.evictions += 1;
        counter!("dotguard_cache_evictions", 1);
        Some(victim)
    }
}

/// Bounded in-memory cache shared across request handlers
///
/// The map and the LRU bookkeeping sit behind one mutex so every operation
/// sees a consistent view. Values are cloned out; nothing is computed while
/// the lock is held.
#[derive(Debug)]
pub struct CacheManager<V> {
    state: Mutex<CacheState<V>>,
    max_entries: usize,
}

impl<V: Clone> CacheManager<V> {
    /// Create a cache holding at most `max_entries` entries
    ///
    /// A capacity of zero stores nothing.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                sequence: 0,
                stats: CacheStats::default(),
            }),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Live value for `key`; expired entries count as misses and are dropped
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let seq = state.next_seq();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hits += 1;
                entry.last_accessed = now;
                entry.access_seq = seq;
                let value = entry.value.clone();

                state.stats.hits += 1;
                counter!("dotguard_cache_hits", 1);
                debug!(key = %key, "Cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.expirations += 1;
            counter!("dotguard_cache_expirations", 1);
            state.update_size();
        }

        state.stats.misses += 1;
        counter!("dotguard_cache_misses", 1);
        debug!(key = %key, expired = expired, "Cache miss");
        None
    }

    /// Store `value`, replacing any entry under the same key
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        if self.max_entries == 0 {
            return;
        }

        let now = Instant::now();
        let mut state = self.state.lock();

        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.max_entries {
                match state.evict_lru() {
                    Some(victim) => debug!(key = %victim, "Evicted least recently used entry"),
                    None => break,
                }
            }
        }

        let seq = state.next_seq();
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache set");
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
                hits: 0,
                last_accessed: now,
                access_seq: seq,
            },
        );
        state.update_size();
    }

    /// Serve a live entry or compute, store and return a fresh value
    ///
    /// `compute` runs without the lock held. Errors are returned as-is and
    /// leave the cache untouched.
    pub fn get_or_insert_with<F, E>(&self, key: CacheKey, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = compute()?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).map(|entry| entry.value);
        if removed.is_some() {
            state.update_size();
        }
        removed
    }

    /// Drop every entry whose path matches `pattern`, across all tenants
    ///
    /// An unparsable pattern removes nothing.
    pub fn invalidate(&self, pattern: &str) -> usize {
        match PathTemplate::parse(pattern) {
            Ok(template) => self.invalidate_matching(&template, None),
            Err(e) => {
                warn!(pattern = pattern, error = %e, "Ignoring invalid invalidation pattern");
                0
            }
        }
    }

    /// Drop entries matching `template`, limited to one tenant when `scope` is set
    pub fn invalidate_matching(&self, template: &PathTemplate, scope: Option<&OrganizationId>) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();

        state.entries.retain(|key, _| {
            let in_scope = scope.is_none_or(|org| key.scope() == Some(org));
            !(in_scope && template.matches(key.path()))
        });

        let removed = before - state.entries.len();
        if removed > 0 {
            state.stats.invalidations += removed as u64;
            counter!("dotguard_cache_invalidations", removed as u64);
            state.update_size();
        }

        debug!(pattern = %template, scope = ?scope, removed = removed, "Cache invalidated");
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.update_size();
        debug!("Cleared all cache entries");
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clean up expired entries
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();

        state.entries.retain(|_, entry| !entry.is_expired(now));

        let purged = before - state.entries.len();
        if purged > 0 {
            state.stats.expirations += purged as u64;
            counter!("dotguard_cache_expirations", purged as u64);
            state.update_size();
            debug!("Cleaned up {} expired cache entries", purged);
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }
}

impl<V: Clone + Send + 'static> CacheManager<V> {
    /// Start background cleanup task
    pub fn start_cleanup_task(cache: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                cache.purge_expired();

                let stats = cache.stats();
                debug!(
                    "Cache stats - Hits: {}, Misses: {}, Hit ratio: {:.2}%, Size: {}, Evictions: {}",
                    stats.hits,
                    stats.misses,
                    stats.hit_ratio() * 100.0,
                    stats.current_size,
                    stats.evictions
                );

                // Warn if hit ratio is low
                if stats.hits + stats.misses > 100 && stats.hit_ratio() < 0.5 {
                    warn!("Low cache hit ratio: {:.2}%", stats.hit_ratio() * 100.0);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn key(path: &str) -> CacheKey {
        CacheKey::parse(path)
    }

    #[test]
    fn test_lru_evicts_least_recently_accessed() {
        let cache = CacheManager::new(2);
        let ttl = Duration::from_secs(60);

        cache.set(key("/a"), "A", ttl);
        cache.set(key("/b"), "B", ttl);
        assert_eq!(cache.get(&key("/a")), Some("A"));
        cache.set(key("/c"), "C", ttl);

        assert_eq!(cache.get(&key("/b")), None);
        assert_eq!(cache.get(&key("/a")), Some("A"));
        assert_eq!(cache.get(&key("/c")), Some("C"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_a_key_does_not_evict() {
        let cache = CacheManager::new(2);
        let ttl = Duration::from_secs(60);

        cache.set(key("/a"), 1, ttl);
        cache.set(key("/b"), 2, ttl);
        cache.set(key("/a"), 3, ttl);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("/a")), Some(3));
        assert_eq!(cache.get(&key("/b")), Some(2));
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = CacheManager::new(10);

        cache.set(key("/projects/1"), "p", Duration::from_millis(100));
        sleep(Duration::from_millis(150));

        assert_eq!(cache.get(&key("/projects/1")), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_invalidate_template() {
        let cache = CacheManager::new(10);
        let ttl = Duration::from_secs(60);

        cache.set(key("/projects/42"), 1, ttl);
        cache.set(key("/projects/42?include=assets"), 2, ttl);
        cache.set(key("/projects-list"), 3, ttl);

        assert_eq!(cache.invalidate("/projects/:id"), 2);
        assert_eq!(cache.get(&key("/projects-list")), Some(3));
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_scoped_invalidation_spares_other_tenants() {
        let cache = CacheManager::new(10);
        let ttl = Duration::from_secs(60);
        let org_a = OrganizationId::new("org-a");

        cache.set(key("/projects/1").scoped("org-a"), 1, ttl);
        cache.set(key("/projects/1").scoped("org-b"), 2, ttl);

        let template = PathTemplate::parse("/projects/:id").unwrap();
        assert_eq!(cache.invalidate_matching(&template, Some(&org_a)), 1);
        assert_eq!(cache.get(&key("/projects/1").scoped("org-b")), Some(2));
    }

    #[test]
    fn test_invalid_pattern_removes_nothing() {
        let cache = CacheManager::new(10);
        cache.set(key("/projects/1"), 1, Duration::from_secs(60));

        assert_eq!(cache.invalidate("/projects/:"), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = CacheManager::new(10);
        let mut calls = 0;

        let first: Result<u32, ()> = cache.get_or_insert_with(key("/x"), Duration::from_secs(60), || {
            calls += 1;
            Ok(7)
        });
        let second: Result<u32, ()> = cache.get_or_insert_with(key("/x"), Duration::from_secs(60), || {
            calls += 1;
            Ok(8)
        });

        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let cache: CacheManager<u32> = CacheManager::new(10);

        let result: Result<u32, &str> = cache.get_or_insert_with(key("/x"), Duration::from_secs(60), || Err("backend down"));

        assert_eq!(result, Err("backend down"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = CacheManager::new(0);
        cache.set(key("/a"), 1, Duration::from_secs(60));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired_and_stats() {
        let cache = CacheManager::new(10);

        cache.set(key("/short"), 1, Duration::from_millis(10));
        cache.set(key("/long"), 2, Duration::from_secs(60));
        sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get(&key("/long")), Some(2));

        let stats = cache.stats();
        assert_eq!(stats.current_size, 1);
        assert_eq!(stats.max_size_reached, 2);
        assert_eq!(stats.hit_ratio(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_expired_entries() {
        let cache = Arc::new(CacheManager::new(10));
        cache.set(key("/short"), 1, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));

        let handle = CacheManager::start_cleanup_task(cache.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.is_empty());
        handle.abort();
    }
}
