// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory cache with LRU eviction and TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use super::Cache;
use crate::config::CacheConfig;
use crate::context::Context;
use crate::error::CacheError;

/// Default cache TTL (5 minutes).
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default max cache size.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Cache entry with expiry and recency.
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    last_accessed: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    tick: u64,
}

impl Entries {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before - self.map.len()
    }
}

/// Thread-safe byte cache.
///
/// Entries expire after their TTL. When full, expired entries are dropped
/// first, then the least recently used one.
pub struct MemoryCache {
    entries: RwLock<Entries>,
    default_ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Create a new cache with default settings.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with custom TTL and max size (at least one entry).
    pub fn with_config(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            default_ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_config(config.ttl, config.max_entries)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check(ctx: &Context, key: &str) -> Result<(), CacheError> {
        ctx.check()?;
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        Ok(())
    }

    fn expiry(&self, ttl: Option<Duration>, now: Instant) -> Option<Instant> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        }
    }

    /// Make room for one more entry.
    fn evict(&self, entries: &mut Entries, now: Instant) {
        let expired = entries.remove_expired(now);
        self.evictions.fetch_add(expired as u64, Ordering::Relaxed);

        while entries.map.len() >= self.max_entries {
            let Some(oldest) = entries
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.map.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %oldest, "cache entry evicted");
        }
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let removed = self.write().remove_expired(Instant::now());
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        CacheStats {
            total_entries: entries.map.len(),
            expired_entries: entries.map.values().filter(|e| e.is_expired(now)).count(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

impl Cache for MemoryCache {
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Self::check(ctx, key)?;
        let now = Instant::now();
        let mut entries = self.write();
        let tick = entries.next_tick();

        let expired = entries.map.get(key).map(|entry| entry.is_expired(now));
        let value = match expired {
            Some(true) => {
                entries.map.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(false) => entries.map.get_mut(key).map(|entry| {
                entry.last_accessed = tick;
                entry.value.clone()
            }),
            None => None,
        };

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Self::check(ctx, key)?;
        let now = Instant::now();
        let expires_at = self.expiry(ttl, now);
        let mut entries = self.write();

        if !entries.map.contains_key(key) && entries.map.len() >= self.max_entries {
            self.evict(&mut entries, now);
        }

        let tick = entries.next_tick();
        entries.map.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at,
                last_accessed: tick,
            },
        );
        Ok(())
    }

    fn delete(&self, ctx: &Context, key: &str) -> Result<bool, CacheError> {
        Self::check(ctx, key)?;
        Ok(self.write().map.remove(key).is_some())
    }

    fn exists(&self, ctx: &Context, key: &str) -> Result<bool, CacheError> {
        Self::check(ctx, key)?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .map
            .get(key)
            .map(|entry| !entry.is_expired(Instant::now()))
            .unwrap_or(false))
    }

    fn clear(&self, ctx: &Context) -> Result<(), CacheError> {
        ctx.check()?;
        self.write().map.clear();
        Ok(())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total entries in cache.
    pub total_entries: usize,
    /// Number of expired entries not yet removed.
    pub expired_entries: usize,
    /// Maximum cache size.
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed for space or expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0 when there were none.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::background()
    }

    #[test]
    fn test_cache_set_get() {
        let cache = MemoryCache::new();
        cache.set(&ctx(), "a", b"1".to_vec(), None).unwrap();

        assert_eq!(cache.get(&ctx(), "a").unwrap(), Some(b"1".to_vec()));
        assert!(cache.exists(&ctx(), "a").unwrap());
        assert!(cache.get(&ctx(), "b").unwrap().is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set(&ctx(), "short", b"x".to_vec(), Some(Duration::from_millis(1)))
            .unwrap();
        cache.set(&ctx(), "forever", b"y".to_vec(), Some(Duration::ZERO)).unwrap();

        std::thread::sleep(Duration::from_millis(10));

        assert!(!cache.exists(&ctx(), "short").unwrap());
        assert!(cache.get(&ctx(), "short").unwrap().is_none(), "Entry should have expired");
        assert!(cache.get(&ctx(), "forever").unwrap().is_some());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::with_config(Duration::from_secs(3600), 3);
        for key in ["k1", "k2", "k3"] {
            cache.set(&ctx(), key, key.as_bytes().to_vec(), None).unwrap();
        }

        // k1 becomes the most recently used, so k2 is the oldest.
        cache.get(&ctx(), "k1").unwrap();
        cache.set(&ctx(), "k4", b"k4".to_vec(), None).unwrap();

        assert!(cache.exists(&ctx(), "k1").unwrap());
        assert!(!cache.exists(&ctx(), "k2").unwrap());
        assert!(cache.exists(&ctx(), "k3").unwrap());
        assert!(cache.exists(&ctx(), "k4").unwrap());

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_expired_entries_evicted_before_live_ones() {
        let cache = MemoryCache::with_config(Duration::from_secs(3600), 2);
        cache.set(&ctx(), "live", b"1".to_vec(), None).unwrap();
        cache
            .set(&ctx(), "stale", b"2".to_vec(), Some(Duration::from_millis(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        cache.set(&ctx(), "new", b"3".to_vec(), None).unwrap();
        assert!(cache.exists(&ctx(), "live").unwrap());
        assert!(cache.exists(&ctx(), "new").unwrap());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::with_config(Duration::from_secs(3600), 1);
        cache.set(&ctx(), "a", b"1".to_vec(), None).unwrap();
        cache.set(&ctx(), "a", b"2".to_vec(), None).unwrap();
        assert_eq!(cache.get(&ctx(), "a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = MemoryCache::new();
        cache.set(&ctx(), "a", b"1".to_vec(), None).unwrap();
        cache.set(&ctx(), "b", b"2".to_vec(), None).unwrap();

        assert!(cache.delete(&ctx(), "a").unwrap());
        assert!(!cache.delete(&ctx(), "a").unwrap());

        cache.clear(&ctx()).unwrap();
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_empty_key_and_cancelled_context() {
        let cache = MemoryCache::new();
        assert!(matches!(
            cache.get(&ctx(), ""),
            Err(CacheError::EmptyKey)
        ));

        let (cancelled, handle) = ctx().with_cancel();
        handle.cancel();
        assert!(matches!(
            cache.set(&cancelled, "a", Vec::new(), None),
            Err(CacheError::Cancelled(_))
        ));
    }

    #[test]
    fn test_prune() {
        let cache = MemoryCache::with_config(Duration::from_millis(1), 10);
        cache.set(&ctx(), "a", b"1".to_vec(), None).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.stats().total_entries, 0);
    }
}
