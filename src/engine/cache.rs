/// Decoded-image cache
///
/// Owns decoded image handles keyed by the canonicalized request URL
/// (path + dimensions + quality + format) under a hard byte budget.
/// Eviction uses a recency/frequency hybrid: entries idle the longest
/// and reused the least go first. The cache is advisory: an entry that
/// alone exceeds the budget is rejected, and callers must tolerate a
/// miss for anything they inserted earlier.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::net::images::DecodedImage;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub handle: Arc<DecodedImage>,
    pub size: u64,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    pub is_optimized: bool,
}

impl CacheEntry {
    /// Eviction score: seconds idle, discounted by reuse. Highest score
    /// is the least valuable entry.
    fn eviction_score(&self, now: DateTime<Utc>) -> f64 {
        let idle_secs = (now - self.last_accessed).num_milliseconds().max(0) as f64 / 1000.0;
        idle_secs / (self.access_count as f64 + 1.0)
    }
}

pub struct CacheManager {
    entries: HashMap<String, CacheEntry>,
    total_size: u64,
    max_size: u64,
    hits: u64,
    misses: u64,
}

impl CacheManager {
    pub fn new(max_size: u64) -> Self {
        Self {
            entries: HashMap::new(),
            total_size: 0,
            max_size,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a decoded image, bumping recency and frequency on a hit
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<Arc<DecodedImage>> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                entry.access_count += 1;
                self.hits += 1;
                Some(Arc::clone(&entry.handle))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Presence check without touching hit statistics (used by the
    /// preload scheduler to decide what still needs fetching)
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a decoded image, evicting lowest-value entries first so
    /// the byte budget holds when this returns. Returns false when the
    /// entry alone exceeds the budget and was rejected.
    pub fn put(
        &mut self,
        key: String,
        handle: Arc<DecodedImage>,
        is_optimized: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let size = handle.estimated_size();
        if size > self.max_size {
            warn!(
                "rejecting cache entry {key}: {size} bytes exceeds the {} byte budget",
                self.max_size
            );
            return false;
        }

        // Re-inserting a key replaces the old entry outright
        if let Some(old) = self.entries.remove(&key) {
            self.total_size -= old.size;
        }

        while self.total_size + size > self.max_size {
            if !self.evict_one(now) {
                break;
            }
        }

        self.total_size += size;
        self.entries.insert(
            key,
            CacheEntry {
                handle,
                size,
                last_accessed: now,
                access_count: 0,
                is_optimized,
            },
        );
        true
    }

    /// Drop the single highest-scoring (least valuable) entry
    fn evict_one(&mut self, now: DateTime<Utc>) -> bool {
        let victim = self
            .entries
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.eviction_score(now)
                    .partial_cmp(&b.eviction_score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(key, _)| key.clone());

        match victim {
            Some(key) => {
                if let Some(entry) = self.entries.remove(&key) {
                    self.total_size -= entry.size;
                    debug!("evicted {key} ({} bytes)", entry.size);
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use image::RgbaImage;

    use super::*;

    /// A decoded stand-in of exactly `pixels` RGBA pixels (4 bytes each)
    fn handle(pixels: u32) -> Arc<DecodedImage> {
        Arc::new(DecodedImage {
            width: pixels,
            height: 1,
            pixels: RgbaImage::new(pixels, 1),
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_byte_budget_holds_after_every_put() {
        // Budget of 10 entries' worth; insert 25
        let mut cache = CacheManager::new(10 * 40);
        let mut now = t0();
        for i in 0..25 {
            now += Duration::seconds(1);
            assert!(cache.put(format!("img-{i}"), handle(10), false, now));
            assert!(cache.total_size() <= 10 * 40);
        }
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_eviction_removes_exactly_enough() {
        let mut cache = CacheManager::new(120);
        let now = t0();
        // Three 40-byte entries with distinct idle times
        cache.put("old".into(), handle(10), false, now);
        cache.put("mid".into(), handle(10), false, now + Duration::seconds(10));
        cache.put("new".into(), handle(10), false, now + Duration::seconds(20));

        // One more 40-byte entry overflows by exactly one entry's size:
        // only the oldest goes
        assert!(cache.put(
            "extra".into(),
            handle(10),
            false,
            now + Duration::seconds(30)
        ));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("old"));
        assert!(cache.contains("mid"));
        assert!(cache.contains("new"));
        assert!(cache.contains("extra"));
    }

    #[test]
    fn test_frequently_used_entries_outlive_recency() {
        let mut cache = CacheManager::new(80);
        let now = t0();
        cache.put("reused".into(), handle(10), false, now);
        cache.put("idle".into(), handle(10), false, now + Duration::seconds(5));

        // Heavy reuse discounts the older entry's idle time
        for i in 0..10 {
            cache.get("reused", now + Duration::seconds(6 + i));
        }

        cache.put("next".into(), handle(10), false, now + Duration::seconds(60));
        assert!(cache.contains("reused"));
        assert!(!cache.contains("idle"));
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let mut cache = CacheManager::new(100);
        let now = t0();
        cache.put("small".into(), handle(10), false, now);

        assert!(!cache.put("huge".into(), handle(1000), false, now));
        // Existing entries are untouched by a rejected insert
        assert!(cache.contains("small"));
        assert_eq!(cache.total_size(), 40);
    }

    #[test]
    fn test_reinserting_a_key_replaces_it() {
        let mut cache = CacheManager::new(1000);
        let now = t0();
        cache.put("k".into(), handle(10), false, now);
        cache.put("k".into(), handle(20), true, now);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_size(), 80);
    }

    #[test]
    fn test_hit_ratio_tracks_lookups() {
        let mut cache = CacheManager::new(1000);
        let now = t0();
        cache.put("k".into(), handle(10), false, now);

        assert!(cache.get("k", now).is_some());
        assert!(cache.get("missing", now).is_none());
        assert!(cache.get("k", now).is_some());
        assert!((cache.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_resets_size_accounting() {
        let mut cache = CacheManager::new(1000);
        cache.put("k".into(), handle(10), false, t0());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
    }
}
