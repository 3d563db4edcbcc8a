//! Live cache store with generation guard and LRU eviction
//!
//! The store is a plain synchronous structure. `MetadataModel` owns the only
//! instance behind its lock, which makes every method here atomic with
//! respect to concurrent `get` calls.

use crate::cache::{
    config::CacheConfig,
    entry::{CacheEntry, WriteOutcome},
    events::{CacheEvent, CacheEventKind, EventSender},
    snapshot::Snapshot,
    types::{
        CacheStats, Generation, ItemKey, PendingPairs, PropertyBag, PropertyName, PropertyValue,
    },
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Rows for every cached item plus the generation counter
pub struct CacheStore {
    /// Main storage: key -> row
    entries: HashMap<ItemKey, CacheEntry>,

    /// LRU tracking: maintains access order
    lru_queue: VecDeque<ItemKey>,

    /// Last generation handed out
    generation: Generation,

    /// Current cache statistics
    stats: CacheStats,

    config: CacheConfig,

    events: EventSender,
}

impl CacheStore {
    /// Create an empty store publishing change events on `events`
    pub fn new(config: CacheConfig, events: EventSender) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            generation: Generation::default(),
            stats: CacheStats::default(),
            config,
            events,
        }
    }

    /// True iff every (key, name) pair holds a fulfilled value
    pub fn has_fresh_cache(&self, keys: &[ItemKey], names: &[PropertyName]) -> bool {
        keys.iter().all(|key| {
            self.entries
                .get(key)
                .is_some_and(|entry| entry.has_fresh_cache(names))
        })
    }

    /// Cached values for each key in input order; never fetches
    pub fn get(&mut self, keys: &[ItemKey], names: &[PropertyName]) -> Vec<PropertyBag> {
        let bags = self.peek(keys, names);
        for key in keys {
            if self.entries.contains_key(key) {
                self.touch(key);
            }
        }
        bags
    }

    /// Like `get` without refreshing recency
    pub fn peek(&self, keys: &[ItemKey], names: &[PropertyName]) -> Vec<PropertyBag> {
        keys.iter()
            .map(|key| match self.entries.get(key) {
                Some(entry) => entry.get(names),
                None => names
                    .iter()
                    .map(|name| (name.clone(), PropertyValue::Unknown))
                    .collect(),
            })
            .collect()
    }

    /// Advance and return the generation counter
    pub fn generate_request_id(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    /// Last generation handed out
    pub fn current_generation(&self) -> Generation {
        self.generation
    }

    /// Deep copy of the rows for `keys`
    pub fn create_snapshot(&self, keys: &[ItemKey]) -> Snapshot {
        let entries = keys
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.clone()))
            })
            .collect();
        Snapshot::new(entries)
    }

    /// Mark pairs as in flight, creating rows for unseen keys
    pub fn start_requests(&mut self, generation: Generation, requests: &[PendingPairs]) {
        for request in requests {
            self.ensure_entry(&request.key, generation)
                .start_requests(generation, &request.names);
            self.touch(&request.key);
        }
    }

    /// Write fetched or optimistic values under `generation`
    ///
    /// Slots whose last write or invalidation is newer than `generation`
    /// keep their value. Keys without a row are skipped: the row was cleared
    /// or evicted after the fetch started and must not be resurrected.
    pub fn store_properties(
        &mut self,
        generation: Generation,
        requests: &[PendingPairs],
        bags: &[PropertyBag],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        let mut changed = Vec::new();

        for (request, bag) in requests.iter().zip(bags) {
            let Some(entry) = self.entries.get_mut(&request.key) else {
                debug!("Skipping store for removed row: {}", request.key);
                continue;
            };
            let written = entry.store_properties(generation, bag, &request.names);
            if written.dropped > 0 {
                debug!(
                    "Dropped {} stale properties for {} from fetch {}",
                    written.dropped, request.key, generation
                );
            }
            if written.changed() {
                changed.push(request.key.clone());
            }
            outcome.absorb(written);
        }

        if self.config.enable_metrics {
            self.stats.stale_writes_dropped += outcome.dropped as u64;
        }
        if !changed.is_empty() {
            self.emit(CacheEventKind::Updated, changed);
        }
        outcome
    }

    /// Mark pairs stale under `generation`; all names when `names` is `None`
    ///
    /// Rows are created for unseen keys so later `has_fresh_cache` calls see
    /// the key as stale, and so older fetches are rejected by the row floor.
    pub fn invalidate(&mut self, generation: Generation, keys: &[ItemKey], names: Option<&[PropertyName]>) {
        for key in keys {
            self.ensure_entry(key, generation).invalidate(generation, names);
        }

        if self.config.enable_metrics {
            self.stats.invalidations += keys.len() as u64;
        }
        if !keys.is_empty() {
            self.emit(CacheEventKind::Invalidated, keys.to_vec());
        }
    }

    /// Remove the rows for `keys` outright
    pub fn clear(&mut self, keys: &[ItemKey]) {
        let mut removed = Vec::new();
        for key in keys {
            if self.remove_entry(key) {
                removed.push(key.clone());
            }
        }

        if !removed.is_empty() {
            debug!("Cleared {} cache rows", removed.len());
            self.emit(CacheEventKind::Cleared, removed);
        }
    }

    /// Drop every row
    pub fn clear_all(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        self.lru_queue.clear();

        info!("Cleared {} rows from metadata cache", count);
        self.emit(CacheEventKind::ClearedAll, Vec::new());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics with the current row count filled in
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entries = self.entries.len();
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> Option<&mut CacheStats> {
        self.config.enable_metrics.then_some(&mut self.stats)
    }

    fn ensure_entry(&mut self, key: &ItemKey, generation: Generation) -> &mut CacheEntry {
        if !self.entries.contains_key(key) {
            self.evict_if_needed();
            if self.config.enable_lru_eviction {
                self.lru_queue.push_back(key.clone());
            }
        }
        self.entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(generation))
    }

    fn touch(&mut self, key: &str) {
        if self.config.enable_lru_eviction {
            self.lru_queue.retain(|k| k != key);
            self.lru_queue.push_back(key.to_string());
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.lru_queue.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Make room for one more row
    fn evict_if_needed(&mut self) {
        if !self.config.enable_lru_eviction {
            return;
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.config.max_entries {
            let Some(key) = self.lru_queue.pop_front() else {
                break;
            };
            debug!("Evicting row due to max_entries limit: {}", key);
            self.entries.remove(&key);
            evicted.push(key);
        }

        if !evicted.is_empty() {
            if self.config.enable_metrics {
                self.stats.evictions += evicted.len() as u64;
            }
            self.emit(CacheEventKind::Evicted, evicted);
        }
    }

    fn emit(&self, kind: CacheEventKind, keys: Vec<ItemKey>) {
        // No subscribers is not an error
        let _ = self.events.send(CacheEvent::new(kind, keys, self.generation));
    }
}
