//! Point-in-time copies of cache rows taken when a fetch is issued
//!
//! A snapshot never aliases the live store. Fetch results are merged into it
//! under the same generation rules as the live store, so clearing or evicting
//! live rows while a fetch is outstanding cannot starve the callers waiting
//! on that snapshot.

use crate::cache::entry::{CacheEntry, WriteOutcome};
use crate::cache::types::{
    Generation, ItemKey, PendingPairs, PropertyBag, PropertyName, PropertyValue,
};
use std::collections::{HashMap, HashSet};

/// Isolated copy of the rows for one `get` call
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: HashMap<ItemKey, CacheEntry>,
}

impl Snapshot {
    pub(crate) fn new(entries: HashMap<ItemKey, CacheEntry>) -> Self {
        Self { entries }
    }

    /// Pairs among `keys` x `names` that nobody has fetched or is fetching
    ///
    /// Each key appears at most once in the result, in first-seen order.
    pub fn create_requests(&self, keys: &[ItemKey], names: &[PropertyName]) -> Vec<PendingPairs> {
        let mut seen = HashSet::new();
        let mut requests = Vec::new();

        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            let missing = match self.entries.get(key) {
                Some(entry) => entry.create_requests(names),
                None => names.to_vec(),
            };
            if !missing.is_empty() {
                requests.push(PendingPairs {
                    key: key.clone(),
                    names: missing,
                });
            }
        }

        requests
    }

    /// Mark the requested pairs as in flight under `generation`
    pub fn start_requests(&mut self, generation: Generation, requests: &[PendingPairs]) {
        for request in requests {
            self.entries
                .entry(request.key.clone())
                .or_insert_with(|| CacheEntry::new(generation))
                .start_requests(generation, &request.names);
        }
    }

    /// Merge fetch results; keys this snapshot does not track are ignored
    pub fn store_properties(
        &mut self,
        generation: Generation,
        requests: &[PendingPairs],
        bags: &[PropertyBag],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        for (request, bag) in requests.iter().zip(bags) {
            if let Some(entry) = self.entries.get_mut(&request.key) {
                outcome.absorb(entry.store_properties(generation, bag, &request.names));
            }
        }
        outcome
    }

    pub fn has_fresh_cache(&self, keys: &[ItemKey], names: &[PropertyName]) -> bool {
        keys.iter().all(|key| {
            self.entries
                .get(key)
                .is_some_and(|entry| entry.has_fresh_cache(names))
        })
    }

    pub fn get(&self, keys: &[ItemKey], names: &[PropertyName]) -> Vec<PropertyBag> {
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

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
