//! Public entry point: coalescing, snapshot-isolated property fetches
//!
//! `MetadataModel::get` answers from the live store when every requested
//! pair is fresh. Otherwise it registers a callback request holding a
//! snapshot of the rows it needs, marks the pairs nobody is fetching yet as
//! in flight, and issues a single aggregator call for exactly those pairs.
//! Whenever any fetch completes, its results are written to the live store
//! and to every pending snapshot, and each callback whose snapshot became
//! fully fresh is fulfilled.

use crate::cache::{
    config::CacheConfig,
    events::{EventReceiver, EventSender},
    snapshot::Snapshot,
    store::CacheStore,
    types::{CacheStats, Generation, ItemKey, PendingPairs, PropertyBag, PropertyName, PropertyValue},
};
use crate::error::{MetadataError, Result};
use crate::provider::{EntryResolver, FileEntry, PropertyRequest, ProviderAggregator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, RwLock};
use tracing::{debug, info};

/// Property cache for file entries backed by a provider aggregator
///
/// Cloning is cheap and every clone shares the same cache.
#[derive(Clone)]
pub struct MetadataModel {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    aggregator: ProviderAggregator,

    /// Decides liveness for `update`; `None` means "has a live cache row"
    resolver: Option<Arc<dyn EntryResolver>>,

    state: RwLock<ModelState>,

    events: EventSender,

    config: CacheConfig,
}

struct ModelState {
    cache: CacheStore,

    /// Unfulfilled `get` calls, oldest first
    callbacks: Vec<CallbackRequest>,
}

/// One `get` call waiting for its pairs to become fresh
struct CallbackRequest {
    keys: Vec<ItemKey>,
    names: Vec<PropertyName>,
    snapshot: Snapshot,
    fulfill: oneshot::Sender<Vec<PropertyBag>>,
}

impl CallbackRequest {
    /// Merge fetch results; true once the whole requirement is fresh
    fn store_properties(&mut self, generation: Generation, requests: &[PendingPairs], bags: &[PropertyBag]) -> bool {
        self.snapshot.store_properties(generation, requests, bags);
        self.snapshot.has_fresh_cache(&self.keys, &self.names)
    }

    fn fulfill(self) {
        let bags = self.snapshot.get(&self.keys, &self.names);
        // The caller may have stopped waiting
        let _ = self.fulfill.send(bags);
    }
}

impl MetadataModel {
    /// Create a model whose `update` accepts any URL with a live cache row
    pub fn new(aggregator: ProviderAggregator, config: CacheConfig) -> Result<Self> {
        Self::build(aggregator, config, None)
    }

    /// Create a model whose `update` consults `resolver` for liveness
    pub fn with_resolver(
        aggregator: ProviderAggregator,
        config: CacheConfig,
        resolver: Arc<dyn EntryResolver>,
    ) -> Result<Self> {
        Self::build(aggregator, config, Some(resolver))
    }

    fn build(
        aggregator: ProviderAggregator,
        config: CacheConfig,
        resolver: Option<Arc<dyn EntryResolver>>,
    ) -> Result<Self> {
        config.validate()?;
        info!("Initializing metadata model with config: {:?}", config);

        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let state = ModelState {
            cache: CacheStore::new(config.clone(), events.clone()),
            callbacks: Vec::new(),
        };

        Ok(Self {
            inner: Arc::new(ModelInner {
                aggregator,
                resolver,
                state: RwLock::new(state),
                events,
                config,
            }),
        })
    }

    /// Get `names` for every entry, fetching whatever is not fresh
    ///
    /// Fails only when a name is not declared by any provider. Pairs already
    /// being fetched by another call are waited on rather than fetched again.
    pub async fn get(&self, entries: &[FileEntry], names: &[PropertyName]) -> Result<Vec<PropertyBag>> {
        self.inner.aggregator.check_property_names(names)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        // Nothing to fetch and nothing a snapshot could ever report fresh
        if names.is_empty() {
            return Ok(vec![PropertyBag::new(); entries.len()]);
        }

        let keys = keys_of(entries);
        let (receiver, generation, requests) = {
            let mut state = self.inner.state.write().await;
            if state.cache.has_fresh_cache(&keys, names) {
                if let Some(stats) = state.cache.stats_mut() {
                    stats.hits += 1;
                }
                return Ok(state.cache.get(&keys, names));
            }

            let generation = state.cache.generate_request_id();
            let mut snapshot = state.cache.create_snapshot(&keys);
            let requests = snapshot.create_requests(&keys, names);
            snapshot.start_requests(generation, &requests);
            state.cache.start_requests(generation, &requests);

            if let Some(stats) = state.cache.stats_mut() {
                stats.misses += 1;
                if requests.is_empty() {
                    stats.coalesced += 1;
                } else {
                    stats.fetches += 1;
                }
            }

            let (sender, receiver) = oneshot::channel();
            state.callbacks.push(CallbackRequest {
                keys,
                names: names.to_vec(),
                snapshot,
                fulfill: sender,
            });
            (receiver, generation, requests)
        };

        if requests.is_empty() {
            debug!("Fetch {} coalesced onto requests already in flight", generation);
        } else {
            let by_key: HashMap<&str, &FileEntry> =
                entries.iter().map(|entry| (entry.url.as_str(), entry)).collect();
            let property_requests = requests
                .iter()
                .filter_map(|request| {
                    by_key
                        .get(request.key.as_str())
                        .map(|entry| PropertyRequest::new((*entry).clone(), request.names.clone()))
                })
                .collect();

            debug!("Fetch {} issued for {} entries", generation, requests.len());
            // Runs detached so a caller dropping its future cannot strand
            // other callers waiting on the same pairs
            tokio::spawn(Self::fetch(self.inner.clone(), generation, requests, property_requests));
        }

        Ok(receiver.await?)
    }

    async fn fetch(
        inner: Arc<ModelInner>,
        generation: Generation,
        requests: Vec<PendingPairs>,
        property_requests: Vec<PropertyRequest>,
    ) {
        let mut bags = inner.aggregator.get(&property_requests).await;
        for (bag, request) in bags.iter_mut().zip(&requests) {
            bag.fill_absent(&request.names);
        }

        let mut state = inner.state.write().await;
        state.cache.store_properties(generation, &requests, &bags);

        let mut fulfilled = 0;
        let mut index = 0;
        while index < state.callbacks.len() {
            if state.callbacks[index].store_properties(generation, &requests, &bags) {
                state.callbacks.remove(index).fulfill();
                fulfilled += 1;
            } else {
                index += 1;
            }
        }
        debug!(
            "Fetch {} completed, fulfilled {} requests, {} still pending",
            generation,
            fulfilled,
            state.callbacks.len()
        );
    }

    /// Cached values only; never fetches
    pub async fn get_cache(&self, entries: &[FileEntry], names: &[PropertyName]) -> Result<Vec<PropertyBag>> {
        self.get_cache_by_urls(&keys_of(entries), names).await
    }

    /// Cached values by URL only; never fetches
    pub async fn get_cache_by_urls(&self, urls: &[ItemKey], names: &[PropertyName]) -> Result<Vec<PropertyBag>> {
        self.inner.aggregator.check_property_names(names)?;
        let mut state = self.inner.state.write().await;
        Ok(state.cache.get(urls, names))
    }

    /// True iff every (url, name) pair is fresh in the live store
    pub async fn has_fresh_cache(&self, urls: &[ItemKey], names: &[PropertyName]) -> bool {
        self.inner.state.read().await.cache.has_fresh_cache(urls, names)
    }

    /// Write values the caller already knows, without a provider round-trip
    ///
    /// `values[i][j]` is the value of `names[j]` for `urls[i]`. URLs that no
    /// longer resolve to a live entry are skipped. The write wins over every
    /// fetch issued before it.
    pub async fn update(&self, urls: &[ItemKey], names: &[PropertyName], values: &[Vec<PropertyValue>]) -> Result<()> {
        self.inner.aggregator.check_property_names(names)?;
        if urls.len() != values.len() {
            return Err(MetadataError::InvalidArgument(format!(
                "{} urls but {} value rows",
                urls.len(),
                values.len()
            )));
        }
        if let Some(row) = values.iter().find(|row| row.len() != names.len()) {
            return Err(MetadataError::InvalidArgument(format!(
                "{} names but a value row of length {}",
                names.len(),
                row.len()
            )));
        }

        let mut state = self.inner.state.write().await;
        let generation = state.cache.generate_request_id();

        let mut requests = Vec::new();
        let mut bags = Vec::new();
        for (url, row) in urls.iter().zip(values) {
            if !self.is_live(&state.cache, url) {
                debug!("Skipping update for entry that is gone: {}", url);
                continue;
            }
            let mut bag: PropertyBag = names.iter().cloned().zip(row.iter().cloned()).collect();
            bag.fill_absent(names);
            requests.push(PendingPairs {
                key: url.clone(),
                names: names.to_vec(),
            });
            bags.push(bag);
        }

        let keys: Vec<ItemKey> = requests.iter().map(|request| request.key.clone()).collect();
        state.cache.invalidate(generation, &keys, Some(names));
        state.cache.store_properties(generation, &requests, &bags);
        Ok(())
    }

    fn is_live(&self, cache: &CacheStore, url: &str) -> bool {
        match &self.inner.resolver {
            Some(resolver) => resolver.resolve(url).is_some(),
            None => cache.contains(url),
        }
    }

    /// Forget anything cached under the keys of newly created entries
    pub async fn notify_entries_created(&self, entries: &[FileEntry]) {
        let mut state = self.inner.state.write().await;
        state.cache.generate_request_id();
        state.cache.clear(&keys_of(entries));
    }

    /// Forget removed entries
    pub async fn notify_entries_removed(&self, urls: &[ItemKey]) {
        let mut state = self.inner.state.write().await;
        state.cache.generate_request_id();
        state.cache.clear(urls);
    }

    /// Mark every property of changed entries stale, keeping their rows
    pub async fn notify_entries_changed(&self, entries: &[FileEntry]) {
        let mut state = self.inner.state.write().await;
        let generation = state.cache.generate_request_id();
        state.cache.invalidate(generation, &keys_of(entries), None);
    }

    /// Drop every cached row
    pub async fn clear_all_cache(&self) {
        let mut state = self.inner.state.write().await;
        state.cache.generate_request_id();
        state.cache.clear_all();
    }

    /// Receive change notifications until the receiver is dropped
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// Number of `get` calls still waiting on a fetch
    pub async fn pending_requests(&self) -> usize {
        self.inner.state.read().await.callbacks.len()
    }

    /// Last generation handed out
    pub async fn current_generation(&self) -> Generation {
        self.inner.state.read().await.cache.current_generation()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.state.read().await.cache.stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn aggregator(&self) -> &ProviderAggregator {
        &self.inner.aggregator
    }
}

fn keys_of(entries: &[FileEntry]) -> Vec<ItemKey> {
    entries.iter().map(|entry| entry.url.clone()).collect()
}
