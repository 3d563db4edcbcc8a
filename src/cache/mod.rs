//! # Property Cache Store
//!
//! This module holds the in-memory side of the metadata cache: per-item rows
//! of property slots, the generation counter that orders every fetch and
//! mutation, point-in-time snapshots for in-flight fetches, and change
//! notifications.
//!
//! ## Freshness
//!
//! Every slot is in one of three states:
//! - `NeedsLoading`: never fetched, or invalidated since
//! - `Loading`: a fetch is in flight; other callers wait for it instead of
//!   fetching again
//! - `Fulfilled`: fresh, including values a provider reported as absent
//!
//! ## Generations
//!
//! Each fetch, invalidation and optimistic update is stamped with a new
//! generation. A write only lands if its generation is at least as new as
//! the last write, start or invalidation recorded for the slot, so a slow
//! fetch can never clobber newer state regardless of completion order.
//!
//! ## Example
//!
//! ```rust
//! use entry_metadata::cache::{CacheConfig, CacheStore, PendingPairs, PropertyBag};
//! use tokio::sync::broadcast;
//!
//! let (events, _) = broadcast::channel(16);
//! let mut store = CacheStore::new(CacheConfig::default(), events);
//!
//! let keys = vec!["file:///photos/cat.png".to_string()];
//! let names = vec!["size".into()];
//! let requests = vec![PendingPairs { key: keys[0].clone(), names: names.clone() }];
//!
//! let fetch = store.generate_request_id();
//! store.start_requests(fetch, &requests);
//!
//! // A newer invalidation lands before the fetch completes
//! let newer = store.generate_request_id();
//! store.invalidate(newer, &keys, None);
//!
//! let outcome = store.store_properties(fetch, &requests, &[PropertyBag::new().with("size", 7)]);
//! assert_eq!(outcome.dropped, 1);
//! assert!(!store.has_fresh_cache(&keys, &names));
//! ```

pub mod config;
pub mod entry;
pub mod events;
pub mod snapshot;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, PropertySlot, PropertyState, WriteOutcome};
pub use events::{CacheEvent, CacheEventKind, EventReceiver, EventSender};
pub use snapshot::Snapshot;
pub use store::CacheStore;
pub use types::{
    CacheStats, Generation, ItemKey, PendingPairs, PropertyBag, PropertyName, PropertyValue,
};
