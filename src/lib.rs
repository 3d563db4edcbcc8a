//! # Entry Metadata (entry-metadata)
//!
//! An in-memory, coalescing property cache for file-system entries.
//!
//! ## Features
//!
//! - Fresh-cache fast path that answers without suspending
//! - Per-(entry, property) request coalescing: at most one fetch is in flight
//!   for any pair
//! - Generation-checked writes so slow fetches never overwrite newer
//!   invalidations or optimistic updates
//! - Snapshot isolation for in-flight fetches, unaffected by eviction
//! - Pluggable providers routed by declared property names
//! - Optional LRU bound and change notifications
//!
//! ## Fetching properties
//!
//! ```no_run
//! use async_trait::async_trait;
//! use entry_metadata::{
//!     CacheConfig, FileEntry, MetadataModel, PropertyBag, PropertyName, PropertyProvider,
//!     PropertyRequest, ProviderAggregator,
//! };
//! use std::sync::Arc;
//!
//! struct Stat;
//!
//! #[async_trait]
//! impl PropertyProvider for Stat {
//!     fn name(&self) -> &str {
//!         "filesystem"
//!     }
//!
//!     fn property_names(&self) -> Vec<PropertyName> {
//!         vec!["size".into()]
//!     }
//!
//!     async fn get(&self, requests: &[PropertyRequest]) -> entry_metadata::Result<Vec<PropertyBag>> {
//!         Ok(requests.iter().map(|_| PropertyBag::new().with("size", 1024)).collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let aggregator = ProviderAggregator::new(vec![Arc::new(Stat)])?;
//!     let model = MetadataModel::new(aggregator, CacheConfig::default())?;
//!
//!     let entries = vec![FileEntry::file("file:///docs/report.pdf")];
//!     let size = vec![PropertyName::from("size")];
//!     let bags = model.get(&entries, &size).await?;
//!     println!("size: {:?}", bags[0].value("size"));
//!
//!     // Served from cache, no provider call
//!     model.get(&entries, &size).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Keeping the cache correct
//!
//! ```no_run
//! # use entry_metadata::{FileEntry, MetadataModel, PropertyName, PropertyValue};
//! # async fn example(model: MetadataModel) -> anyhow::Result<()> {
//! let entry = FileEntry::file("file:///docs/report.pdf");
//! let size = vec![PropertyName::from("size")];
//!
//! // The caller renamed or rewrote the file itself and knows the new size
//! model
//!     .update(&[entry.url.clone()], &size, &[vec![PropertyValue::present(2048)]])
//!     .await?;
//!
//! // Something else changed it; refetch on next access
//! model.notify_entries_changed(&[entry.clone()]).await;
//!
//! // It was deleted
//! model.notify_entries_removed(&[entry.url.clone()]).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod provider;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEvent, CacheEventKind, CacheStats, Generation, ItemKey,
    PropertyBag, PropertyName, PropertyValue,
};
pub use error::{MetadataError, Result};
pub use model::MetadataModel;
pub use provider::{
    EntryResolver, EntryTable, FileEntry, PropertyProvider, PropertyRequest, ProviderAggregator,
};
