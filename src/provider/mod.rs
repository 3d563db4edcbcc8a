//! Property providers and the file entries they describe
//!
//! A provider knows how to compute a fixed set of property names for a batch
//! of entries: filesystem attributes, content sniffing, cloud metadata,
//! policy evaluation and so on. The cache never calls providers directly; it
//! goes through [`ProviderAggregator`], which routes each name to the single
//! provider that declares it.

pub mod aggregator;

pub use aggregator::ProviderAggregator;

use crate::cache::types::{ItemKey, PropertyBag, PropertyName};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Handle to a file-system entry, identified by its URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub url: ItemKey,
    pub is_directory: bool,
}

impl FileEntry {
    pub fn file(url: impl Into<ItemKey>) -> Self {
        Self {
            url: url.into(),
            is_directory: false,
        }
    }

    pub fn directory(url: impl Into<ItemKey>) -> Self {
        Self {
            url: url.into(),
            is_directory: true,
        }
    }
}

/// One entry and the names wanted for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRequest {
    pub entry: FileEntry,
    pub names: Vec<PropertyName>,
}

impl PropertyRequest {
    pub fn new(entry: FileEntry, names: Vec<PropertyName>) -> Self {
        Self { entry, names }
    }
}

/// Source of property values for a declared set of names
///
/// `get` returns one bag per request, in request order. Names the provider
/// cannot produce may be omitted from a bag; the cache records them as
/// absent. Returning an error makes every name of the batch absent.
#[async_trait]
pub trait PropertyProvider: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Every property name this provider can produce
    fn property_names(&self) -> Vec<PropertyName>;

    /// Whether the provider can run at all right now
    fn is_available(&self) -> bool {
        true
    }

    /// Whether the provider handles this kind of entry
    fn supports(&self, _entry: &FileEntry) -> bool {
        true
    }

    async fn get(&self, requests: &[PropertyRequest]) -> Result<Vec<PropertyBag>>;
}

/// Decides whether a URL still names a live entry
///
/// `MetadataModel::update` silently skips URLs that do not resolve.
pub trait EntryResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Option<FileEntry>;
}

/// In-memory table of live entries
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: RwLock<HashMap<ItemKey, FileEntry>>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: FileEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.url.clone(), entry);
        }
    }

    pub fn remove(&self, url: &str) -> Option<FileEntry> {
        self.entries.write().ok()?.remove(url)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntryResolver for EntryTable {
    fn resolve(&self, url: &str) -> Option<FileEntry> {
        self.entries.read().ok()?.get(url).cloned()
    }
}
