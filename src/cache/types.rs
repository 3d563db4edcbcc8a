//! Core type definitions for the metadata cache

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Item key type - the URL of a file entry
pub type ItemKey = String;

/// Name of a provider-declared property
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyName(String);

impl PropertyName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PropertyName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached value of a single property
///
/// `Absent` means a provider was asked and produced nothing; it is a valid,
/// fresh answer. `Unknown` means nobody has produced an answer yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    #[default]
    Unknown,
    Absent,
    Present(serde_json::Value),
}

impl PropertyValue {
    /// Wrap any serializable value as a present property
    pub fn present(value: impl Into<serde_json::Value>) -> Self {
        PropertyValue::Present(value.into())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PropertyValue::Unknown)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PropertyValue::Absent)
    }

    /// Borrow the value if present
    pub fn as_present(&self) -> Option<&serde_json::Value> {
        match self {
            PropertyValue::Present(value) => Some(value),
            _ => None,
        }
    }
}

/// Property values for one item, keyed by name
///
/// Reading a name that is not in the bag yields `PropertyValue::Unknown`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    values: HashMap<PropertyName, PropertyValue>,
}

static UNKNOWN: PropertyValue = PropertyValue::Unknown;

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value for `name`
    pub fn get(&self, name: &PropertyName) -> &PropertyValue {
        self.values.get(name).unwrap_or(&UNKNOWN)
    }

    /// Look up by plain string, convenient for callers and tests
    pub fn value(&self, name: &str) -> &PropertyValue {
        self.get(&PropertyName::from(name))
    }

    pub fn insert(&mut self, name: impl Into<PropertyName>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style insert of a present value
    pub fn with(mut self, name: impl Into<PropertyName>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(name, PropertyValue::present(value));
        self
    }

    pub fn contains(&self, name: &PropertyName) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyName, &PropertyValue)> {
        self.values.iter()
    }

    /// Replace every requested name that is missing or unknown with `Absent`
    pub fn fill_absent(&mut self, names: &[PropertyName]) {
        for name in names {
            let slot = self.values.entry(name.clone()).or_default();
            if slot.is_unknown() {
                *slot = PropertyValue::Absent;
            }
        }
    }
}

impl FromIterator<(PropertyName, PropertyValue)> for PropertyBag {
    fn from_iter<T: IntoIterator<Item = (PropertyName, PropertyValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Logical timestamp ordering fetches, writes and invalidations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation that follows this one
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One item's share of a fetch: the entry key and the names still missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPairs {
    pub key: ItemKey,
    pub names: Vec<PropertyName>,
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// `get` calls answered from fresh cache
    pub hits: u64,

    /// `get` calls that had to wait for a fetch
    pub misses: u64,

    /// Provider aggregator invocations
    pub fetches: u64,

    /// Misses fully covered by fetches already in flight
    pub coalesced: u64,

    /// Writes rejected because a newer generation had already landed
    pub stale_writes_dropped: u64,

    /// Invalidated rows
    pub invalidations: u64,

    /// Rows dropped by the LRU bound
    pub evictions: u64,

    /// Rows currently held by the live store
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Share of misses that did not cost a provider call, as a percentage
    pub fn coalescing_rate(&self) -> f64 {
        if self.misses == 0 {
            0.0
        } else {
            (self.coalesced as f64 / self.misses as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, fetches: {}, coalesced: {}, stale_writes_dropped: {}, entries: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.fetches,
            self.coalesced,
            self.stale_writes_dropped,
            self.entries
        )
    }
}
