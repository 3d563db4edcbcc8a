//! Configuration for the metadata cache

use crate::error::{MetadataError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Configuration for the metadata cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of item rows kept in the live store
    /// Only enforced when `enable_lru_eviction` is set
    pub max_entries: usize,

    /// Evict least recently used rows once `max_entries` is reached
    pub enable_lru_eviction: bool,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Buffered events per subscriber before old ones are dropped
    pub event_channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            enable_lru_eviction: true,
            enable_metrics: true,
            event_channel_capacity: 64,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.enable_lru_eviction && self.max_entries == 0 {
            return Err(MetadataError::ConfigError(
                "max_entries must be greater than 0 when LRU eviction is enabled".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(MetadataError::ConfigError(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment, reading `.env` first if present
    ///
    /// Recognized variables: `ENTRY_METADATA_MAX_ENTRIES`, `ENTRY_METADATA_LRU`,
    /// `ENTRY_METADATA_METRICS`, `ENTRY_METADATA_EVENT_CAPACITY`. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let mut builder = Self::builder();
        if let Some(max) = env_var::<usize>("ENTRY_METADATA_MAX_ENTRIES")? {
            builder = builder.max_entries(max);
        }
        if let Some(lru) = env_var::<bool>("ENTRY_METADATA_LRU")? {
            builder = builder.enable_lru_eviction(lru);
        }
        if let Some(metrics) = env_var::<bool>("ENTRY_METADATA_METRICS")? {
            builder = builder.enable_metrics(metrics);
        }
        if let Some(capacity) = env_var::<usize>("ENTRY_METADATA_EVENT_CAPACITY")? {
            builder = builder.event_channel_capacity(capacity);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MetadataError::ConfigError(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    max_entries: Option<usize>,
    enable_lru_eviction: Option<bool>,
    enable_metrics: Option<bool>,
    event_channel_capacity: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set maximum number of item rows
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Enable or disable LRU eviction
    pub fn enable_lru_eviction(mut self, enable: bool) -> Self {
        self.enable_lru_eviction = Some(enable);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Set per-subscriber event buffer size
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = Some(capacity);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            enable_lru_eviction: self
                .enable_lru_eviction
                .unwrap_or(defaults.enable_lru_eviction),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
            event_channel_capacity: self
                .event_channel_capacity
                .unwrap_or(defaults.event_channel_capacity),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// A single directory view
    pub fn small() -> Self {
        Self {
            max_entries: 1_000,
            ..Default::default()
        }
    }

    /// Many windows or very large directories
    pub fn large() -> Self {
        Self {
            max_entries: 100_000,
            event_channel_capacity: 256,
            ..Default::default()
        }
    }

    /// Keep every row until it is cleared explicitly
    pub fn unbounded() -> Self {
        Self {
            enable_lru_eviction: false,
            ..Default::default()
        }
    }
}
