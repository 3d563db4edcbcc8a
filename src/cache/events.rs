//! Change notifications emitted by the live cache store
//!
//! Observers subscribe through `MetadataModel::subscribe` and receive one
//! event per mutating store operation. The only promise is "these keys
//! changed"; observers that need values read them back through the model.

use crate::cache::types::{Generation, ItemKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What happened to the listed keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheEventKind {
    /// Fetched or optimistic values landed
    Updated,

    /// Properties were marked stale
    Invalidated,

    /// Rows were removed because their items were created or removed
    Cleared,

    /// Every row was dropped
    ClearedAll,

    /// Rows were dropped by the LRU bound
    Evicted,
}

impl std::fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheEventKind::Updated => write!(f, "updated"),
            CacheEventKind::Invalidated => write!(f, "invalidated"),
            CacheEventKind::Cleared => write!(f, "cleared"),
            CacheEventKind::ClearedAll => write!(f, "cleared all"),
            CacheEventKind::Evicted => write!(f, "LRU eviction"),
        }
    }
}

/// Event describing a cache mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,

    /// Keys touched by the mutation; empty for `ClearedAll`
    pub keys: Vec<ItemKey>,

    /// Generation counter value when the event was emitted
    pub generation: Generation,

    /// When the mutation happened
    pub timestamp: DateTime<Utc>,
}

impl CacheEvent {
    pub fn new(kind: CacheEventKind, keys: Vec<ItemKey>, generation: Generation) -> Self {
        Self {
            kind,
            keys,
            generation,
            timestamp: Utc::now(),
        }
    }
}

/// Sending half shared by the store and the model
pub type EventSender = broadcast::Sender<CacheEvent>;

/// Receiving half handed to observers; dropping it unsubscribes
pub type EventReceiver = broadcast::Receiver<CacheEvent>;
