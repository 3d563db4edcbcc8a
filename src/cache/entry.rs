//! Per-item cache rows with generation-checked property slots

use crate::cache::types::{Generation, PropertyBag, PropertyName, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Load state of one property slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyState {
    /// Never fetched, or invalidated since the last fetch
    NeedsLoading,

    /// A fetch for this slot is in flight
    Loading,

    /// The slot holds a fresh value (which may be `Absent`)
    Fulfilled,
}

/// One property of one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySlot {
    pub state: PropertyState,
    pub value: PropertyValue,

    /// Generation of the last start, write or invalidation
    pub generation: Generation,
}

impl PropertySlot {
    fn new(generation: Generation) -> Self {
        Self {
            state: PropertyState::NeedsLoading,
            value: PropertyValue::Unknown,
            generation,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.state == PropertyState::Fulfilled
    }
}

/// Outcome of writing fetched values into a row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Slots that took the new value
    pub written: usize,

    /// Slots that refused it because a newer generation already landed
    pub dropped: usize,
}

impl WriteOutcome {
    pub fn changed(&self) -> bool {
        self.written > 0
    }

    pub(crate) fn absorb(&mut self, other: WriteOutcome) {
        self.written += other.written;
        self.dropped += other.dropped;
    }
}

/// All cached properties of one item
///
/// Invariant: no slot ever holds a value written under a generation older
/// than the slot's own generation or the row's `floor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    properties: HashMap<PropertyName, PropertySlot>,

    /// Generation at which the row was created or wholesale invalidated
    floor: Generation,
}

impl CacheEntry {
    /// Create an empty row that rejects writes older than `generation`
    pub fn new(generation: Generation) -> Self {
        Self {
            properties: HashMap::new(),
            floor: generation,
        }
    }

    /// Names from `names` that must be fetched: never seen or invalidated,
    /// and not already in flight
    pub fn create_requests(&self, names: &[PropertyName]) -> Vec<PropertyName> {
        names
            .iter()
            .filter(|name| {
                self.properties
                    .get(*name)
                    .map_or(true, |slot| slot.state == PropertyState::NeedsLoading)
            })
            .cloned()
            .collect()
    }

    /// Mark `names` as in flight under `generation`
    pub fn start_requests(&mut self, generation: Generation, names: &[PropertyName]) {
        let floor = self.floor;
        for name in names {
            let slot = self
                .properties
                .entry(name.clone())
                .or_insert_with(|| PropertySlot::new(floor));
            if slot.state != PropertyState::NeedsLoading {
                continue;
            }
            slot.state = PropertyState::Loading;
            slot.generation = generation;
        }
    }

    /// Write `names` from `bag` unless a newer generation already landed
    pub fn store_properties(
        &mut self,
        generation: Generation,
        bag: &PropertyBag,
        names: &[PropertyName],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        if generation < self.floor {
            outcome.dropped = names.len();
            return outcome;
        }

        let floor = self.floor;
        for name in names {
            let slot = self
                .properties
                .entry(name.clone())
                .or_insert_with(|| PropertySlot::new(floor));
            if generation < slot.generation {
                outcome.dropped += 1;
                continue;
            }
            slot.value = bag.get(name).clone();
            slot.state = PropertyState::Fulfilled;
            slot.generation = generation;
            outcome.written += 1;
        }
        outcome
    }

    /// Mark `names` (or every slot when `None`) as stale under `generation`
    pub fn invalidate(&mut self, generation: Generation, names: Option<&[PropertyName]>) {
        match names {
            Some(names) => {
                for name in names {
                    let slot = self
                        .properties
                        .entry(name.clone())
                        .or_insert_with(|| PropertySlot::new(generation));
                    slot.state = PropertyState::NeedsLoading;
                    slot.value = PropertyValue::Unknown;
                    slot.generation = generation;
                }
            }
            None => {
                self.floor = self.floor.max(generation);
                for slot in self.properties.values_mut() {
                    slot.state = PropertyState::NeedsLoading;
                    slot.value = PropertyValue::Unknown;
                    slot.generation = generation;
                }
            }
        }
    }

    /// True iff every name is fulfilled
    pub fn has_fresh_cache(&self, names: &[PropertyName]) -> bool {
        names
            .iter()
            .all(|name| self.properties.get(name).is_some_and(PropertySlot::is_fresh))
    }

    /// Current values for `names`, `Unknown` where nothing is cached
    pub fn get(&self, names: &[PropertyName]) -> PropertyBag {
        names
            .iter()
            .map(|name| {
                let value = self
                    .properties
                    .get(name)
                    .map(|slot| slot.value.clone())
                    .unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }

    pub fn slot(&self, name: &PropertyName) -> Option<&PropertySlot> {
        self.properties.get(name)
    }

    pub fn floor(&self) -> Generation {
        self.floor
    }

    /// True if any slot is waiting on a fetch
    pub fn is_loading(&self) -> bool {
        self.properties
            .values()
            .any(|slot| slot.state == PropertyState::Loading)
    }
}
