//! Units queued behind an in-flight traversal.
//!
//! Slots are keyed by the admitted unit's sequence number and hold one unit
//! per coalesced request, the admitting unit first. The wait list has no lock
//! of its own; the dispatcher only touches it under its state lock.

use crate::unit::Unit;
use std::collections::HashMap;

/// Sequence number → queued units, in arrival order.
#[derive(Debug, Default)]
pub struct WaitList {
    slots: HashMap<u64, Vec<Unit>>,
}

impl WaitList {
    /// Creates an empty wait list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit to the slot, creating it if absent.
    pub fn add(&mut self, seq: u64, unit: Unit) -> &mut Self {
        self.slots.entry(seq).or_default().push(unit);
        self
    }

    /// Returns the queued units, or an empty slice.
    pub fn get(&self, seq: u64) -> &[Unit] {
        self.slots.get(&seq).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Empties the slot but keeps the key present.
    pub fn clear(&mut self, seq: u64) -> &mut Self {
        self.slots.entry(seq).or_default().clear();
        self
    }

    /// Empties and removes the slot.
    pub fn remove(&mut self, seq: u64) -> &mut Self {
        self.slots.remove(&seq);
        self
    }

    /// Returns true if the key is present, even with an empty slot.
    pub fn contains(&self, seq: u64) -> bool {
        self.slots.contains_key(&seq)
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no keys are present.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the number of queued units across all slots.
    pub fn waiting(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}
