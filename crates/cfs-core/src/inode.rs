//! The fixed-size inode table.
//!
//! Five slots, looked up by linear scan. Slot positions are stable: a file
//! keeps its slot from CREATE to DELETE, and LIST reports names in slot order.

use crate::codec::InodeEntry;
use cfs_types::{MAX_FILES, SlotIndex};

/// In-memory mirror of the on-disk inode region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InodeTable {
    slots: [Option<InodeEntry>; MAX_FILES],
}

impl InodeTable {
    /// Build from decoded slots (used when loading from disk).
    #[must_use]
    pub fn from_slots(slots: [Option<InodeEntry>; MAX_FILES]) -> Self {
        Self { slots }
    }

    /// Slot holding the named file, if any.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<SlotIndex> {
        self.find(name).map(|(slot, _)| slot)
    }

    /// Slot and entry of the named file, if any.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<(SlotIndex, &InodeEntry)> {
        self.iter_occupied().find(|(_, e)| e.name == name)
    }

    /// The lowest empty slot, if any.
    #[must_use]
    pub fn free_slot(&self) -> Option<SlotIndex> {
        self.slots.iter().position(Option::is_none).map(SlotIndex)
    }

    #[must_use]
    pub fn entry(&self, slot: SlotIndex) -> Option<&InodeEntry> {
        self.slots[slot.0].as_ref()
    }

    pub fn entry_mut(&mut self, slot: SlotIndex) -> Option<&mut InodeEntry> {
        self.slots[slot.0].as_mut()
    }

    pub fn set(&mut self, slot: SlotIndex, entry: Option<InodeEntry>) {
        self.slots[slot.0] = entry;
    }

    /// Occupied slots in slot order.
    pub fn iter_occupied(&self) -> impl Iterator<Item = (SlotIndex, &InodeEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (SlotIndex(i), e)))
    }

    /// Names of occupied slots in slot order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.iter_occupied().map(|(_, e)| e.name.clone()).collect()
    }

    /// Raw slots (snapshot / invariant checks).
    #[must_use]
    pub fn slots(&self) -> &[Option<InodeEntry>; MAX_FILES] {
        &self.slots
    }
}
