//! One storage partition of a result set.
//!
//! A partition owns the raw byte buffer one producer shard fills. The write
//! API exists for that producer (and for tests standing in for it); once the
//! fill phase ends the partition is read-only and safe to share across
//! reader threads without locking.

use rustc_hash::FxHashMap;
use tephra_result::Result;
use tephra_types::sentinel::empty_key_value;

use crate::addressing::{addressing_for, SlotAddressing};
use crate::buffer::SlotBuffer;
use crate::layout::{QueryDescription, ResultLayout};
use crate::owner::Handle;

/// One partition ("fragment of result") of a result set.
#[derive(Debug, Clone)]
pub struct ResultStorage {
    layout: std::sync::Arc<ResultLayout>,
    buff: SlotBuffer,
    /// Remote → local handle remapping applied by the count-distinct fixup
    /// pass after a cross-device merge.
    mapped_handles: FxHashMap<Handle, Handle>,
}

impl ResultStorage {
    /// Allocate a partition for `layout`, with every key slot set to the
    /// empty pattern and keyless emptiness probes set to their
    /// initialization sentinel.
    pub fn new(layout: std::sync::Arc<ResultLayout>) -> Result<Self> {
        let size = layout.try_buffer_size_bytes()?;
        let mut storage = Self {
            buff: SlotBuffer::zeroed(size),
            mapped_handles: FxHashMap::default(),
            layout,
        };
        storage.initialize_empty();
        Ok(storage)
    }

    fn initialize_empty(&mut self) {
        let layout = self.layout.clone();
        let addressing = addressing_for(&layout);
        let ekw = layout.effective_key_width();
        if layout.has_keyless_hash() {
            let (slot, init_val) = layout.keyless_emptiness_probe();
            let width = layout.padded_slot_width_bytes(slot);
            for entry in 0..layout.entry_count() {
                let off = addressing.slot_offset(&layout, entry, slot);
                self.buff.write_int(off, width, init_val);
            }
            return;
        }
        let empty = empty_key_value(ekw);
        for entry in 0..layout.entry_count() {
            for key in 0..layout.stored_key_count() {
                let off = addressing.key_offset(&layout, entry, key);
                self.buff.write_int(off, ekw, empty);
            }
        }
    }

    #[inline]
    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    #[inline]
    pub fn buffer(&self) -> &SlotBuffer {
        &self.buff
    }

    fn addressing(&self) -> &'static dyn SlotAddressing {
        addressing_for(&self.layout)
    }

    /// A slot is "empty" when its key (or, for keyless hashes, its
    /// designated probe slot) still holds the reserved empty pattern. Empty
    /// slots are skipped during iteration and never materialize into rows.
    pub fn is_empty_entry(&self, entry_idx: usize) -> bool {
        assert!(entry_idx < self.layout.entry_count(), "entry out of range");
        match self.layout.query_type() {
            QueryDescription::NonGroupedAggregate => false,
            _ if self.layout.has_keyless_hash() => {
                let (slot, init_val) = self.layout.keyless_emptiness_probe();
                let width = self.layout.padded_slot_width_bytes(slot);
                let off = self.addressing().slot_offset(&self.layout, entry_idx, slot);
                self.buff.read_int(off, width) == init_val
            }
            _ => {
                if self.layout.stored_key_count() == 0 {
                    return false;
                }
                let ekw = self.layout.effective_key_width();
                let off = self.addressing().key_offset(&self.layout, entry_idx, 0);
                self.buff.read_int(off, ekw) == empty_key_value(ekw)
            }
        }
    }

    // --- fill-phase API ---------------------------------------------------

    /// Write group-by key `key_idx` of entry `entry_idx`.
    pub fn write_key(&mut self, entry_idx: usize, key_idx: usize, value: i64) {
        let off = self.addressing().key_offset(&self.layout, entry_idx, key_idx);
        let ekw = self.layout.effective_key_width();
        self.buff.write_int(off, ekw, value);
    }

    /// Write an integer into target slot `slot_idx` of entry `entry_idx` at
    /// the slot's padded width.
    pub fn write_slot_int(&mut self, entry_idx: usize, slot_idx: usize, value: i64) {
        let off = self.addressing().slot_offset(&self.layout, entry_idx, slot_idx);
        let width = self.layout.padded_slot_width_bytes(slot_idx);
        self.buff.write_int(off, width, value);
    }

    pub fn write_slot_f32(&mut self, entry_idx: usize, slot_idx: usize, value: f32) {
        let off = self.addressing().slot_offset(&self.layout, entry_idx, slot_idx);
        self.buff.write_f32(off, value);
    }

    pub fn write_slot_f64(&mut self, entry_idx: usize, slot_idx: usize, value: f64) {
        let off = self.addressing().slot_offset(&self.layout, entry_idx, slot_idx);
        debug_assert_eq!(self.layout.padded_slot_width_bytes(slot_idx), 8);
        self.buff.write_f64(off, value);
    }

    /// Write raw bytes into an 8-byte slot (inline top-k heaps).
    pub fn write_slot_bytes(&mut self, entry_idx: usize, slot_idx: usize, bytes: &[u8]) {
        let width = self.layout.padded_slot_width_bytes(slot_idx);
        assert!(bytes.len() <= width, "inline payload exceeds slot width");
        let off = self.addressing().slot_offset(&self.layout, entry_idx, slot_idx);
        self.buff.write_bytes(off, bytes);
    }

    /// Read back a slot's integer at padded width (fixup + tests).
    pub fn read_slot_int(&self, entry_idx: usize, slot_idx: usize) -> i64 {
        let off = self.addressing().slot_offset(&self.layout, entry_idx, slot_idx);
        let width = self.layout.padded_slot_width_bytes(slot_idx);
        self.buff.read_int(off, width)
    }

    pub(crate) fn overwrite_slot_int(&mut self, entry_idx: usize, slot_idx: usize, value: i64) {
        self.write_slot_int(entry_idx, slot_idx, value);
    }

    // --- count-distinct fixup --------------------------------------------

    /// Record a remote→local handle mapping consulted by the fixup pass.
    pub fn set_mapped_handle(&mut self, remote: Handle, local: Handle) {
        self.mapped_handles.insert(remote, local);
    }

    pub(crate) fn mapped_handle(&self, remote: Handle) -> Option<Handle> {
        self.mapped_handles.get(&remote).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn new_storage_is_all_empty() {
        let layout = Arc::new(
            ResultLayout::builder(QueryDescription::GroupByPerfectHash, 8)
                .keys(1, 8)
                .slot(8, 8)
                .build(),
        );
        let storage = ResultStorage::new(layout).unwrap();
        for entry in 0..8 {
            assert!(storage.is_empty_entry(entry));
        }
    }

    #[test]
    fn written_entries_become_non_empty() {
        let layout = Arc::new(
            ResultLayout::builder(QueryDescription::GroupByPerfectHash, 4)
                .keys(1, 8)
                .slot(8, 8)
                .build(),
        );
        let mut storage = ResultStorage::new(layout).unwrap();
        storage.write_key(2, 0, 99);
        storage.write_slot_int(2, 0, 1234);
        assert!(storage.is_empty_entry(0));
        assert!(!storage.is_empty_entry(2));
        assert_eq!(storage.read_slot_int(2, 0), 1234);
    }

    #[test]
    fn keyless_probe_slot_marks_emptiness() {
        let layout = Arc::new(
            ResultLayout::builder(QueryDescription::GroupByPerfectHash, 4)
                .keys(1, 8)
                .keyless(0, -1)
                .slot(8, 8)
                .build(),
        );
        let mut storage = ResultStorage::new(layout).unwrap();
        assert!(storage.is_empty_entry(1));
        storage.write_slot_int(1, 0, 7);
        assert!(!storage.is_empty_entry(1));
    }
}
