//! Memory layout descriptor for one query's output buffers.
//!
//! [`ResultLayout`] is a pure data contract: it describes slot geometry (how
//! many key and aggregate slots exist, at which widths, row-major or
//! column-major) and answers width/offset queries. It performs no I/O and
//! never changes shape once storage has been allocated against it.
//!
//! Physical geometry:
//!
//! - row-major: each entry is `[keys][pad to 8][slot 0][slot 1]…`, the whole
//!   row padded to an 8-byte multiple;
//! - column-major: `[key col 0]…[key col n][slot col 0]…`, each column a
//!   contiguous run of `entry_count` values at the slot's padded width.
//!
//! Out-of-range slot indexes are fatal precondition violations (the caller
//! holds a descriptor inconsistent with its own layout), not recoverable
//! errors.

use tephra_result::{Error, Result};

use crate::distinct::CountDistinctDescriptor;

/// Addressing scheme of the query's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryDescription {
    /// One output row per input row; no group-by keys.
    Projection,
    /// Dense-range group-by; keys index the table directly.
    GroupByPerfectHash,
    /// Generic open-addressing group-by.
    GroupByBaselineHash,
    /// Single-row aggregate without grouping.
    NonGroupedAggregate,
}

/// Width bookkeeping for one physical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDesc {
    /// Bytes the slot actually occupies in storage.
    pub padded_width: usize,
    /// Bytes needed to represent the logical value.
    pub logical_width: usize,
}

#[inline]
fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Memory layout descriptor. See the module docs for the physical geometry.
#[derive(Debug, Clone)]
pub struct ResultLayout {
    query_type: QueryDescription,
    is_columnar: bool,
    entry_count: usize,
    group_key_count: usize,
    key_width: usize,
    effective_key_width: usize,
    slots: Vec<SlotDesc>,
    target_groupby_indices: Vec<i64>,
    count_distinct_descriptors: Vec<CountDistinctDescriptor>,
    has_keyless_hash: bool,
    keyless_key_slot: usize,
    keyless_init_val: i64,
    /// Per-slot byte offset within the row's target region (row-major).
    rowwise_slot_offsets: Vec<usize>,
}

impl ResultLayout {
    pub fn builder(query_type: QueryDescription, entry_count: usize) -> ResultLayoutBuilder {
        ResultLayoutBuilder::new(query_type, entry_count)
    }

    #[inline]
    pub fn query_type(&self) -> QueryDescription {
        self.query_type
    }

    #[inline]
    pub fn is_columnar(&self) -> bool {
        self.is_columnar
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    #[inline]
    pub fn group_key_count(&self) -> usize {
        self.group_key_count
    }

    #[inline]
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Width used for key-slot arithmetic; may differ from the nominal key
    /// width due to padding rules.
    #[inline]
    pub fn effective_key_width(&self) -> usize {
        self.effective_key_width
    }

    #[inline]
    pub fn has_keyless_hash(&self) -> bool {
        self.has_keyless_hash
    }

    /// Slot whose initialization sentinel marks emptiness under a keyless
    /// perfect hash, plus that sentinel value.
    #[inline]
    pub fn keyless_emptiness_probe(&self) -> (usize, i64) {
        (self.keyless_key_slot, self.keyless_init_val)
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Bytes the slot occupies in storage. Panics when `slot_idx` is out of
    /// range.
    #[inline]
    pub fn padded_slot_width_bytes(&self, slot_idx: usize) -> usize {
        self.slots[slot_idx].padded_width
    }

    /// Bytes needed to represent the slot's logical value.
    #[inline]
    pub fn logical_slot_width_bytes(&self, slot_idx: usize) -> usize {
        self.slots[slot_idx].logical_width
    }

    /// `Some(key_idx)` when the output column at `target_idx` aliases a
    /// group-by key slot instead of carrying its own slot.
    #[inline]
    pub fn target_groupby_index(&self, target_idx: usize) -> Option<usize> {
        if self.target_groupby_indices.is_empty() {
            return None;
        }
        let v = self.target_groupby_indices[target_idx];
        (v >= 0).then_some(v as usize)
    }

    #[inline]
    pub fn has_target_groupby_indices(&self) -> bool {
        !self.target_groupby_indices.is_empty()
    }

    /// Count-distinct strategy for the output column at `target_idx`;
    /// [`CountDistinctDescriptor::Invalid`] for non-distinct targets.
    #[inline]
    pub fn count_distinct_descriptor(&self, target_idx: usize) -> &CountDistinctDescriptor {
        self.count_distinct_descriptors
            .get(target_idx)
            .unwrap_or(&CountDistinctDescriptor::Invalid)
    }

    /// True for a single-column perfect-hash group-by, where the key and a
    /// non-aggregate target can share one slot.
    #[inline]
    pub fn is_single_column_perfect_hash(&self) -> bool {
        self.query_type == QueryDescription::GroupByPerfectHash && self.group_key_count == 1
    }

    /// Number of key slots physically present in storage (zero under a
    /// keyless hash).
    #[inline]
    pub fn stored_key_count(&self) -> usize {
        if self.has_keyless_hash {
            0
        } else {
            self.group_key_count
        }
    }

    /// Bytes of key storage per entry (row-major), before padding.
    #[inline]
    pub fn key_bytes(&self) -> usize {
        self.stored_key_count() * self.effective_key_width
    }

    /// Key bytes rounded up to the 8-byte boundary the target region starts
    /// on (row-major).
    #[inline]
    pub fn key_bytes_with_padding(&self) -> usize {
        align8(self.key_bytes())
    }

    /// Total padded width of the target region of one row.
    #[inline]
    pub fn targets_width_bytes(&self) -> usize {
        self.slots.iter().map(|s| s.padded_width).sum()
    }

    /// Size of one row in bytes (row-major), 8-byte aligned.
    #[inline]
    pub fn row_size_bytes(&self) -> usize {
        align8(self.key_bytes_with_padding() + self.targets_width_bytes())
    }

    /// Byte offset of `slot_idx` within a row's target region (row-major).
    #[inline]
    pub fn rowwise_target_offset(&self, slot_idx: usize) -> usize {
        self.rowwise_slot_offsets[slot_idx]
    }

    /// Byte offset of the start of key column `key_idx` (column-major).
    #[inline]
    pub fn key_col_off_in_bytes(&self, key_idx: usize) -> usize {
        debug_assert!(key_idx < self.stored_key_count());
        key_idx * self.effective_key_width * self.entry_count
    }

    /// Byte offset of the start of slot column `slot_idx` (column-major).
    pub fn col_off_in_bytes(&self, slot_idx: usize) -> usize {
        assert!(slot_idx < self.slots.len(), "slot index out of range");
        let keys = self.stored_key_count() * self.effective_key_width * self.entry_count;
        let before: usize = self.slots[..slot_idx]
            .iter()
            .map(|s| s.padded_width * self.entry_count)
            .sum();
        keys + before
    }

    /// Total buffer size for one partition, or a capacity error when the
    /// entry count does not fit in memory arithmetic.
    pub fn try_buffer_size_bytes(&self) -> Result<usize> {
        let per_entry = if self.is_columnar {
            self.key_bytes() + self.targets_width_bytes()
        } else {
            self.row_size_bytes()
        };
        self.entry_count
            .checked_mul(per_entry)
            .ok_or(Error::CapacityExceeded {
                requested: self.entry_count,
            })
    }

    /// Total buffer size for one partition. Panics on overflow; use
    /// [`ResultLayout::try_buffer_size_bytes`] where a capacity error should
    /// be surfaced instead.
    #[inline]
    pub fn buffer_size_bytes(&self) -> usize {
        self.try_buffer_size_bytes().expect("buffer size overflow")
    }
}

/// Builder for [`ResultLayout`]. Shape mistakes (zero entry count, zero
/// slots, width not in {1,2,4,8}) are programmer errors and panic at
/// `build`.
#[derive(Debug, Clone)]
pub struct ResultLayoutBuilder {
    query_type: QueryDescription,
    entry_count: usize,
    is_columnar: bool,
    group_key_count: usize,
    key_width: usize,
    effective_key_width: usize,
    slots: Vec<SlotDesc>,
    target_groupby_indices: Vec<i64>,
    count_distinct_descriptors: Vec<CountDistinctDescriptor>,
    has_keyless_hash: bool,
    keyless_key_slot: usize,
    keyless_init_val: i64,
}

impl ResultLayoutBuilder {
    pub fn new(query_type: QueryDescription, entry_count: usize) -> Self {
        Self {
            query_type,
            entry_count,
            is_columnar: false,
            group_key_count: 0,
            key_width: 8,
            effective_key_width: 8,
            slots: Vec::new(),
            target_groupby_indices: Vec::new(),
            count_distinct_descriptors: Vec::new(),
            has_keyless_hash: false,
            keyless_key_slot: 0,
            keyless_init_val: 0,
        }
    }

    pub fn columnar(mut self, yes: bool) -> Self {
        self.is_columnar = yes;
        self
    }

    /// Declare `count` group-by key slots of `width` bytes each. The
    /// effective width defaults to the nominal width.
    pub fn keys(mut self, count: usize, width: usize) -> Self {
        self.group_key_count = count;
        self.key_width = width;
        self.effective_key_width = width;
        self
    }

    pub fn effective_key_width(mut self, width: usize) -> Self {
        self.effective_key_width = width;
        self
    }

    /// Append one target slot.
    pub fn slot(mut self, padded_width: usize, logical_width: usize) -> Self {
        self.slots.push(SlotDesc {
            padded_width,
            logical_width,
        });
        self
    }

    /// Per-target group-by aliasing vector (−1 = target has its own slot).
    pub fn target_groupby_indices(mut self, indices: Vec<i64>) -> Self {
        self.target_groupby_indices = indices;
        self
    }

    /// Attach a count-distinct descriptor for the target at `target_idx`.
    pub fn count_distinct(
        mut self,
        target_idx: usize,
        desc: CountDistinctDescriptor,
    ) -> Self {
        if self.count_distinct_descriptors.len() <= target_idx {
            self.count_distinct_descriptors
                .resize(target_idx + 1, CountDistinctDescriptor::Invalid);
        }
        self.count_distinct_descriptors[target_idx] = desc;
        self
    }

    /// Mark the layout keyless: no key slot is stored and emptiness is
    /// judged by comparing `key_slot` against `init_val`.
    pub fn keyless(mut self, key_slot: usize, init_val: i64) -> Self {
        self.has_keyless_hash = true;
        self.keyless_key_slot = key_slot;
        self.keyless_init_val = init_val;
        self
    }

    pub fn build(self) -> ResultLayout {
        assert!(self.entry_count > 0, "layout requires entry_count > 0");
        assert!(!self.slots.is_empty(), "layout requires at least one slot");
        for s in &self.slots {
            assert!(
                matches!(s.padded_width, 1 | 2 | 4 | 8),
                "padded slot width must be 1, 2, 4 or 8"
            );
            assert!(
                s.logical_width <= s.padded_width,
                "logical width exceeds padded width"
            );
        }
        assert!(
            matches!(self.effective_key_width, 4 | 8) || self.group_key_count == 0,
            "key width must be 4 or 8"
        );
        if self.has_keyless_hash {
            assert!(self.keyless_key_slot < self.slots.len());
            assert_eq!(
                self.query_type,
                QueryDescription::GroupByPerfectHash,
                "keyless layouts are a perfect-hash feature"
            );
        }
        if !self.target_groupby_indices.is_empty() {
            for &idx in &self.target_groupby_indices {
                assert!(idx < self.group_key_count as i64);
            }
        }

        let mut rowwise_slot_offsets = Vec::with_capacity(self.slots.len());
        let mut off = 0usize;
        for s in &self.slots {
            rowwise_slot_offsets.push(off);
            off += s.padded_width;
        }

        ResultLayout {
            query_type: self.query_type,
            is_columnar: self.is_columnar,
            entry_count: self.entry_count,
            group_key_count: self.group_key_count,
            key_width: self.key_width,
            effective_key_width: self.effective_key_width,
            slots: self.slots,
            target_groupby_indices: self.target_groupby_indices,
            count_distinct_descriptors: self.count_distinct_descriptors,
            has_keyless_hash: self.has_keyless_hash,
            keyless_key_slot: self.keyless_key_slot,
            keyless_init_val: self.keyless_init_val,
            rowwise_slot_offsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_slot_layout(columnar: bool) -> ResultLayout {
        ResultLayout::builder(QueryDescription::GroupByPerfectHash, 4)
            .columnar(columnar)
            .keys(1, 8)
            .slot(8, 8)
            .slot(4, 4)
            .build()
    }

    #[test]
    fn rowwise_geometry() {
        let layout = two_slot_layout(false);
        assert_eq!(layout.key_bytes_with_padding(), 8);
        assert_eq!(layout.rowwise_target_offset(0), 0);
        assert_eq!(layout.rowwise_target_offset(1), 8);
        // 8 key + 8 + 4 slots, row aligned to 8.
        assert_eq!(layout.row_size_bytes(), 24);
        assert_eq!(layout.buffer_size_bytes(), 96);
    }

    #[test]
    fn columnar_geometry() {
        let layout = two_slot_layout(true);
        assert_eq!(layout.key_col_off_in_bytes(0), 0);
        assert_eq!(layout.col_off_in_bytes(0), 32);
        assert_eq!(layout.col_off_in_bytes(1), 64);
        assert_eq!(layout.buffer_size_bytes(), 80);
    }

    #[test]
    fn keyless_layout_stores_no_keys() {
        let layout = ResultLayout::builder(QueryDescription::GroupByPerfectHash, 16)
            .keys(1, 8)
            .keyless(0, 0)
            .slot(8, 8)
            .build();
        assert_eq!(layout.stored_key_count(), 0);
        assert_eq!(layout.key_bytes_with_padding(), 0);
        assert_eq!(layout.row_size_bytes(), 8);
    }

    #[test]
    #[should_panic]
    fn zero_entry_count_is_fatal() {
        let _ = ResultLayout::builder(QueryDescription::Projection, 0)
            .slot(8, 8)
            .build();
    }
}
