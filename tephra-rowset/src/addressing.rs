//! Physical slot addressing.
//!
//! Row-major and column-major storage share one logical API through the
//! [`SlotAddressing`] capability. Decode and iteration code computes byte
//! offsets only through this trait and never branches on the layout tag
//! itself; both implementations must induce identical logical row
//! sequences over the same descriptor, buffer and permutation.

use crate::layout::ResultLayout;

/// Computes byte offsets of slots and keys within a partition buffer.
pub trait SlotAddressing: Send + Sync {
    /// Offset of target slot `slot_idx` for entry `entry_idx`.
    fn slot_offset(&self, layout: &ResultLayout, entry_idx: usize, slot_idx: usize) -> usize;

    /// Offset of group-by key `key_idx` for entry `entry_idx`.
    fn key_offset(&self, layout: &ResultLayout, entry_idx: usize, key_idx: usize) -> usize;
}

/// Row-major addressing: `[keys][pad][slots…]` per entry.
pub struct RowWiseAddressing;

/// Column-major addressing: contiguous per-column runs.
pub struct ColumnWiseAddressing;

impl SlotAddressing for RowWiseAddressing {
    #[inline]
    fn slot_offset(&self, layout: &ResultLayout, entry_idx: usize, slot_idx: usize) -> usize {
        entry_idx * layout.row_size_bytes()
            + layout.key_bytes_with_padding()
            + layout.rowwise_target_offset(slot_idx)
    }

    #[inline]
    fn key_offset(&self, layout: &ResultLayout, entry_idx: usize, key_idx: usize) -> usize {
        debug_assert!(key_idx < layout.stored_key_count());
        entry_idx * layout.row_size_bytes() + key_idx * layout.effective_key_width()
    }
}

impl SlotAddressing for ColumnWiseAddressing {
    #[inline]
    fn slot_offset(&self, layout: &ResultLayout, entry_idx: usize, slot_idx: usize) -> usize {
        layout.col_off_in_bytes(slot_idx) + entry_idx * layout.padded_slot_width_bytes(slot_idx)
    }

    #[inline]
    fn key_offset(&self, layout: &ResultLayout, entry_idx: usize, key_idx: usize) -> usize {
        layout.key_col_off_in_bytes(key_idx) + entry_idx * layout.effective_key_width()
    }
}

/// The addressing strategy for a layout, chosen once per result set.
#[inline]
pub fn addressing_for(layout: &ResultLayout) -> &'static dyn SlotAddressing {
    if layout.is_columnar() {
        &ColumnWiseAddressing
    } else {
        &RowWiseAddressing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::QueryDescription;

    #[test]
    fn rowwise_and_colwise_disagree_on_offsets_not_shape() {
        let row = ResultLayout::builder(QueryDescription::GroupByPerfectHash, 3)
            .keys(1, 8)
            .slot(8, 8)
            .slot(8, 8)
            .build();
        let col = ResultLayout::builder(QueryDescription::GroupByPerfectHash, 3)
            .columnar(true)
            .keys(1, 8)
            .slot(8, 8)
            .slot(8, 8)
            .build();

        let rw = RowWiseAddressing;
        let cw = ColumnWiseAddressing;
        // Entry 1, slot 1: rows are 24 bytes (8 key + 16 targets).
        assert_eq!(rw.slot_offset(&row, 1, 1), 24 + 8 + 8);
        // Columns: keys 24 bytes, slot 0 column 24 bytes, then entry stride.
        assert_eq!(cw.slot_offset(&col, 1, 1), 24 + 24 + 8);
        assert_eq!(rw.key_offset(&row, 2, 0), 48);
        assert_eq!(cw.key_offset(&col, 2, 0), 16);
    }
}
