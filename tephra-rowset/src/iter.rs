//! Row iteration.
//!
//! Two protocols share one advance routine: the mutex-guarded `get_next_row`
//! convenience cursor on the result set itself, and [`RowIterator`], an
//! owned cursor implementing [`Iterator`]. Both skip empty entries, honor
//! the permutation, drop the first `drop_first` non-empty rows without
//! materializing them, and exhaust after `keep_first` returned rows.

use tephra_types::Datum;

use crate::rowset::{CursorState, RowSet};

impl RowSet {
    /// Advance `st` to the next materializable entry, returning its global
    /// entry index, or `None` once the cursor is exhausted.
    pub(crate) fn advance_cursor(&self, st: &mut CursorState) -> Option<usize> {
        loop {
            if self.keep_first > 0 && st.fetched_so_far >= self.drop_first + self.keep_first {
                return None;
            }
            let mut found = None;
            while st.crt_row_buff_idx < self.entry_count() {
                let entry_idx = self.permuted_entry(st.crt_row_buff_idx);
                let (storage_idx, local_idx) = self.find_storage(entry_idx);
                if !self.storages[storage_idx].is_empty_entry(local_idx) {
                    found = Some(entry_idx);
                    break;
                }
                st.crt_row_buff_idx += 1;
            }
            let entry_idx = found?;
            st.crt_row_buff_idx += 1;
            st.fetched_so_far += 1;
            if st.fetched_so_far <= self.drop_first {
                continue;
            }
            return Some(entry_idx);
        }
    }

    /// Return the next row through the shared cursor, translating strings
    /// and keeping decimals scaled. `None` once exhausted.
    pub fn get_next_row(&self) -> Option<Vec<Datum>> {
        self.get_next_row_opts(true, false)
    }

    /// Shared-cursor row fetch with explicit translation flags.
    ///
    /// Single-reader protocol: the cursor sits behind a mutex, so concurrent
    /// callers are safe but interleave their reads.
    pub fn get_next_row_opts(
        &self,
        translate_strings: bool,
        decimal_to_double: bool,
    ) -> Option<Vec<Datum>> {
        let mut cursor = self.cursor.lock().expect("row cursor poisoned");
        let entry_idx = self.advance_cursor(&mut cursor)?;
        drop(cursor);
        let row = self.row_at_entry(entry_idx, translate_strings, decimal_to_double, &[]);
        debug_assert!(row.is_some(), "cursor advanced onto an empty entry");
        row
    }

    /// Rewind the shared cursor to the first row.
    pub fn move_to_begin(&self) {
        let mut cursor = self.cursor.lock().expect("row cursor poisoned");
        *cursor = CursorState::default();
    }

    /// An owned sequential cursor over the result set.
    pub fn row_iter(&self, translate_strings: bool, decimal_to_double: bool) -> RowIterator<'_> {
        RowIterator {
            rowset: self,
            state: CursorState::default(),
            translate_strings,
            decimal_to_double,
        }
    }
}

/// Owned sequential cursor. Each iterator tracks its own position, so any
/// number can walk the same result set independently.
pub struct RowIterator<'a> {
    rowset: &'a RowSet,
    state: CursorState,
    translate_strings: bool,
    decimal_to_double: bool,
}

impl Iterator for RowIterator<'_> {
    type Item = Vec<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry_idx = self.rowset.advance_cursor(&mut self.state)?;
        self.rowset.row_at_entry(
            entry_idx,
            self.translate_strings,
            self.decimal_to_double,
            &[],
        )
    }
}
