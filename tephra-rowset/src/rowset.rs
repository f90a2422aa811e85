//! The result set: partitions, permutation, window and cursor state.
//!
//! A [`RowSet`] owns zero or more filled storage partitions, the ordered
//! target metadata shared by all of them, an optional permutation realizing
//! ORDER BY, and an optional `drop_first`/`keep_first` window realizing
//! OFFSET/LIMIT. Random-access reads (`get_row_at`) are safe from any number
//! of threads once the fill phase is over; the convenience `get_next_row`
//! protocol shares one mutex-guarded cursor.

use std::sync::{Arc, Mutex, OnceLock};

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tephra_result::{Error, Result};
use tephra_types::sentinel::{inline_int_null_value, int_resize_cast, NULL_INT};
use tephra_types::{Datum, LogicalType};

use crate::decode::{bind_targets, BoundTarget, DecodeKind};
use crate::layout::{QueryDescription, ResultLayout};
use crate::owner::RowSetMemoryOwner;
use crate::resolver::{ChunkResolver, FragmentOffsets, LazyFetchInfo};
use crate::storage::ResultStorage;
use crate::targets::TargetInfo;
use tephra_threading::split_ranges;

/// Entry counts above this are counted with the worker pool.
const PARALLEL_COUNT_THRESHOLD: usize = 20_000;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CursorState {
    pub(crate) crt_row_buff_idx: usize,
    pub(crate) fetched_so_far: usize,
}

/// One query's result set.
pub struct RowSet {
    pub(crate) layout: Arc<ResultLayout>,
    pub(crate) targets: Vec<TargetInfo>,
    pub(crate) bound: Vec<BoundTarget>,
    pub(crate) storages: Vec<ResultStorage>,
    pub(crate) owner: Arc<RowSetMemoryOwner>,
    pub(crate) permutation: Vec<u32>,
    pub(crate) drop_first: usize,
    pub(crate) keep_first: usize,
    /// Per-storage list of variable-length payloads, indexed by slot value.
    pub(crate) separate_varlen: Option<Vec<Vec<Vec<u8>>>>,
    pub(crate) lazy_fetch: Vec<LazyFetchInfo>,
    pub(crate) frag_offsets: Vec<FragmentOffsets>,
    pub(crate) resolver: Option<Arc<dyn ChunkResolver>>,
    pub(crate) cursor: Mutex<CursorState>,
    cached_row_count: OnceLock<usize>,
}

impl RowSet {
    pub fn new(
        layout: Arc<ResultLayout>,
        targets: Vec<TargetInfo>,
        owner: Arc<RowSetMemoryOwner>,
    ) -> Self {
        let bound = bind_targets(&layout, &targets, false);
        Self {
            layout,
            targets,
            bound,
            storages: Vec::new(),
            owner,
            permutation: Vec::new(),
            drop_first: 0,
            keep_first: 0,
            separate_varlen: None,
            lazy_fetch: Vec::new(),
            frag_offsets: Vec::new(),
            resolver: None,
            cursor: Mutex::new(CursorState::default()),
            cached_row_count: OnceLock::new(),
        }
    }

    // --- construction ----------------------------------------------------

    /// Append a storage partition (the base partition first, then one per
    /// producer shard) and return its index.
    pub fn add_storage(&mut self) -> Result<usize> {
        self.storages
            .push(ResultStorage::new(self.layout.clone())?);
        self.invalidate_row_count();
        Ok(self.storages.len() - 1)
    }

    pub fn storage(&self, idx: usize) -> &ResultStorage {
        &self.storages[idx]
    }

    /// Fill-phase access to a partition. Callers must not hold rows or
    /// iterators across this.
    pub fn storage_mut(&mut self, idx: usize) -> &mut ResultStorage {
        self.invalidate_row_count();
        &mut self.storages[idx]
    }

    pub fn storage_count(&self) -> usize {
        self.storages.len()
    }

    /// Install a permutation over logical entries (ORDER BY without
    /// physical reordering). Every index must address an existing entry.
    pub fn set_permutation(&mut self, permutation: Vec<u32>) -> Result<()> {
        let total = self.total_storage_entries();
        if let Some(&bad) = permutation.iter().find(|&&idx| idx as usize >= total) {
            return Err(Error::InvalidArgumentError(format!(
                "permutation entry {bad} outside {total} storage entries"
            )));
        }
        self.permutation = permutation;
        self.invalidate_row_count();
        Ok(())
    }

    /// Configure the OFFSET/LIMIT window: skip the first `drop_first`
    /// non-empty rows, return at most `keep_first` rows after that
    /// (`keep_first == 0` means unlimited).
    pub fn set_window(&mut self, drop_first: usize, keep_first: usize) {
        self.drop_first = drop_first;
        self.keep_first = keep_first;
        self.invalidate_row_count();
    }

    /// Attach per-storage separate varlen buffers; non-aggregate varlen
    /// slots then hold indexes into them (−1 for null).
    pub fn set_separate_varlen_storage(&mut self, buffers: Vec<Vec<Vec<u8>>>) {
        assert_eq!(
            buffers.len(),
            self.storages.len(),
            "one varlen buffer per storage partition"
        );
        self.separate_varlen = Some(buffers);
        self.bound = bind_targets(&self.layout, &self.targets, true);
    }

    /// Mark columns as lazily fetched and install the chunk resolver plus
    /// per-storage fragment geometry used to locate source rows.
    pub fn set_lazy_fetch(
        &mut self,
        info: Vec<LazyFetchInfo>,
        frag_offsets: Vec<FragmentOffsets>,
        resolver: Arc<dyn ChunkResolver>,
    ) {
        assert_eq!(info.len(), self.targets.len());
        self.lazy_fetch = info;
        self.frag_offsets = frag_offsets;
        self.resolver = Some(resolver);
    }

    fn invalidate_row_count(&mut self) {
        self.cached_row_count = OnceLock::new();
    }

    // --- shape accessors -------------------------------------------------

    #[inline]
    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    #[inline]
    pub fn owner(&self) -> &Arc<RowSetMemoryOwner> {
        &self.owner
    }

    #[inline]
    pub fn targets(&self) -> &[TargetInfo] {
        &self.targets
    }

    #[inline]
    pub fn bound_targets(&self) -> &[BoundTarget] {
        &self.bound
    }

    #[inline]
    pub fn col_count(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn col_type(&self, col_idx: usize) -> LogicalType {
        self.targets[col_idx].logical_type
    }

    /// Physical entries across all partitions.
    #[inline]
    pub fn total_storage_entries(&self) -> usize {
        self.storages.len() * self.layout.entry_count()
    }

    /// Logical entries: the permutation length when one is installed,
    /// otherwise every physical entry.
    #[inline]
    pub fn entry_count(&self) -> usize {
        if self.permutation.is_empty() {
            self.total_storage_entries()
        } else {
            self.permutation.len()
        }
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.drop_first > 0 || self.keep_first > 0
    }

    #[inline]
    pub(crate) fn permuted_entry(&self, logical_idx: usize) -> usize {
        if self.permutation.is_empty() {
            logical_idx
        } else {
            self.permutation[logical_idx] as usize
        }
    }

    /// Locate the partition owning a global entry index. Partitions cover
    /// consecutive equal-sized ranges, so this is O(1) arithmetic.
    #[inline]
    pub(crate) fn find_storage(&self, global_entry_idx: usize) -> (usize, usize) {
        let per = self.layout.entry_count();
        let storage_idx = global_entry_idx / per;
        debug_assert!(storage_idx < self.storages.len(), "entry outside storage");
        (storage_idx, global_entry_idx % per)
    }

    // --- row access ------------------------------------------------------

    /// True when the logical entry holds no row.
    pub fn is_row_at_empty(&self, logical_idx: usize) -> bool {
        if logical_idx >= self.entry_count() {
            return true;
        }
        let entry_idx = self.permuted_entry(logical_idx);
        let (storage_idx, local_idx) = self.find_storage(entry_idx);
        self.storages[storage_idx].is_empty_entry(local_idx)
    }

    /// Materialize the row at `logical_idx` with string translation on and
    /// decimals kept scaled. `None` for empty or out-of-range entries.
    pub fn get_row_at(&self, logical_idx: usize) -> Option<Vec<Datum>> {
        self.get_row_at_opts(logical_idx, true, false, &[])
    }

    /// Row materialization with explicit translation flags and an optional
    /// per-target skip mask. Skipped targets yield `Datum::Null`
    /// placeholders without being decoded; the mask never changes which
    /// rows exist.
    pub fn get_row_at_opts(
        &self,
        logical_idx: usize,
        translate_strings: bool,
        decimal_to_double: bool,
        targets_to_skip: &[bool],
    ) -> Option<Vec<Datum>> {
        if logical_idx >= self.entry_count() {
            return None;
        }
        let entry_idx = self.permuted_entry(logical_idx);
        self.row_at_entry(entry_idx, translate_strings, decimal_to_double, targets_to_skip)
    }

    pub(crate) fn row_at_entry(
        &self,
        global_entry_idx: usize,
        translate_strings: bool,
        decimal_to_double: bool,
        targets_to_skip: &[bool],
    ) -> Option<Vec<Datum>> {
        let (storage_idx, local_idx) = self.find_storage(global_entry_idx);
        if self.storages[storage_idx].is_empty_entry(local_idx) {
            return None;
        }
        let mut row = Vec::with_capacity(self.targets.len());
        for target_idx in 0..self.targets.len() {
            if targets_to_skip.get(target_idx).copied().unwrap_or(false) {
                row.push(Datum::Null);
                continue;
            }
            row.push(self.decode_target(
                storage_idx,
                local_idx,
                target_idx,
                translate_strings,
                decimal_to_double,
            ));
        }
        Some(row)
    }

    /// Decode one target of one non-empty global entry. Bulk converters use
    /// this to materialize a single column without paying for whole rows;
    /// the caller must already know the entry is non-empty.
    pub fn value_at_entry(
        &self,
        global_entry_idx: usize,
        target_idx: usize,
        translate_strings: bool,
        decimal_to_double: bool,
    ) -> Datum {
        let (storage_idx, local_idx) = self.find_storage(global_entry_idx);
        debug_assert!(
            !self.storages[storage_idx].is_empty_entry(local_idx),
            "value requested from an empty entry"
        );
        self.decode_target(
            storage_idx,
            local_idx,
            target_idx,
            translate_strings,
            decimal_to_double,
        )
    }

    /// Fast path for single-int-column row-wise results: the first target's
    /// integer (the null sentinel when null), or `None` for an empty entry.
    pub fn get_one_col_row(&self, global_entry_idx: usize) -> Option<i64> {
        assert!(
            !self.layout.is_columnar(),
            "one-col fast path is row-wise only"
        );
        let (storage_idx, local_idx) = self.find_storage(global_entry_idx);
        if self.storages[storage_idx].is_empty_entry(local_idx) {
            return None;
        }
        match self.decode_target(storage_idx, local_idx, 0, false, false) {
            Datum::Int(v) => Some(v),
            Datum::Null => {
                let width = self.targets[0]
                    .logical_type
                    .canonical_size()
                    .expect("one-col fast path requires a fixed-width target");
                Some(inline_int_null_value(width))
            }
            other => panic!("one-col fast path over non-integer target: {other:?}"),
        }
    }

    // --- counting --------------------------------------------------------

    /// Number of rows the result yields, honoring the window. Cached after
    /// the first call; partitions are immutable by then.
    pub fn row_count(&self) -> usize {
        *self.cached_row_count.get_or_init(|| {
            let non_empty = self.count_non_empty();
            let after_drop = non_empty.saturating_sub(self.drop_first);
            if self.keep_first > 0 {
                after_drop.min(self.keep_first)
            } else {
                after_drop
            }
        })
    }

    fn count_non_empty(&self) -> usize {
        let total = self.entry_count();
        if total >= PARALLEL_COUNT_THRESHOLD {
            split_ranges(total, tephra_threading::current_thread_count())
                .into_par_iter()
                .map(|range| range.filter(|&i| !self.entry_is_empty_logical(i)).count())
                .sum()
        } else {
            (0..total)
                .filter(|&i| !self.entry_is_empty_logical(i))
                .count()
        }
    }

    #[inline]
    fn entry_is_empty_logical(&self, logical_idx: usize) -> bool {
        let entry_idx = self.permuted_entry(logical_idx);
        let (storage_idx, local_idx) = self.find_storage(entry_idx);
        self.storages[storage_idx].is_empty_entry(local_idx)
    }

    /// Global entry indices of every materialized row, in logical order,
    /// honoring permutation and window. Computed sequentially — the logical
    /// row count up to the offset cannot be known without counting.
    pub fn materialized_entries(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut skipped = 0usize;
        for logical_idx in 0..self.entry_count() {
            if self.keep_first > 0 && out.len() == self.keep_first {
                break;
            }
            let entry_idx = self.permuted_entry(logical_idx);
            let (storage_idx, local_idx) = self.find_storage(entry_idx);
            if self.storages[storage_idx].is_empty_entry(local_idx) {
                continue;
            }
            if skipped < self.drop_first {
                skipped += 1;
                continue;
            }
            out.push(entry_idx);
        }
        out
    }

    // --- count-distinct fixup --------------------------------------------

    /// Rewrite count-distinct slot handles through each partition's remap
    /// table (a cross-device merge leaves remote handles behind). Unmapped
    /// handles get a fresh zero-filled accumulator. Must run single-threaded
    /// before any concurrent read of those slots.
    pub fn fixup_count_distinct_handles(&mut self) {
        let distinct_slots: Vec<(usize, usize)> = self
            .bound
            .iter()
            .enumerate()
            .filter(|(_, b)| matches!(b.kind, DecodeKind::CountDistinct))
            .map(|(target_idx, b)| (target_idx, b.slot_idx))
            .collect();
        if distinct_slots.is_empty() {
            return;
        }
        tracing::debug!(
            targets = distinct_slots.len(),
            storages = self.storages.len(),
            "fixing up count-distinct handles"
        );
        let entry_count = self.layout.entry_count();
        for storage in &mut self.storages {
            for entry_idx in 0..entry_count {
                for &(target_idx, slot_idx) in &distinct_slots {
                    let remote = storage.read_slot_int(entry_idx, slot_idx) as u64;
                    if remote == 0 {
                        continue;
                    }
                    let local = match storage.mapped_handle(remote) {
                        Some(local) => local,
                        None => {
                            let desc = self.layout.count_distinct_descriptor(target_idx);
                            self.owner.allocate_count_distinct_buffer(desc)
                        }
                    };
                    storage.overwrite_slot_int(entry_idx, slot_idx, local as i64);
                }
            }
        }
    }

    // --- dictionary support ----------------------------------------------

    /// Distinct dictionary ids actually referenced by the target, in
    /// first-seen row order, with their strings. Nulls are excluded.
    /// Transient ids are included — they resolve through the proxy like any
    /// other id.
    pub fn unique_strings_for_dict_target(
        &self,
        target_idx: usize,
    ) -> (Vec<i32>, Vec<Arc<str>>) {
        let LogicalType::DictString { dict_id } = self.targets[target_idx].logical_type else {
            panic!("target {target_idx} is not dictionary-encoded")
        };
        let proxy = self.owner.string_dict_proxy(dict_id);
        let mut seen = FxHashSet::default();
        let mut ids = Vec::new();
        let mut strings = Vec::new();
        for entry_idx in self.materialized_entries() {
            let (storage_idx, local_idx) = self.find_storage(entry_idx);
            let datum = self.decode_target(storage_idx, local_idx, target_idx, false, false);
            let Some(raw) = datum.as_int() else { continue };
            let id = int_resize_cast(raw, 4) as i32;
            if id == NULL_INT || !seen.insert(id) {
                continue;
            }
            ids.push(id);
            strings.push(
                proxy
                    .get_string(id)
                    .unwrap_or_else(|| panic!("dict {dict_id} has no entry for id {id}")),
            );
        }
        (ids, strings)
    }

    // --- direct columnar access ------------------------------------------

    /// True when the target's column bytes can be handed out without any
    /// copy: single partition, column-major projection, identity order, no
    /// window, no lazy fetch, and a slot stored at its logical width.
    pub fn is_zero_copy_columnar_conversion_possible(&self, target_idx: usize) -> bool {
        self.is_direct_columnar_target(target_idx) && self.storages.len() == 1
    }

    /// Shared eligibility for direct columnar extraction (zero-copy or
    /// chunked copy).
    pub fn is_direct_columnar_target(&self, target_idx: usize) -> bool {
        if self.layout.query_type() != QueryDescription::Projection
            || !self.layout.is_columnar()
            || !self.permutation.is_empty()
            || self.is_truncated()
        {
            return false;
        }
        if self
            .lazy_fetch
            .get(target_idx)
            .is_some_and(|l| l.is_lazily_fetched)
        {
            return false;
        }
        let b = &self.bound[target_idx];
        if b.second_slot.is_some() || b.groupby_key_idx.is_some() {
            return false;
        }
        let info = &self.targets[target_idx];
        let Some(canonical) = info.logical_type.canonical_size() else {
            return false;
        };
        self.layout.padded_slot_width_bytes(b.slot_idx) == canonical
    }

    /// Borrow the column's bytes from the single partition.
    pub fn columnar_buffer(&self, target_idx: usize) -> &[u8] {
        assert!(self.is_zero_copy_columnar_conversion_possible(target_idx));
        let b = &self.bound[target_idx];
        let width = self.layout.padded_slot_width_bytes(b.slot_idx);
        let off = self.layout.col_off_in_bytes(b.slot_idx);
        self.storages[0]
            .buffer()
            .bytes_at(off, width * self.layout.entry_count())
    }

    /// Copy the column's bytes from every partition, in partition order,
    /// into `out`.
    pub fn copy_column_into_buffer(&self, target_idx: usize, out: &mut [u8]) {
        assert!(self.is_direct_columnar_target(target_idx));
        let b = &self.bound[target_idx];
        let width = self.layout.padded_slot_width_bytes(b.slot_idx);
        let off = self.layout.col_off_in_bytes(b.slot_idx);
        let chunk = width * self.layout.entry_count();
        assert!(out.len() >= chunk * self.storages.len(), "output too small");
        for (i, storage) in self.storages.iter().enumerate() {
            out[i * chunk..(i + 1) * chunk]
                .copy_from_slice(storage.buffer().bytes_at(off, chunk));
        }
    }
}
