//! Target-value decoding.
//!
//! Raw bytes at a computed offset become typed values here, guided by the
//! target metadata and the compile-time layout. Instead of re-branching over
//! aggregate kind × logical type × byte width for every row, each target is
//! resolved once at result-set construction into a [`BoundTarget`] carrying
//! its physical slot, read widths and a closed [`DecodeKind`] tag; per-row
//! decoding dispatches on that tag alone.

use tephra_types::sentinel::{
    inline_int_null_value, int_resize_cast, NULL_DOUBLE, NULL_FLOAT, NULL_INT,
};
use tephra_types::{Datum, DictId, ElemType, LogicalType};

use crate::addressing::addressing_for;
use crate::layout::ResultLayout;
use crate::resolver::ChunkLocation;
use crate::rowset::RowSet;
use crate::targets::{slots_for_target, AggKind, TargetInfo};
use crate::topk::decode_topk_heap;

/// Decode strategy resolved from `(agg kind, logical type category, width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    /// Integral storage: integers, booleans, date/time kinds. `sentinel_width`
    /// is the width whose reserved minimum marks null — the aggregate
    /// argument's width for SUM/MIN/MAX, the output type's otherwise.
    Int { sentinel_width: usize },
    Float32,
    Float64,
    Decimal { scale: i8 },
    DictString { dict_id: DictId },
    /// Raw string or array payload (two-slot pair, separate varlen storage
    /// or lazy fetch).
    Varlen,
    /// Two-slot (sum, count) pair.
    Avg,
    /// Slot holds a count-distinct accumulator handle.
    CountDistinct,
    /// Slot holds a quantile accumulator handle.
    Quantile,
    /// Slot holds a top-k heap (handle or inline).
    TopK,
}

/// One target's decode plan, fixed for the lifetime of the result set.
#[derive(Debug, Clone, Copy)]
pub struct BoundTarget {
    /// First physical slot.
    pub slot_idx: usize,
    /// Read width of the first slot.
    pub compact_sz1: usize,
    /// Second slot for two-slot targets (AVG count, varlen length).
    pub second_slot: Option<usize>,
    pub compact_sz2: usize,
    pub kind: DecodeKind,
    /// When set, the value aliases this group-by key slot.
    pub groupby_key_idx: Option<usize>,
}

fn resolve_decode_kind(info: &TargetInfo) -> DecodeKind {
    if info.is_distinct_target() {
        return DecodeKind::CountDistinct;
    }
    match info.agg {
        Some(AggKind::Avg) => return DecodeKind::Avg,
        Some(AggKind::TopK) => return DecodeKind::TopK,
        Some(AggKind::Quantile | AggKind::ApproxQuantile) => return DecodeKind::Quantile,
        _ => {}
    }
    match info.logical_type {
        LogicalType::Float32 => DecodeKind::Float32,
        LogicalType::Float64 => DecodeKind::Float64,
        LogicalType::Decimal { scale, .. } => DecodeKind::Decimal { scale },
        LogicalType::DictString { dict_id } => DecodeKind::DictString { dict_id },
        LogicalType::String | LogicalType::Array { .. } => DecodeKind::Varlen,
        other => DecodeKind::Int {
            sentinel_width: int_sentinel_width(info, other),
        },
    }
}

/// SUM/MIN/MAX write the null pattern of their *argument* type into the
/// slot; everything else uses the output type's width.
fn int_sentinel_width(info: &TargetInfo, output: LogicalType) -> usize {
    if matches!(info.agg, Some(AggKind::Sum | AggKind::Min | AggKind::Max)) {
        if let Some(arg) = info.agg_arg_type {
            if let Some(w) = arg.canonical_size() {
                return w;
            }
        }
    }
    output
        .canonical_size()
        .expect("integral types are fixed-width")
}

/// Resolve every target's decode plan against the layout, assigning physical
/// slots in target order.
pub(crate) fn bind_targets(
    layout: &ResultLayout,
    targets: &[TargetInfo],
    separate_varlen_valid: bool,
) -> Vec<BoundTarget> {
    // Binding happens once at construction and again if separate varlen
    // storage attaches later (varlen targets then shrink to one slot), so
    // width reads past the layout fall back to the pointer width instead of
    // asserting here; a genuinely inconsistent layout still trips the
    // offset checks on first decode.
    let width_or_pointer = |slot: usize| {
        if slot < layout.slot_count() {
            layout.padded_slot_width_bytes(slot)
        } else {
            8
        }
    };

    let mut bound = Vec::with_capacity(targets.len());
    let mut slot_idx = 0usize;
    for (target_idx, info) in targets.iter().enumerate() {
        let nslots = slots_for_target(info, separate_varlen_valid);
        let kind = resolve_decode_kind(info);

        let mut compact_sz1 = width_or_pointer(slot_idx);
        if layout.is_single_column_perfect_hash()
            && !layout.has_keyless_hash()
            && !info.is_agg()
            && slot_idx < layout.slot_count()
        {
            // Key and value share one slot there; the value occupies the
            // logical width.
            compact_sz1 = layout.logical_slot_width_bytes(slot_idx);
        }
        if kind == DecodeKind::Float32 && info.takes_float_argument() {
            // Float aggregates keep an f32 in the low half of the slot.
            compact_sz1 = 4;
        }
        if matches!(kind, DecodeKind::DictString { .. }) {
            // Dictionary ids are 32-bit regardless of slot padding.
            compact_sz1 = 4;
        }

        let (second_slot, compact_sz2) = if nslots == 2 {
            (Some(slot_idx + 1), width_or_pointer(slot_idx + 1))
        } else {
            (None, 0)
        };

        bound.push(BoundTarget {
            slot_idx,
            compact_sz1,
            second_slot,
            compact_sz2,
            kind,
            groupby_key_idx: layout.target_groupby_index(target_idx),
        });
        slot_idx += nslots;
    }
    bound
}

#[inline]
fn exp_to_scale(scale: i8) -> f64 {
    10f64.powi(scale as i32)
}

impl RowSet {
    #[inline]
    pub(crate) fn is_lazy_target(&self, target_idx: usize) -> bool {
        self.lazy_fetch
            .get(target_idx)
            .is_some_and(|l| l.is_lazily_fetched)
    }

    fn chunk_location(
        &self,
        storage_idx: usize,
        target_idx: usize,
        source_row: i64,
    ) -> ChunkLocation {
        assert!(source_row >= 0, "lazy slot must hold a source row index");
        let lf = &self.lazy_fetch[target_idx];
        let (frag_id, local) = self.frag_offsets[storage_idx].locate(source_row as u64);
        ChunkLocation {
            storage_idx,
            frag_id,
            local_col_id: lf.local_col_id,
            entry_idx: local,
        }
    }

    fn lazy_fetch_fixed(&self, storage_idx: usize, target_idx: usize, source_row: i64) -> i64 {
        let loc = self.chunk_location(storage_idx, target_idx, source_row);
        self.resolver
            .as_ref()
            .expect("lazy-fetched column without a chunk resolver")
            .fetch_fixed(loc)
    }

    /// Decode one target of one non-empty entry.
    pub(crate) fn decode_target(
        &self,
        storage_idx: usize,
        local_entry_idx: usize,
        target_idx: usize,
        translate_strings: bool,
        decimal_to_double: bool,
    ) -> Datum {
        let storage = &self.storages[storage_idx];
        let layout = &*self.layout;
        let addr = addressing_for(layout);
        let b = &self.bound[target_idx];
        let info = &self.targets[target_idx];

        // Key-aliased targets read from the key slot at effective key width.
        let (off1, width1) = match b.groupby_key_idx {
            Some(key_idx) => (
                addr.key_offset(layout, local_entry_idx, key_idx),
                layout.effective_key_width(),
            ),
            None => (
                addr.slot_offset(layout, local_entry_idx, b.slot_idx),
                b.compact_sz1,
            ),
        };
        let buff = storage.buffer();

        match b.kind {
            DecodeKind::Int { sentinel_width } => {
                let mut ival = buff.read_int(off1, width1);
                if self.is_lazy_target(target_idx) {
                    ival = self.lazy_fetch_fixed(storage_idx, target_idx, ival);
                }
                // Null is judged at the sentinel width; the value itself is
                // returned at full read width (wide aggregate slots carry
                // sums past their argument's range).
                if int_resize_cast(ival, sentinel_width) == inline_int_null_value(sentinel_width)
                {
                    Datum::Null
                } else {
                    Datum::Int(ival)
                }
            }
            DecodeKind::Float64 => {
                let v = if self.is_lazy_target(target_idx) {
                    let row = buff.read_int(off1, width1);
                    f64::from_bits(self.lazy_fetch_fixed(storage_idx, target_idx, row) as u64)
                } else {
                    debug_assert_eq!(width1, 8);
                    buff.read_f64(off1)
                };
                if v == NULL_DOUBLE {
                    Datum::Null
                } else {
                    Datum::Double(v)
                }
            }
            DecodeKind::Float32 => {
                if self.is_lazy_target(target_idx) {
                    let row = buff.read_int(off1, width1);
                    let d = f64::from_bits(
                        self.lazy_fetch_fixed(storage_idx, target_idx, row) as u64,
                    );
                    return if d == NULL_DOUBLE {
                        Datum::Null
                    } else {
                        Datum::Float(d as f32)
                    };
                }
                match width1 {
                    4 => {
                        let v = buff.read_f32(off1);
                        if v == NULL_FLOAT {
                            Datum::Null
                        } else {
                            Datum::Float(v)
                        }
                    }
                    8 => {
                        // Logical f32 stored widened to a double.
                        let d = buff.read_f64(off1);
                        if d == NULL_DOUBLE {
                            Datum::Null
                        } else {
                            Datum::Float(d as f32)
                        }
                    }
                    w => panic!("float slot of width {w}"),
                }
            }
            DecodeKind::Decimal { scale } => {
                let mut ival = buff.read_int(off1, width1);
                if self.is_lazy_target(target_idx) {
                    ival = self.lazy_fetch_fixed(storage_idx, target_idx, ival);
                }
                let is_null = ival == inline_int_null_value(width1);
                if decimal_to_double {
                    if is_null {
                        Datum::Null
                    } else {
                        Datum::Double(ival as f64 / exp_to_scale(scale))
                    }
                } else if is_null {
                    Datum::Null
                } else {
                    Datum::Int(ival)
                }
            }
            DecodeKind::DictString { dict_id } => {
                let mut ival = buff.read_int(off1, width1);
                if self.is_lazy_target(target_idx) {
                    ival = self.lazy_fetch_fixed(storage_idx, target_idx, ival);
                }
                let id = int_resize_cast(ival, 4) as i32;
                if !translate_strings {
                    return Datum::Int(id as i64);
                }
                if id == NULL_INT {
                    return Datum::Null;
                }
                let proxy = self.owner.string_dict_proxy(dict_id);
                match proxy.get_string(id) {
                    Some(s) => Datum::Str(s),
                    None => Datum::Null,
                }
            }
            DecodeKind::Varlen => self.decode_varlen(
                storage_idx,
                local_entry_idx,
                target_idx,
                off1,
                width1,
                translate_strings,
            ),
            DecodeKind::Avg => self.decode_avg(storage, local_entry_idx, target_idx, off1, width1),
            DecodeKind::CountDistinct => {
                let handle = buff.read_int(off1, width1) as u64;
                let desc = layout.count_distinct_descriptor(target_idx);
                Datum::Int(self.owner.count_distinct_cardinality(handle, desc))
            }
            DecodeKind::Quantile => {
                let handle = buff.read_int(off1, width1) as u64;
                match self.owner.quantile_compute(handle) {
                    Some(v) => Datum::Double(v),
                    None => Datum::Null,
                }
            }
            DecodeKind::TopK => {
                let LogicalType::Array { elem, .. } = info.logical_type else {
                    panic!("top-k target must be array-typed")
                };
                let heap: Vec<u8> = if info.topk_inline_buffer {
                    buff.bytes_at(off1, width1).to_vec()
                } else {
                    let handle = buff.read_int(off1, width1) as u64;
                    if handle == 0 {
                        return Datum::Null;
                    }
                    self.owner.topk_heap(handle).to_vec()
                };
                Datum::Array(decode_topk_heap(&heap, elem, info.topk_param))
            }
        }
    }

    /// AVG reads its (sum, count) pair; the sum slot's null pattern wins,
    /// and a zero count reports null rather than dividing.
    fn decode_avg(
        &self,
        storage: &crate::storage::ResultStorage,
        local_entry_idx: usize,
        target_idx: usize,
        off1: usize,
        width1: usize,
    ) -> Datum {
        let layout = &*self.layout;
        let addr = addressing_for(layout);
        let b = &self.bound[target_idx];
        let info = &self.targets[target_idx];
        let buff = storage.buffer();

        let second_slot = b.second_slot.expect("AVG requires a count slot");
        let off2 = addr.slot_offset(layout, local_entry_idx, second_slot);
        let count = buff.read_int(off2, b.compact_sz2);

        let arg = info
            .agg_arg_type
            .expect("AVG requires an argument type");
        let (sum, sum_is_null) = match arg {
            LogicalType::Float32 => {
                // Float argument input reads an f32 regardless of padding.
                let v = buff.read_f32(off1);
                (v as f64, v == NULL_FLOAT)
            }
            LogicalType::Float64 => {
                let v = buff.read_f64(off1);
                (v, v == NULL_DOUBLE)
            }
            LogicalType::Decimal { scale, .. } => {
                let i = buff.read_int(off1, width1);
                (
                    i as f64 / exp_to_scale(scale),
                    i == inline_int_null_value(width1),
                )
            }
            _ => {
                let i = buff.read_int(off1, width1);
                (i as f64, i == inline_int_null_value(width1))
            }
        };

        if sum_is_null || count == 0 {
            Datum::Null
        } else {
            Datum::Double(sum / count as f64)
        }
    }

    /// Raw strings and arrays resolve in priority order: lazy fetch, then
    /// the separate varlen buffer, then the inline (handle, length) pair.
    fn decode_varlen(
        &self,
        storage_idx: usize,
        local_entry_idx: usize,
        target_idx: usize,
        off1: usize,
        width1: usize,
        translate_strings: bool,
    ) -> Datum {
        let storage = &self.storages[storage_idx];
        let info = &self.targets[target_idx];
        let buff = storage.buffer();
        let ival = buff.read_int(off1, width1);

        if self.is_lazy_target(target_idx) {
            let loc = self.chunk_location(storage_idx, target_idx, ival);
            let fetched = self
                .resolver
                .as_ref()
                .expect("lazy-fetched column without a chunk resolver")
                .fetch_varlen(loc);
            return match fetched {
                None => Datum::Null,
                Some(bytes) => {
                    if info.logical_type == LogicalType::String {
                        // Intern so the decoded value shares the result
                        // set's lifetime like every other string.
                        let handle = self.owner.add_string(&String::from_utf8_lossy(&bytes));
                        Datum::Str(self.owner.string(handle))
                    } else {
                        self.build_varlen_datum(info, &bytes, translate_strings)
                    }
                }
            };
        }

        if let Some(separate) = &self.separate_varlen {
            if !info.is_agg() {
                if ival < 0 {
                    debug_assert_eq!(ival, -1, "varlen index sentinel must be -1");
                    return Datum::Null;
                }
                let buffer_for_storage = &separate[storage_idx];
                let payload = &buffer_for_storage[ival as usize];
                return self.build_varlen_datum(info, payload, translate_strings);
            }
        }

        let handle = ival as u64;
        if handle == 0 {
            return Datum::Null;
        }
        if let Some(slot) = self.bound[target_idx].second_slot {
            // Length slot is read for its side of the contract even though
            // the arena payload carries its own extent.
            let addr = addressing_for(&self.layout);
            let off2 = addr.slot_offset(&self.layout, local_entry_idx, slot);
            let len = buff.read_int(off2, self.bound[target_idx].compact_sz2);
            debug_assert!(len >= 0, "negative varlen length");
        }
        let payload = self.owner.varlen(handle);
        self.build_varlen_datum(info, &payload, translate_strings)
    }

    fn build_varlen_datum(
        &self,
        info: &TargetInfo,
        bytes: &[u8],
        translate_strings: bool,
    ) -> Datum {
        match info.logical_type {
            LogicalType::String => Datum::Str(String::from_utf8_lossy(bytes).into()),
            LogicalType::Array { elem, fixed_elems } => {
                // Zero bytes for a fixed-length array is the null encoding.
                if fixed_elems.is_some() && bytes.is_empty() {
                    return Datum::Null;
                }
                Datum::Array(self.build_array_elems(elem, bytes, translate_strings))
            }
            other => panic!("varlen decode over fixed-width type {other:?}"),
        }
    }

    fn build_array_elems(
        &self,
        elem: ElemType,
        bytes: &[u8],
        translate_strings: bool,
    ) -> Vec<Datum> {
        let sz = elem.size();
        assert_eq!(bytes.len() % sz, 0, "array payload not a whole element run");
        let n = bytes.len() / sz;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let b = &bytes[i * sz..(i + 1) * sz];
            let datum = match elem {
                ElemType::Int8 => Datum::Int(b[0] as i8 as i64),
                ElemType::Int16 => Datum::Int(i16::from_le_bytes([b[0], b[1]]) as i64),
                ElemType::Int32 => {
                    Datum::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
                }
                ElemType::Int64 => Datum::Int(i64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ])),
                ElemType::Float32 => Datum::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                ElemType::Float64 => Datum::Double(f64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ])),
                ElemType::DictString { dict_id } => {
                    let id = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    if translate_strings {
                        if id == NULL_INT {
                            Datum::Null
                        } else {
                            match self.owner.string_dict_proxy(dict_id).get_string(id) {
                                Some(s) => Datum::Str(s),
                                None => Datum::Null,
                            }
                        }
                    } else {
                        Datum::Int(id as i64)
                    }
                }
            };
            out.push(datum);
        }
        out
    }
}
