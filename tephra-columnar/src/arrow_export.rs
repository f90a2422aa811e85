//! Arrow array assembly and dictionary export.
//!
//! The fallback conversion path lands here: one typed Arrow builder per
//! segment, fed from the row-set decoding engine. Dictionary-encoded string
//! columns additionally remap their internal (possibly transient, negative)
//! ids to dense positions in the exported dictionary.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Decimal128Array, DictionaryArray, Float32Builder,
    Float64Builder, Int16Builder, Int32Array, Int32Builder, Int64Builder, Int8Builder,
    ListBuilder, StringArray, StringBuilder, Time32SecondBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Int32Type, TimeUnit};
use rustc_hash::FxHashMap;
use tephra_result::{Error, Result};
use tephra_rowset::{RowSet, StringDictProxy};
use tephra_types::sentinel::NULL_INT;
use tephra_types::{Datum, ElemType, LogicalType};

use crate::options::ConvertOptions;

const SECONDS_PER_DAY: i64 = 86_400;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Arrow type a logical output type exports as.
pub fn arrow_data_type(ty: LogicalType) -> DataType {
    match ty {
        LogicalType::Boolean => DataType::Boolean,
        LogicalType::Int8 => DataType::Int8,
        LogicalType::Int16 => DataType::Int16,
        LogicalType::Int32 => DataType::Int32,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::Float32 => DataType::Float32,
        LogicalType::Float64 => DataType::Float64,
        LogicalType::Decimal { precision, scale } => DataType::Decimal128(precision, scale),
        LogicalType::Date => DataType::Date32,
        LogicalType::Time => DataType::Time32(TimeUnit::Second),
        LogicalType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
        LogicalType::String => DataType::Utf8,
        LogicalType::DictString { .. } => {
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
        }
        LogicalType::Array { elem, .. } => {
            DataType::List(Arc::new(Field::new("item", elem_data_type(elem), true)))
        }
    }
}

fn elem_data_type(elem: ElemType) -> DataType {
    match elem {
        ElemType::Int8 => DataType::Int8,
        ElemType::Int16 => DataType::Int16,
        ElemType::Int32 => DataType::Int32,
        ElemType::Int64 => DataType::Int64,
        ElemType::Float32 => DataType::Float32,
        ElemType::Float64 => DataType::Float64,
        // Dictionary elements export translated.
        ElemType::DictString { .. } => DataType::Utf8,
    }
}

macro_rules! int_segment {
    ($builder:expr, $rowset:expr, $target_idx:expr, $entries:expr, $native:ty) => {{
        let mut builder = $builder;
        for &entry in $entries {
            match $rowset.value_at_entry(entry, $target_idx, false, false) {
                Datum::Null => builder.append_null(),
                Datum::Int(v) => builder.append_value(v as $native),
                other => panic!("integer column decoded {other:?}"),
            }
        }
        Ok(Arc::new(builder.finish()) as ArrayRef)
    }};
}

macro_rules! list_int_segment {
    ($child:expr, $rowset:expr, $target_idx:expr, $entries:expr, $native:ty) => {{
        let mut builder = ListBuilder::new($child);
        for &entry in $entries {
            match $rowset.value_at_entry(entry, $target_idx, true, false) {
                Datum::Null => builder.append_null(),
                Datum::Array(vals) => {
                    for v in vals {
                        match v {
                            Datum::Null => builder.values().append_null(),
                            Datum::Int(i) => builder.values().append_value(i as $native),
                            other => panic!("integer array element decoded {other:?}"),
                        }
                    }
                    builder.append(true);
                }
                other => panic!("array column decoded {other:?}"),
            }
        }
        Ok(Arc::new(builder.finish()) as ArrayRef)
    }};
}

/// Decode `entries` of one column into a typed Arrow array.
pub(crate) fn build_segment_array(
    rowset: &RowSet,
    target_idx: usize,
    entries: &[usize],
) -> Result<ArrayRef> {
    match rowset.col_type(target_idx) {
        LogicalType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Int(v) => builder.append_value(v != 0),
                    other => panic!("boolean column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::Int8 => {
            int_segment!(Int8Builder::with_capacity(entries.len()), rowset, target_idx, entries, i8)
        }
        LogicalType::Int16 => {
            int_segment!(Int16Builder::with_capacity(entries.len()), rowset, target_idx, entries, i16)
        }
        LogicalType::Int32 => {
            int_segment!(Int32Builder::with_capacity(entries.len()), rowset, target_idx, entries, i32)
        }
        LogicalType::Int64 => {
            int_segment!(Int64Builder::with_capacity(entries.len()), rowset, target_idx, entries, i64)
        }
        LogicalType::Float32 => {
            let mut builder = Float32Builder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Float(v) => builder.append_value(v),
                    other => panic!("float column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::Float64 => {
            let mut builder = Float64Builder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Double(v) => builder.append_value(v),
                    other => panic!("double column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::Decimal { precision, scale } => {
            let vals: Vec<Option<i128>> = entries
                .iter()
                .map(
                    |&entry| match rowset.value_at_entry(entry, target_idx, false, false) {
                        Datum::Null => None,
                        Datum::Int(v) => Some(v as i128),
                        other => panic!("decimal column decoded {other:?}"),
                    },
                )
                .collect();
            let array = vals
                .into_iter()
                .collect::<Decimal128Array>()
                .with_precision_and_scale(precision, scale)
                .map_err(Error::Arrow)?;
            Ok(Arc::new(array))
        }
        LogicalType::Date => {
            let mut builder = Date32Builder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Int(secs) => {
                        builder.append_value(secs.div_euclid(SECONDS_PER_DAY) as i32)
                    }
                    other => panic!("date column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::Time => {
            let mut builder = Time32SecondBuilder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Int(secs) => builder.append_value(secs as i32),
                    other => panic!("time column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::Timestamp => {
            let mut builder = TimestampMillisecondBuilder::with_capacity(entries.len());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, false, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Int(secs) => builder.append_value(secs * MILLIS_PER_SECOND),
                    other => panic!("timestamp column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::String => {
            let mut builder = StringBuilder::new();
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, true, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Str(s) => builder.append_value(s.as_ref()),
                    other => panic!("string column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        LogicalType::DictString { .. } => {
            unreachable!("dictionary columns convert through the dictionary export path")
        }
        LogicalType::Array { elem, .. } => build_list_segment(rowset, target_idx, entries, elem),
    }
}

fn build_list_segment(
    rowset: &RowSet,
    target_idx: usize,
    entries: &[usize],
    elem: ElemType,
) -> Result<ArrayRef> {
    match elem {
        ElemType::Int8 => list_int_segment!(Int8Builder::new(), rowset, target_idx, entries, i8),
        ElemType::Int16 => {
            list_int_segment!(Int16Builder::new(), rowset, target_idx, entries, i16)
        }
        ElemType::Int32 => {
            list_int_segment!(Int32Builder::new(), rowset, target_idx, entries, i32)
        }
        ElemType::Int64 => {
            list_int_segment!(Int64Builder::new(), rowset, target_idx, entries, i64)
        }
        ElemType::Float32 => {
            let mut builder = ListBuilder::new(Float32Builder::new());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, true, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Array(vals) => {
                        for v in vals {
                            match v {
                                Datum::Null => builder.values().append_null(),
                                Datum::Float(f) => builder.values().append_value(f),
                                other => panic!("float array element decoded {other:?}"),
                            }
                        }
                        builder.append(true);
                    }
                    other => panic!("array column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        ElemType::Float64 => {
            let mut builder = ListBuilder::new(Float64Builder::new());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, true, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Array(vals) => {
                        for v in vals {
                            match v {
                                Datum::Null => builder.values().append_null(),
                                Datum::Double(d) => builder.values().append_value(d),
                                other => panic!("double array element decoded {other:?}"),
                            }
                        }
                        builder.append(true);
                    }
                    other => panic!("array column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        ElemType::DictString { .. } => {
            let mut builder = ListBuilder::new(StringBuilder::new());
            for &entry in entries {
                match rowset.value_at_entry(entry, target_idx, true, false) {
                    Datum::Null => builder.append_null(),
                    Datum::Array(vals) => {
                        for v in vals {
                            match v {
                                Datum::Null => builder.values().append_null(),
                                Datum::Str(s) => builder.values().append_value(s.as_ref()),
                                other => panic!("string array element decoded {other:?}"),
                            }
                        }
                        builder.append(true);
                    }
                    other => panic!("array column decoded {other:?}"),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
    }
}

/// How exported dictionary keys relate to internal ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictRemapMode {
    /// The backing dictionary was bulk-copied; only transient (negative)
    /// ids were rewritten.
    OnlyTransientsRemapped,
    /// Only referenced ids were exported; every id was rewritten to its
    /// dense position.
    AllRemapped,
}

/// A converted dictionary column plus the id-remap table applied to it.
pub struct DictionaryExport {
    pub array: ArrayRef,
    pub remap: FxHashMap<i32, i32>,
    pub mode: DictRemapMode,
}

/// Convert a dictionary-encoded string column, remapping internal ids to
/// dense exported positions.
///
/// Bulk-copying the whole backing dictionary is cheaper per string but can
/// dwarf the result; it is chosen only for large results whose dictionary
/// is small relative to the row count. Everything else plucks the distinct
/// ids actually referenced.
pub(crate) fn convert_dict_column(
    rowset: &RowSet,
    options: &ConvertOptions,
    target_idx: usize,
    entries: &[usize],
) -> Result<(ArrayRef, FxHashMap<i32, i32>, DictRemapMode)> {
    let LogicalType::DictString { dict_id } = rowset.col_type(target_idx) else {
        panic!("target {target_idx} is not dictionary-encoded")
    };
    let ids: Vec<i32> = entries
        .iter()
        .map(
            |&entry| match rowset.value_at_entry(entry, target_idx, false, false) {
                Datum::Int(v) => v as i32,
                other => panic!("dictionary column decoded {other:?}"),
            },
        )
        .collect();
    let rows = ids.len();
    let proxy = rowset.owner().string_dict_proxy(dict_id);
    let ratio = proxy.entry_count() as f64 / rows.max(1) as f64;
    let bulk = rows > options.min_result_rows_for_bulk_dictionary_fetch
        && ratio <= options.max_dictionary_to_result_ratio_for_bulk_fetch;
    tracing::debug!(dict_id, rows, ratio, bulk, "dictionary export");

    let mut remap: FxHashMap<i32, i32> = FxHashMap::default();
    let (values, keys, mode) = if bulk {
        let mut values: Vec<Arc<str>> = proxy.entries().to_vec();
        for (idx, s) in proxy.transient_entries().into_iter().enumerate() {
            let old_id = StringDictProxy::transient_index_to_id(idx);
            remap.insert(old_id, values.len() as i32);
            values.push(s);
        }
        let keys: Vec<Option<i32>> = ids
            .iter()
            .map(|&id| {
                if id == NULL_INT {
                    None
                } else if id <= -2 {
                    Some(remap[&id])
                } else {
                    Some(id)
                }
            })
            .collect();
        (values, keys, DictRemapMode::OnlyTransientsRemapped)
    } else {
        let (unique_ids, strings) = rowset.unique_strings_for_dict_target(target_idx);
        for (pos, &id) in unique_ids.iter().enumerate() {
            remap.insert(id, pos as i32);
        }
        let keys: Vec<Option<i32>> = ids
            .iter()
            .map(|&id| (id != NULL_INT).then(|| remap[&id]))
            .collect();
        (strings, keys, DictRemapMode::AllRemapped)
    };

    let keys = Int32Array::from(keys);
    let values: StringArray = values.iter().map(|s| Some(s.as_ref())).collect();
    let dict =
        DictionaryArray::<Int32Type>::try_new(keys, Arc::new(values)).map_err(Error::Arrow)?;
    Ok((Arc::new(dict), remap, mode))
}

/// Export one dictionary column together with its remap table.
pub fn dictionary_export(
    rowset: &RowSet,
    options: &ConvertOptions,
    target_idx: usize,
) -> Result<DictionaryExport> {
    let entries = rowset.materialized_entries();
    let (array, remap, mode) = convert_dict_column(rowset, options, target_idx, &entries)?;
    Ok(DictionaryExport { array, remap, mode })
}
