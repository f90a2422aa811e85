//! Columnar conversion engine.
//!
//! Produces, per output column, a contiguous typed Arrow array plus validity
//! bitmap for the whole result set (subject to the OFFSET/LIMIT window). Two
//! paths exist per column:
//!
//! - the **direct/bulk path** reads the physical column bytes straight out
//!   of projection storage and derives the validity bitmap by batch sentinel
//!   comparison, eight elements per step, dropping the bitmap entirely when
//!   nothing was null;
//! - the **row-wise fallback** decodes entries through the row-set engines
//!   into per-segment builders and concatenates the segments in index order.
//!
//! Ineligible columns (lazy, dictionary, boolean/date/time/timestamp,
//! varlen, two-slot aggregates) silently take the fallback — that is a
//! policy choice, not an error. Unsupported types surface as
//! [`Error::UnsupportedType`] only where the export format truly cannot
//! represent them.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, PrimitiveArray};
use arrow::buffer::{BooleanBuffer, Buffer, NullBuffer, ScalarBuffer};
use arrow::compute::concat;
use arrow::datatypes::{
    ArrowPrimitiveType, Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, Schema,
};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use tephra_result::{Error, Result};
use tephra_rowset::RowSet;
use tephra_threading::{split_ranges, with_thread_pool};
use tephra_types::sentinel::{inline_int_null_value, NULL_DOUBLE, NULL_FLOAT};
use tephra_types::LogicalType;

use crate::arrow_export::{arrow_data_type, build_segment_array, convert_dict_column};
use crate::options::ConvertOptions;

/// Bulk converter over one result set.
pub struct ColumnarConverter<'a> {
    rowset: &'a RowSet,
    options: ConvertOptions,
}

impl<'a> ColumnarConverter<'a> {
    pub fn new(rowset: &'a RowSet, options: ConvertOptions) -> Self {
        Self { rowset, options }
    }

    #[inline]
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert the whole result set into a record batch with generated
    /// `col_N` column names.
    pub fn convert(&self) -> Result<RecordBatch> {
        let names: Vec<String> = (0..self.rowset.col_count())
            .map(|i| format!("col_{i}"))
            .collect();
        self.convert_with_names(&names)
    }

    /// Convert with caller-supplied column names.
    pub fn convert_with_names<S: AsRef<str>>(&self, names: &[S]) -> Result<RecordBatch> {
        assert_eq!(
            names.len(),
            self.rowset.col_count(),
            "one name per output column"
        );
        let entries = self.rowset.materialized_entries();
        let rows = entries.len();
        let parallel = rows > self.options.parallel_row_threshold && !self.rowset.is_truncated();
        tracing::debug!(
            rows,
            cols = self.rowset.col_count(),
            parallel,
            "columnar conversion started"
        );

        let columns: Result<Vec<ArrayRef>> = if parallel {
            with_thread_pool(self.options.thread_count, || {
                (0..self.rowset.col_count())
                    .into_par_iter()
                    .map(|target_idx| self.convert_column(target_idx, &entries))
                    .collect()
            })
        } else {
            (0..self.rowset.col_count())
                .map(|target_idx| self.convert_column(target_idx, &entries))
                .collect()
        };
        let columns = columns?;

        let fields: Vec<Field> = names
            .iter()
            .zip(self.rowset.targets())
            .map(|(name, info)| {
                Field::new(name.as_ref(), arrow_data_type(info.logical_type), true)
            })
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Error::Arrow)
    }

    /// Convert a single column, choosing the bulk or fallback path.
    pub fn convert_column(&self, target_idx: usize, entries: &[usize]) -> Result<ArrayRef> {
        if let LogicalType::DictString { .. } = self.rowset.col_type(target_idx) {
            return convert_dict_column(self.rowset, &self.options, target_idx, entries)
                .map(|(array, _, _)| array);
        }
        if self.bulk_eligible(target_idx) {
            tracing::trace!(target_idx, "bulk columnar path");
            return Ok(self.bulk_column(target_idx));
        }
        tracing::trace!(target_idx, "row-wise fallback path");
        self.fallback_column(target_idx, entries)
    }

    /// Direct extraction applies only to plain fixed-width numeric
    /// projection columns laid out column-major; booleans and date/time
    /// kinds are excluded for their representation scaling, dictionary
    /// columns for their remap step.
    fn bulk_eligible(&self, target_idx: usize) -> bool {
        if self.options.force_row_wise {
            return false;
        }
        if !self.rowset.is_direct_columnar_target(target_idx) {
            return false;
        }
        if !matches!(
            self.rowset.col_type(target_idx),
            LogicalType::Int8
                | LogicalType::Int16
                | LogicalType::Int32
                | LogicalType::Int64
                | LogicalType::Float32
                | LogicalType::Float64
        ) {
            return false;
        }
        // The bulk path reads every entry; a projection with holes must
        // fall back to the entry-skipping decoder.
        self.rowset.row_count() == self.rowset.entry_count()
    }

    fn column_bytes(&self, target_idx: usize) -> Vec<u8> {
        if self.rowset.is_zero_copy_columnar_conversion_possible(target_idx) {
            return self.rowset.columnar_buffer(target_idx).to_vec();
        }
        let width = self
            .rowset
            .col_type(target_idx)
            .canonical_size()
            .expect("bulk path requires fixed width");
        let mut out = vec![0u8; width * self.rowset.total_storage_entries()];
        self.rowset.copy_column_into_buffer(target_idx, &mut out);
        out
    }

    fn bulk_column(&self, target_idx: usize) -> ArrayRef {
        let bytes = self.column_bytes(target_idx);
        match self.rowset.col_type(target_idx) {
            LogicalType::Int8 => primitive_from_vals::<Int8Type>(
                bytes.iter().map(|&b| b as i8).collect(),
                inline_int_null_value(1) as i8,
            ),
            LogicalType::Int16 => primitive_from_vals::<Int16Type>(
                bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect(),
                inline_int_null_value(2) as i16,
            ),
            LogicalType::Int32 => primitive_from_vals::<Int32Type>(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
                inline_int_null_value(4) as i32,
            ),
            LogicalType::Int64 => primitive_from_vals::<Int64Type>(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                    })
                    .collect(),
                inline_int_null_value(8),
            ),
            LogicalType::Float32 => primitive_from_vals::<Float32Type>(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
                NULL_FLOAT,
            ),
            LogicalType::Float64 => primitive_from_vals::<Float64Type>(
                bytes
                    .chunks_exact(8)
                    .map(|c| {
                        f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                    })
                    .collect(),
                NULL_DOUBLE,
            ),
            other => panic!("bulk path reached ineligible type {other:?}"),
        }
    }

    /// Decode the column row-by-row, in contiguous segments concatenated in
    /// index order. Truncated results stay single-segment: the logical row
    /// count up to the offset is only known sequentially.
    fn fallback_column(&self, target_idx: usize, entries: &[usize]) -> Result<ArrayRef> {
        let rows = entries.len();
        let single_segment = self.rowset.is_truncated()
            || rows <= self.options.parallel_row_threshold.max(self.options.min_segment_rows);
        if single_segment {
            return build_segment_array(self.rowset, target_idx, entries);
        }
        let max_parts = (rows / self.options.min_segment_rows)
            .clamp(1, tephra_threading::current_thread_count());
        let ranges = split_ranges(rows, max_parts);
        let segments: Result<Vec<ArrayRef>> = ranges
            .into_par_iter()
            .map(|r| build_segment_array(self.rowset, target_idx, &entries[r]))
            .collect();
        let segments = segments?;
        if segments.len() == 1 {
            return Ok(segments.into_iter().next().expect("one segment"));
        }
        let refs: Vec<&dyn Array> = segments.iter().map(|a| a.as_ref()).collect();
        concat(&refs).map_err(Error::Arrow)
    }
}

/// Build a primitive array plus validity bitmap from raw column values.
/// The bitmap is generated by sentinel comparison eight elements per
/// iteration and dropped entirely when every value is valid.
fn primitive_from_vals<T: ArrowPrimitiveType>(
    vals: Vec<T::Native>,
    null_val: T::Native,
) -> ArrayRef
where
    T::Native: PartialEq,
{
    let len = vals.len();
    let mut bitmap = vec![0u8; len.div_ceil(8)];
    let null_count = gen_null_bitmap(&vals, null_val, &mut bitmap);
    let values = ScalarBuffer::<T::Native>::from(vals);
    let nulls = (null_count > 0).then(|| {
        NullBuffer::new(BooleanBuffer::new(Buffer::from_vec(bitmap), 0, len))
    });
    Arc::new(PrimitiveArray::<T>::new(values, nulls)) as ArrayRef
}

/// Fill `bitmap` with validity bits (1 = valid) and return the null count.
/// Processes eight elements per iteration, one output byte at a time.
pub(crate) fn gen_null_bitmap<T: Copy + PartialEq>(
    vals: &[T],
    null_val: T,
    bitmap: &mut [u8],
) -> usize {
    let mut null_count = 0usize;
    let mut chunks = vals.chunks_exact(8);
    let mut byte_idx = 0usize;
    for chunk in &mut chunks {
        let mut valid_byte = 0u8;
        for (bit, v) in chunk.iter().enumerate() {
            let valid = (*v != null_val) as u8;
            valid_byte |= valid << bit;
            null_count += (valid == 0) as usize;
        }
        bitmap[byte_idx] = valid_byte;
        byte_idx += 1;
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut valid_byte = 0u8;
        for (bit, v) in rem.iter().enumerate() {
            let valid = (*v != null_val) as u8;
            valid_byte |= valid << bit;
            null_count += (valid == 0) as usize;
        }
        bitmap[byte_idx] = valid_byte;
    }
    null_count
}
