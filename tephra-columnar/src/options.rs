//! Run-time conversion configuration (no hidden constants).

/// Policy knobs for one columnar conversion call.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Worker threads for the fork-join fan-out; `None` uses the process
    /// default pool.
    pub thread_count: Option<usize>,
    /// Row counts below this convert single-threaded; above it, columns fan
    /// out across the pool and fallback columns additionally split into
    /// contiguous row-range segments.
    pub parallel_row_threshold: usize,
    /// Smallest fallback segment worth its own task.
    pub min_segment_rows: usize,
    /// Bulk-copy the backing string dictionary only for result sets larger
    /// than this; smaller results always pluck referenced ids.
    pub min_result_rows_for_bulk_dictionary_fetch: usize,
    /// Bulk-copy only when `dictionary entries / result rows` stays at or
    /// under this ratio, bounding exported dictionary size.
    pub max_dictionary_to_result_ratio_for_bulk_fetch: f64,
    /// Route every column through the row-wise fallback path, bypassing the
    /// bulk eligibility check. The outputs must match the bulk path
    /// byte-for-byte; tests lean on this.
    pub force_row_wise: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            thread_count: None,
            parallel_row_threshold: 10_000,
            min_segment_rows: 4_096,
            min_result_rows_for_bulk_dictionary_fetch: 10_000,
            max_dictionary_to_result_ratio_for_bulk_fetch: 0.1,
            force_row_wise: false,
        }
    }
}
