//! Fixed-size fork-join worker pools shared by iteration and conversion code.
//!
//! Conversion work fans out per column and per contiguous row range, then
//! joins before returning — there is no cooperative scheduling anywhere in
//! the result-set layer. Callers hand a thread count (or `None` for the
//! process default) to [`with_thread_pool`] and run their scoped fan-out
//! inside it.

use rayon::ThreadPoolBuilder;

/// Number of worker threads the default pool runs with.
pub fn current_thread_count() -> usize {
    rayon::current_num_threads()
}

/// Run `op` inside a fork-join pool of `threads` workers (the process
/// default when `None`). Rayon primitives used inside `op` (scoped spawns,
/// parallel iterators) are serviced by that pool; the call returns once all
/// spawned work has joined.
pub fn with_thread_pool<R, F>(threads: Option<usize>, op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match threads {
        None => op(),
        Some(n) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .expect("worker pool construction");
            pool.install(op)
        }
    }
}

/// Split `len` items into at most `max_parts` contiguous ranges of near-equal
/// size, in index order. Never returns an empty range.
pub fn split_ranges(len: usize, max_parts: usize) -> Vec<std::ops::Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = max_parts.clamp(1, len);
    let mut ranges = Vec::with_capacity(parts);
    for i in 0..parts {
        let start = i * len / parts;
        let end = (i + 1) * len / parts;
        if start < end {
            ranges.push(start..end);
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_in_order() {
        let ranges = split_ranges(10, 3);
        let flat: Vec<usize> = ranges.iter().flat_map(|r| r.clone()).collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn ranges_never_exceed_len() {
        assert_eq!(split_ranges(2, 8).len(), 2);
        assert!(split_ranges(0, 4).is_empty());
    }

    #[test]
    fn pool_runs_closure() {
        let sum = with_thread_pool(Some(2), || (0..100).sum::<i64>());
        assert_eq!(sum, 4950);
    }
}
