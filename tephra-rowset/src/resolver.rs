//! Lazy column fetch.
//!
//! Some projected columns are never materialized into the aggregation
//! buffer; their slot holds the source row index and the value is deferred
//! to the original column store. The store is reached through the
//! [`ChunkResolver`] capability so the decode engine stays fully
//! unit-testable with a fake resolver.

use tephra_types::StorageIndex;

/// Lazy-fetch marker for one output column.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyFetchInfo {
    pub is_lazily_fetched: bool,
    /// Column id within the source fragment's chunk list.
    pub local_col_id: usize,
}

impl LazyFetchInfo {
    pub fn lazy(local_col_id: usize) -> Self {
        Self {
            is_lazily_fetched: true,
            local_col_id,
        }
    }
}

/// Where a lazily fetched value lives: fragment plus fragment-local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub storage_idx: StorageIndex,
    pub frag_id: usize,
    pub local_col_id: usize,
    /// Row index local to the fragment.
    pub entry_idx: u64,
}

/// Chunk-iterator capability over the source column store.
///
/// Implementations are injected into the row set; the engine never touches
/// storage directly.
pub trait ChunkResolver: Send + Sync {
    /// Fetch a fixed-width value. Float columns return their IEEE bit
    /// pattern widened into the i64.
    fn fetch_fixed(&self, loc: ChunkLocation) -> i64;

    /// Fetch a variable-length value; `None` is a stored null.
    fn fetch_varlen(&self, loc: ChunkLocation) -> Option<Vec<u8>>;
}

/// Row-count geometry of one storage partition's source fragments.
///
/// `starts[i]` is the first global row of fragment `i`. When every fragment
/// (except possibly the last) has the same size, lookup is O(1) arithmetic;
/// otherwise a reverse scan over the start offsets finds the owning
/// fragment.
#[derive(Debug, Clone, Default)]
pub struct FragmentOffsets {
    starts: Vec<u64>,
    consistent_size: Option<u64>,
}

impl FragmentOffsets {
    /// Build from per-fragment row counts.
    pub fn from_row_counts(counts: &[u64]) -> Self {
        let mut starts = Vec::with_capacity(counts.len());
        let mut acc = 0u64;
        for &c in counts {
            starts.push(acc);
            acc += c;
        }
        let consistent = match counts.split_last() {
            Some((_, head)) if !head.is_empty() => {
                let first = head[0];
                head.iter().all(|&c| c == first).then_some(first)
            }
            Some((&only, _)) => Some(only.max(1)),
            None => None,
        };
        Self {
            starts,
            consistent_size: consistent,
        }
    }

    /// A single unfragmented source of `rows` rows.
    pub fn single(rows: u64) -> Self {
        Self::from_row_counts(&[rows])
    }

    #[inline]
    pub fn fragment_count(&self) -> usize {
        self.starts.len()
    }

    /// Locate the fragment owning `global_idx`, returning `(frag_id,
    /// local_idx)`.
    pub fn locate(&self, global_idx: u64) -> (usize, u64) {
        assert!(!self.starts.is_empty(), "no fragments to locate in");
        if self.starts.len() == 1 {
            return (0, global_idx);
        }
        if let Some(size) = self.consistent_size {
            // The last fragment may be ragged; clamp and subtract its start
            // instead of trusting the modulo.
            let frag = ((global_idx / size) as usize).min(self.starts.len() - 1);
            return (frag, global_idx - self.starts[frag]);
        }
        for frag_id in (1..self.starts.len()).rev() {
            let start = self.starts[frag_id];
            if start <= global_idx {
                return (frag_id, global_idx - start);
            }
        }
        (0, global_idx)
    }
}
