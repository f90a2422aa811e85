//! Count-distinct storage strategies.
//!
//! The implementation (dense bitmap vs. set) and the bitmap size are chosen
//! at query compile time and arrive with the layout descriptor; the decode
//! engine honors the descriptor exactly and never infers the strategy from
//! data.

use croaring::Treemap;

/// Compile-time-chosen count-distinct strategy for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountDistinctDescriptor {
    /// The target is not a distinct aggregate.
    Invalid,
    /// Dense bitmap over a known value range.
    Bitmap { bitmap_size_bits: usize },
    /// Generic set of observed values.
    HashSet,
}

impl CountDistinctDescriptor {
    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, CountDistinctDescriptor::Invalid)
    }

    /// Bitmap payload size in bytes; zero for non-bitmap strategies.
    #[inline]
    pub fn bitmap_size_bytes(&self) -> usize {
        match self {
            CountDistinctDescriptor::Bitmap { bitmap_size_bits } => bitmap_size_bits.div_ceil(8),
            _ => 0,
        }
    }
}

/// One materialized count-distinct accumulator, owned by the row-set memory
/// owner and referenced from slots by handle.
#[derive(Debug, Clone)]
pub enum CountDistinctBuffer {
    Bitmap(Vec<u8>),
    Set(Treemap),
}

impl CountDistinctBuffer {
    /// Allocate an empty accumulator matching `desc`.
    ///
    /// Panics on [`CountDistinctDescriptor::Invalid`] — a distinct slot
    /// without a descriptor means the layout was built inconsistently.
    pub fn for_descriptor(desc: &CountDistinctDescriptor) -> Self {
        match desc {
            CountDistinctDescriptor::Bitmap { .. } => {
                CountDistinctBuffer::Bitmap(vec![0u8; desc.bitmap_size_bytes()])
            }
            CountDistinctDescriptor::HashSet => CountDistinctBuffer::Set(Treemap::new()),
            CountDistinctDescriptor::Invalid => {
                panic!("count-distinct buffer requested for a non-distinct target")
            }
        }
    }

    /// Record one observed value.
    pub fn insert(&mut self, value: u64) {
        match self {
            CountDistinctBuffer::Bitmap(bits) => {
                let idx = value as usize;
                assert!(idx / 8 < bits.len(), "value outside bitmap range");
                bits[idx / 8] |= 1 << (idx % 8);
            }
            CountDistinctBuffer::Set(set) => {
                set.add(value);
            }
        }
    }

    /// Cardinality of the accumulator. Reads are idempotent: the same
    /// unmutated buffer always reports the same count.
    pub fn cardinality(&self) -> i64 {
        match self {
            CountDistinctBuffer::Bitmap(bits) => bitmap_popcount(bits),
            CountDistinctBuffer::Set(set) => set.cardinality() as i64,
        }
    }
}

/// Population count over a byte bitmap, eight bytes per step.
fn bitmap_popcount(bits: &[u8]) -> i64 {
    let mut count = 0u32;
    let mut chunks = bits.chunks_exact(8);
    for chunk in &mut chunks {
        let word = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        count += word.count_ones();
    }
    for &b in chunks.remainder() {
        count += b.count_ones();
    }
    count as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_counts_set_bits() {
        let desc = CountDistinctDescriptor::Bitmap {
            bitmap_size_bits: 100,
        };
        let mut buf = CountDistinctBuffer::for_descriptor(&desc);
        for v in [0u64, 7, 8, 63, 64, 99] {
            buf.insert(v);
        }
        buf.insert(7); // duplicate
        assert_eq!(buf.cardinality(), 6);
    }

    #[test]
    fn set_counts_unique_values() {
        let mut buf = CountDistinctBuffer::for_descriptor(&CountDistinctDescriptor::HashSet);
        for v in [1u64, 2, 3, 2, 1, u64::MAX] {
            buf.insert(v);
        }
        assert_eq!(buf.cardinality(), 4);
        // Idempotent read.
        assert_eq!(buf.cardinality(), 4);
    }

    #[test]
    fn descriptor_byte_size_rounds_up() {
        let desc = CountDistinctDescriptor::Bitmap {
            bitmap_size_bits: 9,
        };
        assert_eq!(desc.bitmap_size_bytes(), 2);
    }
}
