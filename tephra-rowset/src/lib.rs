//! Result-set storage and retrieval for the tephra query engine.
//!
//! Generated aggregation kernels write group-by keys and aggregate slots
//! into raw buffers laid out by a [`layout::ResultLayout`]. This crate owns
//! everything that happens to those bytes afterwards: typed target-value
//! decoding (including two-slot AVG pairs, variable-length payloads,
//! dictionary strings, count-distinct accumulators, streaming quantiles and
//! top-k heaps), empty-entry-skipping row iteration with permutation and
//! OFFSET/LIMIT windows, and the shared ownership arena that decoded values
//! borrow their lifetimes from.
//!
//! Columnar materialization of whole result sets lives in the companion
//! `tephra-columnar` crate, built on the accessors exposed here.

pub mod addressing;
pub mod buffer;
pub mod decode;
pub mod distinct;
pub mod iter;
pub mod layout;
pub mod owner;
pub mod quantile;
pub mod resolver;
pub mod rowset;
pub mod storage;
pub mod targets;
pub mod topk;

pub use decode::{BoundTarget, DecodeKind};
pub use distinct::{CountDistinctBuffer, CountDistinctDescriptor};
pub use iter::RowIterator;
pub use layout::{QueryDescription, ResultLayout, ResultLayoutBuilder, SlotDesc};
pub use owner::{Handle, RowSetMemoryOwner, StringDictProxy};
pub use resolver::{ChunkLocation, ChunkResolver, FragmentOffsets, LazyFetchInfo};
pub use rowset::RowSet;
pub use storage::ResultStorage;
pub use targets::{slots_for_target, AggKind, TargetInfo};

pub use tephra_result::{Error, Result};
