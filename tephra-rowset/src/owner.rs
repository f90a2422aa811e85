//! Shared ownership arena for decoded auxiliary values.
//!
//! Slots never hold raw addresses. Anything the original layout would have
//! referenced through a pointer — interned strings, variable-length
//! payloads, count-distinct accumulators, quantile accumulators, top-k heap
//! buffers — lives in a [`RowSetMemoryOwner`] and is referenced from slots
//! by a 1-based [`Handle`], with 0 reserved for "never initialized".
//!
//! The owner is append-only and internally synchronized: the producer
//! interns during the fill phase and converter threads intern concurrently
//! during lazy decode, so every arena sits behind its own mutex. Handles,
//! once returned, stay valid for the owner's lifetime (the lifetime of the
//! result set that decoded them).

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tephra_types::sentinel::NULL_INT;
use tephra_types::{DictId, LITERAL_DICT_ID};

use crate::distinct::{CountDistinctBuffer, CountDistinctDescriptor};
use crate::quantile::QuantileAccumulator;

/// 1-based reference into one of the owner's arenas; 0 means "none".
pub type Handle = u64;

#[derive(Default)]
pub struct RowSetMemoryOwner {
    strings: Mutex<Vec<Arc<str>>>,
    varlen: Mutex<Vec<Arc<[u8]>>>,
    distinct: Mutex<Vec<CountDistinctBuffer>>,
    quantiles: Mutex<Vec<QuantileAccumulator>>,
    topk_heaps: Mutex<Vec<Arc<[u8]>>>,
    dict_proxies: Mutex<FxHashMap<DictId, Arc<StringDictProxy>>>,
}

impl RowSetMemoryOwner {
    pub fn new() -> Arc<Self> {
        let owner = Arc::new(Self::default());
        // The literal dictionary (id 0) always exists; expressions mint
        // transient entries into it.
        owner.register_dict_proxy(Arc::new(StringDictProxy::new(LITERAL_DICT_ID, Vec::new())));
        owner
    }

    /// Intern a string, returning its handle.
    pub fn add_string(&self, s: &str) -> Handle {
        let mut strings = self.strings.lock().expect("string arena poisoned");
        strings.push(Arc::from(s));
        strings.len() as Handle
    }

    /// Resolve a string handle. Panics on handle 0 or an unknown handle —
    /// both mean a slot held a value this owner never issued.
    pub fn string(&self, handle: Handle) -> Arc<str> {
        let strings = self.strings.lock().expect("string arena poisoned");
        strings[checked_index(handle, strings.len())].clone()
    }

    /// Intern a variable-length payload, returning its handle.
    pub fn add_varlen(&self, bytes: &[u8]) -> Handle {
        let mut varlen = self.varlen.lock().expect("varlen arena poisoned");
        varlen.push(Arc::from(bytes));
        varlen.len() as Handle
    }

    pub fn varlen(&self, handle: Handle) -> Arc<[u8]> {
        let varlen = self.varlen.lock().expect("varlen arena poisoned");
        varlen[checked_index(handle, varlen.len())].clone()
    }

    /// Allocate an empty count-distinct accumulator per `desc`.
    pub fn allocate_count_distinct_buffer(&self, desc: &CountDistinctDescriptor) -> Handle {
        let mut distinct = self.distinct.lock().expect("distinct arena poisoned");
        distinct.push(CountDistinctBuffer::for_descriptor(desc));
        distinct.len() as Handle
    }

    /// Record a value into a count-distinct accumulator (fill phase).
    pub fn count_distinct_insert(&self, handle: Handle, value: u64) {
        let mut distinct = self.distinct.lock().expect("distinct arena poisoned");
        let idx = checked_index(handle, distinct.len());
        distinct[idx].insert(value);
    }

    /// Cardinality of a count-distinct accumulator; handle 0 reads as an
    /// accumulator that never saw a value.
    pub fn count_distinct_cardinality(
        &self,
        handle: Handle,
        desc: &CountDistinctDescriptor,
    ) -> i64 {
        assert!(desc.is_valid(), "distinct read without a descriptor");
        if handle == 0 {
            return 0;
        }
        let distinct = self.distinct.lock().expect("distinct arena poisoned");
        let buf = &distinct[checked_index(handle, distinct.len())];
        debug_assert!(
            matches!(
                (buf, desc),
                (
                    CountDistinctBuffer::Bitmap(_),
                    CountDistinctDescriptor::Bitmap { .. }
                ) | (CountDistinctBuffer::Set(_), CountDistinctDescriptor::HashSet)
            ),
            "count-distinct buffer does not match its descriptor"
        );
        buf.cardinality()
    }

    /// Allocate a quantile accumulator for quantile `q`.
    pub fn add_quantile(&self, q: f64) -> Handle {
        let mut quantiles = self.quantiles.lock().expect("quantile arena poisoned");
        quantiles.push(QuantileAccumulator::new(q));
        quantiles.len() as Handle
    }

    pub fn quantile_add(&self, handle: Handle, value: f64) {
        let mut quantiles = self.quantiles.lock().expect("quantile arena poisoned");
        let idx = checked_index(handle, quantiles.len());
        quantiles[idx].add(value);
    }

    /// Compute a quantile; `None` when the accumulator was never fed or the
    /// handle is 0.
    pub fn quantile_compute(&self, handle: Handle) -> Option<f64> {
        if handle == 0 {
            return None;
        }
        let quantiles = self.quantiles.lock().expect("quantile arena poisoned");
        quantiles[checked_index(handle, quantiles.len())].compute()
    }

    /// Intern a top-k heap buffer, returning its handle.
    pub fn add_topk_heap(&self, heap: &[u8]) -> Handle {
        let mut heaps = self.topk_heaps.lock().expect("top-k arena poisoned");
        heaps.push(Arc::from(heap));
        heaps.len() as Handle
    }

    pub fn topk_heap(&self, handle: Handle) -> Arc<[u8]> {
        let heaps = self.topk_heaps.lock().expect("top-k arena poisoned");
        heaps[checked_index(handle, heaps.len())].clone()
    }

    /// Register (or replace) the dictionary proxy for its dict id.
    pub fn register_dict_proxy(&self, proxy: Arc<StringDictProxy>) {
        let mut proxies = self.dict_proxies.lock().expect("proxy map poisoned");
        proxies.insert(proxy.dict_id(), proxy);
    }

    /// Proxy for `dict_id`. Panics when no proxy was registered — a
    /// dictionary-typed target without its dictionary is a descriptor
    /// inconsistency.
    pub fn string_dict_proxy(&self, dict_id: DictId) -> Arc<StringDictProxy> {
        let proxies = self.dict_proxies.lock().expect("proxy map poisoned");
        proxies
            .get(&dict_id)
            .unwrap_or_else(|| panic!("no string dictionary proxy for dict {dict_id}"))
            .clone()
    }
}

#[inline]
fn checked_index(handle: Handle, len: usize) -> usize {
    assert!(handle != 0, "null handle dereferenced");
    let idx = (handle - 1) as usize;
    assert!(idx < len, "handle {handle} outside arena of {len}");
    idx
}

/// Read-through view over one string dictionary, extended with transient
/// entries minted at decode time.
///
/// Persistent entries occupy non-negative ids (their position in the backing
/// dictionary). Transient entries — strings produced by expressions rather
/// than storage — take negative ids starting at −2; −1 stays reserved and
/// [`NULL_INT`] is the null id.
pub struct StringDictProxy {
    dict_id: DictId,
    entries: Vec<Arc<str>>,
    transient: Mutex<TransientStrings>,
}

#[derive(Default)]
struct TransientStrings {
    by_index: Vec<Arc<str>>,
    id_by_string: FxHashMap<Arc<str>, i32>,
}

impl StringDictProxy {
    pub fn new(dict_id: DictId, entries: Vec<String>) -> Self {
        Self {
            dict_id,
            entries: entries.into_iter().map(Arc::from).collect(),
            transient: Mutex::new(TransientStrings::default()),
        }
    }

    #[inline]
    pub fn dict_id(&self) -> DictId {
        self.dict_id
    }

    #[inline]
    pub fn transient_index_to_id(index: usize) -> i32 {
        -(index as i32) - 2
    }

    #[inline]
    pub fn id_to_transient_index(id: i32) -> usize {
        debug_assert!(id <= -2);
        (-id - 2) as usize
    }

    /// Translate an id to its string; `None` for the null id.
    pub fn get_string(&self, id: i32) -> Option<Arc<str>> {
        if id == NULL_INT {
            return None;
        }
        if id >= 0 {
            let s = self
                .entries
                .get(id as usize)
                .unwrap_or_else(|| panic!("string id {id} outside dict {}", self.dict_id));
            return Some(s.clone());
        }
        assert!(id <= -2, "string id -1 is reserved");
        let transient = self.transient.lock().expect("transient strings poisoned");
        let idx = Self::id_to_transient_index(id);
        Some(
            transient
                .by_index
                .get(idx)
                .unwrap_or_else(|| panic!("transient id {id} outside dict {}", self.dict_id))
                .clone(),
        )
    }

    /// Intern a transient string, reusing the id when it was seen before.
    pub fn get_or_add_transient(&self, s: &str) -> i32 {
        let mut transient = self.transient.lock().expect("transient strings poisoned");
        if let Some(&id) = transient.id_by_string.get(s) {
            return id;
        }
        let entry: Arc<str> = Arc::from(s);
        let id = Self::transient_index_to_id(transient.by_index.len());
        transient.by_index.push(entry.clone());
        transient.id_by_string.insert(entry, id);
        id
    }

    /// Persistent entries, in id order.
    pub fn entries(&self) -> &[Arc<str>] {
        &self.entries
    }

    /// Snapshot of the transient entries, in mint order.
    pub fn transient_entries(&self) -> Vec<Arc<str>> {
        self.transient
            .lock()
            .expect("transient strings poisoned")
            .by_index
            .clone()
    }

    /// Total entries visible through the proxy.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
            + self
                .transient
                .lock()
                .expect("transient strings poisoned")
                .by_index
                .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_one_based() {
        let owner = RowSetMemoryOwner::new();
        let h1 = owner.add_string("a");
        let h2 = owner.add_string("b");
        assert_eq!(h1, 1);
        assert_eq!(h2, 2);
        assert_eq!(&*owner.string(h2), "b");
    }

    #[test]
    fn transient_ids_descend_from_minus_two() {
        let proxy = StringDictProxy::new(3, vec!["x".into()]);
        let a = proxy.get_or_add_transient("alpha");
        let b = proxy.get_or_add_transient("beta");
        assert_eq!(a, -2);
        assert_eq!(b, -3);
        assert_eq!(proxy.get_or_add_transient("alpha"), -2);
        assert_eq!(&*proxy.get_string(-3).unwrap(), "beta");
        assert_eq!(&*proxy.get_string(0).unwrap(), "x");
        assert!(proxy.get_string(NULL_INT).is_none());
        assert_eq!(proxy.entry_count(), 3);
    }
}
