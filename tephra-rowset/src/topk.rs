//! Top-K heap decoding.
//!
//! A top-k aggregate keeps a fixed-capacity, reverse-ordered heap buffer per
//! group (smallest-retained-value first for top-k, mirrored for bottom-k).
//! Unfilled positions hold the element type's null sentinel, so the first
//! sentinel terminates the scan. The heap capacity may exceed |K|; decoding
//! sorts the collected values and keeps the best K.

use tephra_types::sentinel::{inline_int_null_value, NULL_DOUBLE, NULL_FLOAT};
use tephra_types::{Datum, ElemType};

/// Decode a heap buffer into its sorted output array.
///
/// `k_param` is the signed K from the target info: negative sorts ascending
/// (bottom-K), positive sorts descending (top-K). The scan stops at the
/// first unfilled sentinel, so partially filled heaps yield short arrays.
pub fn decode_topk_heap(heap: &[u8], elem: ElemType, k_param: i32) -> Vec<Datum> {
    assert!(k_param != 0, "top-k parameter must be non-zero");
    let max_size = k_param.unsigned_abs() as usize;
    let elem_sz = elem.size();
    let capacity = heap.len() / elem_sz;

    // The heap is built in reverse order; collect, reverse, sort, then keep
    // the best K.
    match elem {
        ElemType::Float32 => {
            let mut vals = read_until_sentinel(heap, capacity, elem_sz, |b| {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                (v != NULL_FLOAT).then_some(v)
            });
            vals.reverse();
            sort_floats(&mut vals, k_param);
            vals.truncate(max_size);
            vals.into_iter().map(Datum::Float).collect()
        }
        ElemType::Float64 => {
            let mut vals = read_until_sentinel(heap, capacity, elem_sz, |b| {
                let v = f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                (v != NULL_DOUBLE).then_some(v)
            });
            vals.reverse();
            sort_floats(&mut vals, k_param);
            vals.truncate(max_size);
            vals.into_iter().map(Datum::Double).collect()
        }
        ElemType::Int8 | ElemType::Int16 | ElemType::Int32 | ElemType::Int64 => {
            let sentinel = inline_int_null_value(elem_sz);
            let mut vals = read_until_sentinel(heap, capacity, elem_sz, |b| {
                let v = read_int_le(b);
                (v != sentinel).then_some(v)
            });
            vals.reverse();
            if k_param < 0 {
                vals.sort_unstable();
            } else {
                vals.sort_unstable_by(|a, b| b.cmp(a));
            }
            vals.truncate(max_size);
            vals.into_iter().map(Datum::Int).collect()
        }
        ElemType::DictString { .. } => {
            panic!("top-k over dictionary strings is not representable in a heap slot")
        }
    }
}

fn read_int_le(b: &[u8]) -> i64 {
    match b.len() {
        1 => b[0] as i8 as i64,
        2 => i16::from_le_bytes([b[0], b[1]]) as i64,
        4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        8 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        n => panic!("unsupported heap element width {n}"),
    }
}

fn read_until_sentinel<T>(
    heap: &[u8],
    capacity: usize,
    elem_sz: usize,
    mut decode: impl FnMut(&[u8]) -> Option<T>,
) -> Vec<T> {
    let mut vals = Vec::with_capacity(capacity);
    for i in 0..capacity {
        match decode(&heap[i * elem_sz..(i + 1) * elem_sz]) {
            Some(v) => vals.push(v),
            None => break,
        }
    }
    vals
}

fn sort_floats<T: Copy + TotalOrd>(vals: &mut [T], k_param: i32) {
    if k_param < 0 {
        vals.sort_unstable_by(|a, b| a.total_ord(b));
    } else {
        vals.sort_unstable_by(|a, b| b.total_ord(a));
    }
}

trait TotalOrd {
    fn total_ord(&self, other: &Self) -> std::cmp::Ordering;
}

impl TotalOrd for f32 {
    fn total_ord(&self, other: &Self) -> std::cmp::Ordering {
        self.total_cmp(other)
    }
}

impl TotalOrd for f64 {
    fn total_ord(&self, other: &Self) -> std::cmp::Ordering {
        self.total_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_bytes(vals: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in vals {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn bottom_k_sorts_ascending() {
        let null = inline_int_null_value(8);
        let heap = heap_bytes(&[7, 3, 9, 1, null, null]);
        let decoded = decode_topk_heap(&heap, ElemType::Int64, -3);
        assert_eq!(decoded, vec![Datum::Int(1), Datum::Int(3), Datum::Int(7)]);
    }

    #[test]
    fn top_k_sorts_descending() {
        let null = inline_int_null_value(8);
        let heap = heap_bytes(&[7, 3, 9, 1, null, null]);
        let decoded = decode_topk_heap(&heap, ElemType::Int64, 3);
        assert_eq!(decoded, vec![Datum::Int(9), Datum::Int(7), Datum::Int(3)]);
    }

    #[test]
    fn scan_stops_at_first_sentinel() {
        let null = inline_int_null_value(8);
        let heap = heap_bytes(&[5, null, 8]);
        let decoded = decode_topk_heap(&heap, ElemType::Int64, -3);
        assert_eq!(decoded, vec![Datum::Int(5)]);
    }

    #[test]
    fn float_heap_uses_total_order() {
        let mut heap = Vec::new();
        for v in [2.5f64, -1.0, 4.0] {
            heap.extend_from_slice(&v.to_le_bytes());
        }
        let decoded = decode_topk_heap(&heap, ElemType::Float64, 2);
        assert_eq!(decoded, vec![Datum::Double(4.0), Datum::Double(2.5)]);
    }
}
