//! Reserved null and empty-key bit patterns.
//!
//! Fixed-width slots have no validity sidecar: a value is null iff it equals
//! the reserved sentinel for its width. Group-by key slots use a separate
//! "empty key" pattern to mark hash-table entries that were never claimed.

use crate::LogicalType;

/// Null sentinel for 32-bit dictionary-string ids.
pub const NULL_INT: i32 = i32::MIN;

/// Null sentinel for 4-byte float slots.
pub const NULL_FLOAT: f32 = f32::MIN;

/// Null sentinel for 8-byte float slots.
pub const NULL_DOUBLE: f64 = f64::MIN;

/// Empty-entry pattern for 8-byte key slots.
pub const EMPTY_KEY_64: i64 = i64::MAX;

/// Empty-entry pattern for 4-byte key slots.
pub const EMPTY_KEY_32: i32 = i32::MAX;

/// Inline null sentinel for an integral value of `width` bytes: the minimum
/// representable value at that width.
///
/// Panics on widths other than 1, 2, 4 or 8 — the layout can never produce
/// them.
#[inline]
pub fn inline_int_null_value(width: usize) -> i64 {
    match width {
        1 => i8::MIN as i64,
        2 => i16::MIN as i64,
        4 => i32::MIN as i64,
        8 => i64::MIN,
        _ => panic!("no null sentinel for {width}-byte integers"),
    }
}

/// Null sentinel for the given logical type at its canonical width, as an
/// integer bit pattern. Variable-length types have no inline sentinel.
#[inline]
pub fn inline_null_value(ty: &LogicalType) -> Option<i64> {
    match ty {
        LogicalType::Float32 => Some((NULL_FLOAT.to_bits() as i32) as i64),
        LogicalType::Float64 => Some(NULL_DOUBLE.to_bits() as i64),
        LogicalType::DictString { .. } => Some(NULL_INT as i64),
        LogicalType::String | LogicalType::Array { .. } => None,
        other => Some(inline_int_null_value(
            other.canonical_size().expect("fixed-width type"),
        )),
    }
}

/// Empty-key pattern for a key slot of `width` bytes.
#[inline]
pub fn empty_key_value(width: usize) -> i64 {
    match width {
        4 => EMPTY_KEY_32 as i64,
        8 => EMPTY_KEY_64,
        _ => panic!("no empty-key pattern for {width}-byte keys"),
    }
}

/// Truncate `ival` to the value range of a `width`-byte signed integer, the
/// way a narrow slot read would produce it.
#[inline]
pub fn int_resize_cast(ival: i64, width: usize) -> i64 {
    match width {
        1 => ival as i8 as i64,
        2 => ival as i16 as i64,
        4 => ival as i32 as i64,
        8 => ival,
        _ => panic!("unsupported integer width {width}"),
    }
}
