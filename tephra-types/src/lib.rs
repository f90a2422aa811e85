//! Logical output types, null sentinels and decoded values shared by the
//! result-set storage, decoding and conversion crates.
//!
//! The enums here are deliberately small and `Copy`: they act as labels that
//! the decode engine resolves into concrete read strategies once per result
//! set, not as rich type objects.

pub mod datum;
pub mod ids;
pub mod sentinel;

pub use datum::Datum;
pub use ids::{DictId, StorageIndex, LITERAL_DICT_ID};

/// Element type of an array-valued output column.
///
/// Array payloads are flat byte runs of fixed-width elements; dictionary
/// string elements are stored as 32-bit ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Dictionary-encoded string element, stored as a 32-bit id.
    DictString { dict_id: DictId },
}

impl ElemType {
    /// Stored width of one element in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            ElemType::Int8 => 1,
            ElemType::Int16 => 2,
            ElemType::Int32 | ElemType::DictString { .. } | ElemType::Float32 => 4,
            ElemType::Int64 | ElemType::Float64 => 8,
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, ElemType::Float32 | ElemType::Float64)
    }
}

/// Logical type of one output column.
///
/// This is the *external* type of the value a consumer sees; the physical
/// slot that backs it may be wider (compaction padding) or narrower (shared
/// key/value slots) — the memory layout descriptor owns that mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: i8 },
    /// Days-agnostic date, stored as epoch seconds in 8 bytes.
    Date,
    /// Seconds since midnight, 8 bytes.
    Time,
    /// Epoch seconds, 8 bytes.
    Timestamp,
    /// None-encoded (raw) string; variable length.
    String,
    /// Dictionary-encoded string; the slot holds a 32-bit id.
    DictString { dict_id: DictId },
    /// Array of fixed-width elements. `fixed_elems` is `Some` for
    /// fixed-length array columns, `None` for variable-length ones.
    Array {
        elem: ElemType,
        fixed_elems: Option<u32>,
    },
}

impl LogicalType {
    /// Canonical (logical) byte width of the value, or `None` for
    /// variable-length types.
    #[inline]
    pub fn canonical_size(&self) -> Option<usize> {
        match self {
            LogicalType::Boolean | LogicalType::Int8 => Some(1),
            LogicalType::Int16 => Some(2),
            LogicalType::Int32 | LogicalType::Float32 => Some(4),
            LogicalType::DictString { .. } => Some(4),
            LogicalType::Int64
            | LogicalType::Float64
            | LogicalType::Decimal { .. }
            | LogicalType::Date
            | LogicalType::Time
            | LogicalType::Timestamp => Some(8),
            LogicalType::String | LogicalType::Array { .. } => None,
        }
    }

    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            LogicalType::Int8 | LogicalType::Int16 | LogicalType::Int32 | LogicalType::Int64
        )
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, LogicalType::Float32 | LogicalType::Float64)
    }

    #[inline]
    pub fn is_decimal(&self) -> bool {
        matches!(self, LogicalType::Decimal { .. })
    }

    #[inline]
    pub fn is_datetime(&self) -> bool {
        matches!(
            self,
            LogicalType::Date | LogicalType::Time | LogicalType::Timestamp
        )
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, LogicalType::String | LogicalType::DictString { .. })
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, LogicalType::Array { .. })
    }

    /// True for types whose values live outside the slot itself: raw strings
    /// and arrays. Dictionary strings are *not* varlen — their slot holds the
    /// complete 32-bit id.
    #[inline]
    pub fn is_varlen(&self) -> bool {
        matches!(self, LogicalType::String | LogicalType::Array { .. })
    }

    /// Types an integer slot read can represent directly (booleans and
    /// date/time kinds included — they are stored as integers).
    #[inline]
    pub fn is_integral_storage(&self) -> bool {
        self.is_integer() || matches!(self, LogicalType::Boolean) || self.is_datetime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_sizes() {
        assert_eq!(LogicalType::Boolean.canonical_size(), Some(1));
        assert_eq!(LogicalType::Int16.canonical_size(), Some(2));
        assert_eq!(
            LogicalType::DictString { dict_id: 7 }.canonical_size(),
            Some(4)
        );
        assert_eq!(
            LogicalType::Decimal {
                precision: 10,
                scale: 2
            }
            .canonical_size(),
            Some(8)
        );
        assert_eq!(LogicalType::String.canonical_size(), None);
    }

    #[test]
    fn varlen_excludes_dict_strings() {
        assert!(LogicalType::String.is_varlen());
        assert!(LogicalType::Array {
            elem: ElemType::Int32,
            fixed_elems: None
        }
        .is_varlen());
        assert!(!LogicalType::DictString { dict_id: 1 }.is_varlen());
    }
}
