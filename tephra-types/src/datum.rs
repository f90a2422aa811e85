//! Decoded target values.

use std::sync::Arc;

/// One decoded output value.
///
/// This is the external face of the decoding engine: a small owning enum,
/// cheap to clone (strings are shared). Integer-backed logical types
/// (booleans, dates, times, timestamps, raw dictionary ids, unscaled
/// decimals) all decode to [`Datum::Int`]; the consumer interprets them via
/// the column's logical type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// SQL NULL (also used for skipped targets, which are never materialized).
    Null,
    Int(i64),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
    /// Array value; elements are scalars or `Null`. An empty vec is an empty
    /// array, which is distinct from a `Null` array.
    Array(Vec<Datum>),
}

impl Datum {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The integer payload, if this is an integer datum.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The floating payload widened to f64, if this is a float datum.
    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Datum::Float(v) => Some(*v as f64),
            Datum::Double(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Double(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Str(Arc::from(v))
    }
}
