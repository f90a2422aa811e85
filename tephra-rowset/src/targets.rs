//! Per-output-column metadata.

use tephra_types::LogicalType;

/// Aggregate function kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    ApproxCountDistinct,
    ApproxQuantile,
    Sample,
    SingleValue,
    TopK,
    Quantile,
}

/// Metadata for one output column: whether it aggregates, what it returns
/// and what it consumed. One ordered sequence of `TargetInfo` is shared by
/// every storage partition of a result set.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// `None` for plain projected columns.
    pub agg: Option<AggKind>,
    /// Logical output type.
    pub logical_type: LogicalType,
    /// Type of the aggregate's input argument; drives AVG upcast rules and
    /// null-sentinel selection.
    pub agg_arg_type: Option<LogicalType>,
    pub is_distinct: bool,
    pub skip_null_val: bool,
    /// Signed K for top-k aggregates: positive = largest K, negative =
    /// smallest K.
    pub topk_param: i32,
    /// Heap stored inline in the 8-byte slot (element size × |K| fits).
    pub topk_inline_buffer: bool,
}

impl TargetInfo {
    /// A plain projected column.
    pub fn projection(logical_type: LogicalType) -> Self {
        Self {
            agg: None,
            logical_type,
            agg_arg_type: None,
            is_distinct: false,
            skip_null_val: false,
            topk_param: 0,
            topk_inline_buffer: false,
        }
    }

    /// An aggregate column over an argument of `agg_arg_type`.
    pub fn aggregate(kind: AggKind, logical_type: LogicalType, agg_arg_type: LogicalType) -> Self {
        Self {
            agg: Some(kind),
            logical_type,
            agg_arg_type: Some(agg_arg_type),
            is_distinct: false,
            skip_null_val: false,
            topk_param: 0,
            topk_inline_buffer: false,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.is_distinct = true;
        self
    }

    pub fn with_topk_param(mut self, k: i32, inline_buffer: bool) -> Self {
        self.topk_param = k;
        self.topk_inline_buffer = inline_buffer;
        self
    }

    #[inline]
    pub fn is_agg(&self) -> bool {
        self.agg.is_some()
    }

    #[inline]
    pub fn is_avg(&self) -> bool {
        self.agg == Some(AggKind::Avg)
    }

    /// COUNT DISTINCT and APPROX_COUNT_DISTINCT store a handle to a distinct
    /// structure rather than a value.
    #[inline]
    pub fn is_distinct_target(&self) -> bool {
        matches!(
            (self.agg, self.is_distinct),
            (Some(AggKind::Count), true) | (Some(AggKind::ApproxCountDistinct), _)
        )
    }

    /// True when the aggregate consumes a 4-byte float argument; those slots
    /// hold an f32 in the low half regardless of padding.
    #[inline]
    pub fn takes_float_argument(&self) -> bool {
        matches!(
            self.agg,
            Some(
                AggKind::Avg
                    | AggKind::Sum
                    | AggKind::Min
                    | AggKind::Max
                    | AggKind::SingleValue
            )
        ) && self.agg_arg_type == Some(LogicalType::Float32)
    }

    /// True for values that live outside the slot: raw strings and arrays.
    /// Top-k targets are array-typed but store a heap handle in one slot, so
    /// they are excluded here.
    #[inline]
    pub fn is_varlen_value(&self) -> bool {
        self.logical_type.is_varlen() && self.agg != Some(AggKind::TopK)
    }
}

/// Number of physical slots the target occupies.
///
/// AVG carries a (sum, count) pair; raw strings and arrays carry a
/// (handle, length) pair unless the result set keeps a separate varlen
/// buffer for non-aggregate columns, in which case one slot holds the index
/// into it.
pub fn slots_for_target(info: &TargetInfo, separate_varlen_valid: bool) -> usize {
    if info.is_avg() {
        return 2;
    }
    if info.is_varlen_value() && !(separate_varlen_valid && !info.is_agg()) {
        return 2;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tephra_types::ElemType;

    #[test]
    fn slot_counts() {
        let avg = TargetInfo::aggregate(AggKind::Avg, LogicalType::Float64, LogicalType::Int32);
        assert_eq!(slots_for_target(&avg, false), 2);

        let s = TargetInfo::projection(LogicalType::String);
        assert_eq!(slots_for_target(&s, false), 2);
        assert_eq!(slots_for_target(&s, true), 1);

        let topk = TargetInfo::aggregate(
            AggKind::TopK,
            LogicalType::Array {
                elem: ElemType::Int64,
                fixed_elems: None,
            },
            LogicalType::Int64,
        )
        .with_topk_param(3, false);
        assert_eq!(slots_for_target(&topk, false), 1);
    }

    #[test]
    fn distinct_detection() {
        let cd = TargetInfo::aggregate(AggKind::Count, LogicalType::Int64, LogicalType::Int64)
            .distinct();
        assert!(cd.is_distinct_target());
        let acd = TargetInfo::aggregate(
            AggKind::ApproxCountDistinct,
            LogicalType::Int64,
            LogicalType::Int64,
        );
        assert!(acd.is_distinct_target());
        let sum = TargetInfo::aggregate(AggKind::Sum, LogicalType::Int64, LogicalType::Int64);
        assert!(!sum.is_distinct_target());
    }
}
