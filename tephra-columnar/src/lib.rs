//! Columnar materialization of tephra result sets into Arrow.
//!
//! The converter turns a filled [`tephra_rowset::RowSet`] into a
//! `RecordBatch`: one contiguous typed buffer plus validity bitmap per
//! output column, produced by the direct bulk path when the layout permits
//! and by the row-wise decoding fallback otherwise, with dictionary
//! remapping for string columns. Logical row order is preserved exactly by
//! every path, parallel or not.

pub mod arrow_export;
pub mod convert;
pub mod options;

pub use arrow_export::{arrow_data_type, dictionary_export, DictRemapMode, DictionaryExport};
pub use convert::ColumnarConverter;
pub use options::ConvertOptions;

pub use tephra_result::{Error, Result};
