//! Plain identifier aliases used across the result-set crates.

/// Identifier of a string dictionary. Id 0 names the per-result literal
/// dictionary (strings minted by expressions rather than stored columns).
pub type DictId = u32;

/// The reserved literal-string dictionary id.
pub const LITERAL_DICT_ID: DictId = 0;

/// Index of a storage partition within one result set.
pub type StorageIndex = usize;
