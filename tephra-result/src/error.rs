use std::fmt;
use thiserror::Error;

/// Unified error type for the tephra result-set layer.
///
/// Errors propagate upward with the `?` operator. At the export boundary
/// (Arrow conversion) they are typically rendered into user-facing messages;
/// internal code can match on variants for programmatic handling.
///
/// `Error` is `Send + Sync` so conversion workers can return it across the
/// fork-join barrier.
#[derive(Error, Debug)]
pub enum Error {
    /// Arrow library error during columnar export.
    ///
    /// Raised while assembling Arrow buffers, arrays or record batches from
    /// decoded result-set contents. Typically indicates a schema mismatch or
    /// an allocation failure inside Arrow.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid user input or API parameter.
    ///
    /// The message string states what was invalid and why. These errors are
    /// recoverable: fix the input and retry.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A logical type that cannot be represented in the requested export
    /// format.
    ///
    /// This is the one conversion failure a caller is expected to handle
    /// gracefully (for example by reporting "unsupported type" for the
    /// offending column); every other type mismatch inside the decode engine
    /// is a contract violation and panics instead.
    #[error("unsupported type for columnar export: {0}")]
    UnsupportedType(String),

    /// An upstream cardinality this layer refuses to materialize.
    ///
    /// Carries the requested entry count so the caller can react, e.g. by
    /// retrying the query with a different group-by hash strategy. This layer
    /// never retries on its own.
    #[error("result set capacity exceeded: requested {requested} entries")]
    CapacityExceeded { requested: usize },

    /// Internal error indicating a bug or unexpected state.
    ///
    /// Should never occur during normal operation. The message describes the
    /// violated expectation.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create an [`Error::Internal`] from any displayable error.
    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }

    /// Create an [`Error::UnsupportedType`] from any displayable description.
    #[inline]
    pub fn unsupported<E: fmt::Display>(what: E) -> Self {
        Error::UnsupportedType(what.to_string())
    }
}
