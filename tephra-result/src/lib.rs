//! Error types and result definitions for the tephra result-set layer.
//!
//! All crates in the workspace share a single error enum ([`Error`]) and a
//! [`Result<T>`] alias. Operations that can legitimately fail return
//! `Result<T>`; contract violations (a slot index past the layout, an
//! unsupported physical type reaching a decode path) are *not* represented as
//! errors — they panic, because they mean the descriptor or the generated
//! producer code is inconsistent with this layer's invariants and nothing at
//! runtime can recover from that.
//!
//! # Error Categories
//!
//! - **Conversion errors** ([`Error::Arrow`]): Arrow buffer/array assembly
//!   failures during columnar export.
//! - **User input errors** ([`Error::InvalidArgumentError`]): bad API
//!   parameters (e.g. a malformed permutation or window).
//! - **Export limitations** ([`Error::UnsupportedType`]): a value that has no
//!   representation in the requested export format. The caller may surface
//!   this to the end user and continue.
//! - **Capacity violations** ([`Error::CapacityExceeded`]): an upstream
//!   cardinality that the layer refuses to materialize; carries the requested
//!   entry count so the caller can retry with a different strategy.
//! - **Internal errors** ([`Error::Internal`]): unexpected states that are
//!   still surfaced as values rather than panics.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
