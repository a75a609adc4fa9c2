//! Index store error types.
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, following the same conventions as the other autodex
//! crates.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// No backend registered under the given id.
    #[display("backend not found: {_0}")]
    BackendNotFound(#[error(not(source))] i64),
    /// Caller-supplied value failed validation before touching the store.
    #[display("invalid {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A uniqueness or renumbering invariant was violated. Indicates index
    /// corruption; never swallow this.
    #[display("index integrity violation: {_0}")]
    Integrity(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
