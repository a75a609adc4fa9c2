//! Crawl error types.
//!
//! Structured errors using `exn` for automatic location tracking, same
//! conventions as the store crate.

use derive_more::{Display, Error};

/// A crawl error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for crawl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The remote listing server returned a non-success status or the
    /// connection failed. Aborts the rest of this backend's crawl; entries
    /// upserted before the failure stay committed.
    #[display("listing fetch failed: {url}{}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Fetch {
        url: String,
        status: Option<u16>,
    },
    /// A backend base URL or resolved href could not be parsed.
    #[display("invalid url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The HTTP client itself could not be constructed (TLS backend init).
    #[display("http client construction failed")]
    Client,
    /// No backend registered under the given id.
    #[display("backend not found: {_0}")]
    BackendNotFound(#[error(not(source))] i64),
    /// Index store failure underneath a crawl step.
    #[display("index store error")]
    Store,
    /// The traversal safety valve tripped. A remote that keeps reporting
    /// new directories past this point is either enormous or lying.
    #[display("traversal cap reached after {_0} directories")]
    TraversalCap(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Store)
    }
}
