//! Proxy error types.

use derive_more::{Display, Error};

/// A proxy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No backend registered under the given id. 404-equivalent.
    #[display("unknown backend: {_0}")]
    UnknownBackend(#[error(not(source))] i64),
    /// The path is not in the index for that backend. 404-equivalent.
    #[display("file not found: ({_0}, {_1})")]
    FileNotFound(#[error(not(source))] i64, String),
    /// The remote file server answered with a non-success status; surface
    /// that status to the client unchanged.
    #[display("upstream returned {status} for {url}")]
    Upstream { url: String, status: u16 },
    /// The connection to the remote failed before or during streaming.
    #[display("upstream transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// Index store failure during resolution.
    #[display("index store error")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Store)
    }
}
