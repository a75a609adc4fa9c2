//! Top-level error type for the CLI.
//!
//! Wraps the per-crate error trees; the binary reports them once, at exit.

use derive_more::{Display, Error};

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("index store error")]
    Store,
    #[display("crawl error")]
    Crawl,
    #[display("content proxy error")]
    Proxy,
    #[display("I/O error")]
    Io,
}
