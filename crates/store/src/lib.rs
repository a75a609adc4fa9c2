//! SQLite-backed index of remote directory listings.
//!
//! This crate owns the two persistent entities of autodex:
//! - **Backends**: registered remote HTTP sources (base URL, optional Basic
//!   auth, rescan interval, last-synchronized stamp). Ids are dense and
//!   1-based; deleting a backend renumbers the ones above it.
//! - **FileEntries**: every path discovered on a backend, keyed uniquely by
//!   `(backend_id, path)`. Re-crawling refreshes entries instead of
//!   duplicating them.
//!
//! The index is a cache of the remote's shape, not a source of truth: it can
//! always be rebuilt by re-crawling, which is why durability is traded for
//! crawl throughput in the connection defaults.
//!
//! All other crates go through [`Repository`]; nothing outside this crate
//! touches rows or SQL.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{Backend, Credentials, DiscoveredEntry, FileEntry, NewBackend};
pub use crate::repo::Repository;
