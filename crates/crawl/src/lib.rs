//! Recursive crawler and sync engine for remote directory listings.
//!
//! Turns Apache/nginx-style autoindex pages into index entries:
//!
//! - [`path`]: canonicalize listing hrefs into absolute index paths
//! - [`fetch`]: HTTP GET with Basic-auth forwarding behind the
//!   [`ListingFetcher`](fetch::ListingFetcher) seam
//! - [`parse`]: anchor extraction and furniture filtering
//! - [`engine`]: worklist-driven traversal with upsert-as-you-go
//! - [`sync`]: single-backend sync and the all-backends sweep
//!
//! Crawling is strictly sequential: one listing in flight per backend, and
//! backends one after another within a sweep. That bounds the load we put on
//! a remote at the cost of wall-clock time.

pub mod engine;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod path;
pub mod sync;

pub use crate::engine::{CrawlEvent, CrawlStats, crawl_backend, crawl_stream};
pub use crate::fetch::{HttpFetcher, ListingFetcher, MockFetcher};
pub use crate::sync::{SyncOutcome, sync_all, sync_backend};
