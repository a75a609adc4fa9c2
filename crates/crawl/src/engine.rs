//! Recursive synchronization of one backend's directory tree.
//!
//! The original naive shape of this problem is "recurse into whatever the
//! remote says exists", which terminates only if the remote is honest. Here
//! the recursion is an explicit worklist plus a visited set keyed by
//! canonical path, with a hard cap on total directories, so an adversarial
//! or buggy listing can't walk us forever.
//!
//! Discovery is re-query based: after upserting a listing we ask the index
//! which direct child directories it now knows about under that path, and
//! push the unvisited ones. That makes the traversal order-independent for
//! correctness; order only affects which child is visited first.

use async_stream::try_stream;
use autodex_store::{Backend, DiscoveredEntry, Repository};
use exn::ResultExt;
use futures::{Stream, StreamExt, pin_mut};
use std::collections::{HashSet, VecDeque};
use time::UtcDateTime;
use tracing::instrument;
use url::Url;

use crate::error::{ErrorKind, Result};
use crate::fetch::ListingFetcher;
use crate::parse::parse_listing;
use crate::path::normalize;

/// Default safety valve, used by the sync orchestrator: a crawl that is
/// still discovering new directories past this point fails with
/// [`ErrorKind::TraversalCap`] instead of truncating silently.
pub const MAX_DIRECTORIES: usize = 100_000;

/// Progress events emitted while a crawl runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// A directory listing is about to be fetched.
    DirectoryStarted { path: String },
    /// An entry was normalized and upserted into the index.
    EntryObserved { path: String, is_directory: bool },
    /// The worklist drained; always the final event of a successful crawl.
    Finished(CrawlStats),
}

/// Summary of a completed crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    /// Directories fetched (after visited-set dedup).
    pub directories: usize,
    /// Entries upserted, counting re-observations.
    pub entries: usize,
    pub started: UtcDateTime,
    pub finished: UtcDateTime,
}

/// Crawl `backend` from `/`, yielding progress events.
///
/// One listing is fetched at a time; every upsert is committed before the
/// next fetch, so a failure mid-crawl leaves everything observed so far
/// valid in the index. Any fetch failure ends the stream with that error;
/// there is no skip-and-continue (documented tradeoff, see DESIGN.md).
///
/// `max_directories` bounds the traversal: once more than that many
/// directories have been visited the stream ends with
/// [`ErrorKind::TraversalCap`]. Callers without a reason to differ pass
/// [`MAX_DIRECTORIES`].
pub fn crawl_stream<'a>(
    repo: &'a Repository,
    fetcher: &'a dyn ListingFetcher,
    backend: &'a Backend,
    max_directories: usize,
) -> impl Stream<Item = Result<CrawlEvent>> + 'a {
    try_stream! {
        let started = UtcDateTime::now();
        let base = backend.url.trim_end_matches('/').to_string();
        let mut pending: VecDeque<String> = VecDeque::from(["/".to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut entries = 0usize;

        while let Some(dir) = pending.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            if visited.len() > max_directories {
                Err(exn::Exn::from(ErrorKind::TraversalCap(max_directories)))?;
            }
            yield CrawlEvent::DirectoryStarted { path: dir.clone() };

            let listing_url = Url::parse(&format!("{base}{dir}"))
                .or_raise(|| ErrorKind::InvalidUrl(format!("{base}{dir}")))?;
            let markup = fetcher
                .fetch(listing_url.as_str(), backend.credentials.as_ref())
                .await?;

            let stamp = UtcDateTime::now();
            for raw in parse_listing(&markup) {
                let normalized = normalize(&raw.href, &listing_url)?;
                let discovered = DiscoveredEntry {
                    path: normalized.path.clone(),
                    name: normalized.name,
                    url: normalized.url,
                    is_directory: normalized.is_directory,
                    size: None,
                    modified_at: None,
                };
                repo.upsert_entry(backend.id, &discovered, stamp)
                    .await
                    .or_raise(|| ErrorKind::Store)?;
                entries += 1;
                yield CrawlEvent::EntryObserved {
                    path: normalized.path,
                    is_directory: normalized.is_directory,
                };
            }

            let children = repo
                .child_directories(backend.id, &dir)
                .await
                .or_raise(|| ErrorKind::Store)?;
            for child in children {
                if !visited.contains(&child) {
                    pending.push_back(child);
                }
            }
        }

        yield CrawlEvent::Finished(CrawlStats {
            directories: visited.len(),
            entries,
            started,
            finished: UtcDateTime::now(),
        });
    }
}

/// Drive [`crawl_stream`] to completion and return its stats.
#[instrument(skip_all, fields(backend = backend.id, url = %backend.url))]
pub async fn crawl_backend(
    repo: &Repository,
    fetcher: &dyn ListingFetcher,
    backend: &Backend,
    max_directories: usize,
) -> Result<CrawlStats> {
    let started = UtcDateTime::now();
    let mut stats = CrawlStats { directories: 0, entries: 0, started, finished: started };
    let events = crawl_stream(repo, fetcher, backend, max_directories);
    pin_mut!(events);
    while let Some(event) = events.next().await {
        match event? {
            CrawlEvent::DirectoryStarted { path } => {
                tracing::debug!(%path, "fetching directory listing");
            }
            CrawlEvent::EntryObserved { .. } => {}
            CrawlEvent::Finished(finished) => stats = finished,
        }
    }
    tracing::info!(
        directories = stats.directories,
        entries = stats.entries,
        "crawl finished"
    );
    Ok(stats)
}
