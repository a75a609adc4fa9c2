//! Per-backend sync and the multi-backend sweep.

use autodex_store::{Backend, Repository};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;
use tracing::instrument;

use crate::engine::{CrawlStats, MAX_DIRECTORIES, crawl_backend};
use crate::error::{ErrorKind, Result};
use crate::fetch::ListingFetcher;

/// One backend's result within a sweep.
#[derive(Debug)]
pub struct SyncOutcome {
    pub backend: Backend,
    pub result: Result<CrawlStats>,
}

/// Crawl one backend from `/` and stamp its last-synchronized timestamp.
///
/// The stamp only advances on success; a failed crawl leaves `scanned_at`
/// untouched so the backend stays eligible for the next due check.
#[instrument(skip(repo, fetcher))]
pub async fn sync_backend(
    repo: &Repository,
    fetcher: &dyn ListingFetcher,
    id: i64,
) -> Result<CrawlStats> {
    let backend = repo
        .get_backend(id)
        .await
        .or_raise(|| ErrorKind::Store)?
        .ok_or_raise(|| ErrorKind::BackendNotFound(id))?;
    let stats = crawl_backend(repo, fetcher, &backend, MAX_DIRECTORIES).await?;
    repo.touch_backend_scanned_at(id, UtcDateTime::now())
        .await
        .or_raise(|| ErrorKind::Store)?;
    Ok(stats)
}

/// Sweep every registered backend sequentially, in id order.
///
/// This is what the external scheduler trigger invokes; whether a backend is
/// actually "due" is the scheduler's decision, not ours. A failure in one
/// backend's crawl is reported in its outcome and does not stop the sweep.
#[instrument(skip_all)]
pub async fn sync_all(repo: &Repository, fetcher: &dyn ListingFetcher) -> Result<Vec<SyncOutcome>> {
    let backends = repo.list_backends().await.or_raise(|| ErrorKind::Store)?;
    let mut outcomes = Vec::with_capacity(backends.len());
    for backend in backends {
        let result = sync_backend(repo, fetcher, backend.id).await;
        if let Err(err) = &result {
            tracing::warn!(backend = backend.id, url = %backend.url, "sync failed: {err}");
        }
        outcomes.push(SyncOutcome { backend, result });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use autodex_store::{Database, NewBackend};

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    async fn add_backend(repo: &Repository, url: &str) -> Backend {
        repo.insert_backend(&NewBackend { url: url.to_string(), ..Default::default() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_unknown_backend() {
        let repo = repo().await;
        let fetcher = MockFetcher::default();
        let err = sync_backend(&repo, &fetcher, 7).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::BackendNotFound(7)));
    }

    #[tokio::test]
    async fn test_successful_sync_stamps_scanned_at() {
        let repo = repo().await;
        let backend = add_backend(&repo, "https://one.example").await;
        assert_eq!(backend.scanned_at, None);
        let fetcher =
            MockFetcher::with_pages([("https://one.example/", r#"<a href="a.txt">a</a>"#)]);

        sync_backend(&repo, &fetcher, backend.id).await.unwrap();
        let stamped = repo.get_backend(backend.id).await.unwrap().unwrap();
        assert!(stamped.scanned_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_sync_leaves_scanned_at_alone() {
        let repo = repo().await;
        let backend = add_backend(&repo, "https://one.example").await;
        let fetcher = MockFetcher::default(); // serves nothing: root fetch 404s

        sync_backend(&repo, &fetcher, backend.id).await.unwrap_err();
        let untouched = repo.get_backend(backend.id).await.unwrap().unwrap();
        assert_eq!(untouched.scanned_at, None);
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        let repo = repo().await;
        let broken = add_backend(&repo, "https://broken.example").await;
        let healthy = add_backend(&repo, "https://healthy.example").await;
        let fetcher = MockFetcher::with_pages([(
            "https://healthy.example/",
            r#"<a href="file.bin">file.bin</a>"#,
        )]);

        let outcomes = sync_all(&repo, &fetcher).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].backend.id, broken.id);
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].backend.id, healthy.id);
        assert!(outcomes[1].result.is_ok());

        // Only the healthy backend advanced.
        assert!(repo.get_backend(broken.id).await.unwrap().unwrap().scanned_at.is_none());
        assert!(repo.get_backend(healthy.id).await.unwrap().unwrap().scanned_at.is_some());
    }
}
