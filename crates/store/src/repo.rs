//! Repository for backends and the file index.
//!
//! All access to the two tables goes through here; no other component holds
//! raw rows. Write operations are individually transactional, so a crawl
//! that dies mid-listing leaves every already-upserted entry valid.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Backend, BackendRow, DiscoveredEntry, FileEntry, FileRow, NewBackend};
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Maximum number of rows a name search will return.
const SEARCH_LIMIT: i64 = 200;

/// Repository for managing Backend and FileEntry rows in the index database.
///
/// # Invariants
///
/// - `(backend_id, path)` is unique; re-observing a path refreshes it rather
///   than duplicating it.
/// - Backend ids are dense and 1-based: deleting backend *k* renumbers every
///   backend above *k* (and its files' ownership) down by one, atomically.
/// - Entries are never deleted by a crawl; only backend deletion removes
///   them (by cascade).
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

/// Escape `%`, `_` and `\` so user input can be embedded in a LIKE pattern
/// with `ESCAPE '\'`.
fn like_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Validate a directory path argument and force the trailing slash the
/// prefix scan relies on. Rejects anything that isn't absolute.
fn dir_prefix(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        exn::bail!(ErrorKind::InvalidData("directory path"));
    }
    if path.ends_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("{path}/"))
    }
}

/// True iff `path` is exactly one segment below `prefix` (`prefix` must be
/// slash-terminated). A trailing slash on the remainder (directories) is
/// allowed.
fn is_direct_child(prefix: &str, path: &str) -> bool {
    let Some(remainder) = path.strip_prefix(prefix) else {
        return false;
    };
    let remainder = remainder.strip_suffix('/').unwrap_or(remainder);
    !remainder.is_empty() && !remainder.contains('/')
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Backends
    // =========================================================================

    /// Register a backend, assigning the smallest unused positive id.
    ///
    /// Ids stay dense: after registering into `{1, 2, 4}` the new backend
    /// gets id 3. Runs in a transaction so two concurrent registrations
    /// can't pick the same id.
    pub async fn insert_backend(&self, new: &NewBackend) -> Result<Backend> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let ids: Vec<i64> = sqlx::query_scalar(include_str!("../queries/list_backend_ids.sql"))
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut id = 1i64;
        for existing in ids {
            if existing == id {
                id += 1;
            } else {
                break;
            }
        }
        sqlx::query(include_str!("../queries/insert_backend.sql"))
            .bind(id)
            .bind(new.label())
            .bind(&new.url)
            .bind(new.credentials.is_some() as i64)
            .bind(new.credentials.as_ref().map(|c| c.username.as_str()))
            .bind(new.credentials.as_ref().map(|c| c.password.as_str()))
            .bind(new.rescan_interval.map(i64::from))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        self.get_backend(id)
            .await?
            .ok_or_raise(|| ErrorKind::Integrity(format!("backend {id} missing after insert")))
    }

    /// Replace a backend's descriptor fields. `scanned_at` is untouched.
    pub async fn update_backend(&self, id: i64, new: &NewBackend) -> Result<Backend> {
        let result = sqlx::query(include_str!("../queries/update_backend.sql"))
            .bind(new.label())
            .bind(&new.url)
            .bind(new.credentials.is_some() as i64)
            .bind(new.credentials.as_ref().map(|c| c.username.as_str()))
            .bind(new.credentials.as_ref().map(|c| c.password.as_str()))
            .bind(new.rescan_interval.map(i64::from))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::BackendNotFound(id));
        }
        self.get_backend(id)
            .await?
            .ok_or_raise(|| ErrorKind::Integrity(format!("backend {id} missing after update")))
    }

    /// Delete a backend, its file entries, and compact the id space.
    ///
    /// Every backend with a higher id is renumbered down by one, with its
    /// files' `backend_id` renumbered in lockstep. Single transaction; the
    /// foreign key is deferred so intermediate states are tolerated until
    /// COMMIT.
    pub async fn delete_backend(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query(include_str!("../queries/delete_backend.sql"))
            .bind(id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::BackendNotFound(id));
        }
        let higher: Vec<i64> = sqlx::query_scalar(include_str!("../queries/backend_ids_above.sql"))
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        // Ascending order: each old id shifts into the gap left by the one
        // before it.
        for old in higher {
            let new = old - 1;
            sqlx::query(include_str!("../queries/renumber_files.sql"))
                .bind(new)
                .bind(old)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let moved = sqlx::query(include_str!("../queries/renumber_backend.sql"))
                .bind(new)
                .bind(old)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if moved.rows_affected() != 1 {
                exn::bail!(ErrorKind::Integrity(format!(
                    "renumbering backend {old} -> {new} touched {} rows",
                    moved.rows_affected()
                )));
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(backend = id, shifted = "higher ids", "backend deleted");
        Ok(())
    }

    /// Get a backend by id.
    pub async fn get_backend(&self, id: i64) -> Result<Option<Backend>> {
        let row: Option<BackendRow> = sqlx::query_as(include_str!("../queries/get_backend.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Backend::try_from).transpose()
    }

    /// List all backends in id order.
    pub async fn list_backends(&self) -> Result<Vec<Backend>> {
        let rows: Vec<BackendRow> = sqlx::query_as(include_str!("../queries/list_backends.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Backend::try_from).collect()
    }

    /// Stamp a backend's last-synchronized timestamp.
    ///
    /// Called by the sync orchestrator after a crawl completes; a failed
    /// crawl never advances the stamp, which keeps the backend eligible for
    /// the next due check.
    pub async fn touch_backend_scanned_at(&self, id: i64, when: UtcDateTime) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/touch_backend.sql"))
            .bind(when.unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::BackendNotFound(id));
        }
        Ok(())
    }

    // =========================================================================
    // File index: writes
    // =========================================================================

    /// Insert a discovered entry, or refresh it if `(backend_id, path)`
    /// already exists.
    ///
    /// A refresh updates `scanned_at` always, and `size`/`modified_at` only
    /// when the crawl actually observed them; everything else is preserved.
    /// Idempotent and order-independent within a crawl.
    pub async fn upsert_entry(
        &self,
        backend_id: i64,
        entry: &DiscoveredEntry,
        scanned_at: UtcDateTime,
    ) -> Result<()> {
        let size = entry
            .size
            .map(|v| i64::try_from(v).or_raise(|| ErrorKind::InvalidData("file size")))
            .transpose()?;
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(backend_id)
            .bind(&entry.path)
            .bind(&entry.name)
            .bind(&entry.url)
            .bind(entry.is_directory as i64)
            .bind(size)
            .bind(entry.modified_at.map(|ts| ts.unix_timestamp()))
            .bind(scanned_at.unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // File index: reads
    // =========================================================================

    /// Look up a single entry by its canonical path.
    pub async fn lookup_entry(&self, backend_id: i64, path: &str) -> Result<Option<FileEntry>> {
        let row: Option<FileRow> = sqlx::query_as(include_str!("../queries/lookup_entry.sql"))
            .bind(backend_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(FileEntry::try_from).transpose()
    }

    /// Directory paths exactly one segment below `dir_path`.
    ///
    /// This feeds crawl recursion: after upserting a listing, the engine
    /// asks the index which child directories it now knows about. Derived
    /// from path strings at query time; there is no materialized tree.
    pub async fn child_directories(&self, backend_id: i64, dir_path: &str) -> Result<Vec<String>> {
        let prefix = dir_prefix(dir_path)?;
        let paths: Vec<String> = sqlx::query_scalar(include_str!("../queries/child_directories.sql"))
            .bind(backend_id)
            .bind(format!("{}%", like_escape(&prefix)))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(paths.into_iter().filter(|p| is_direct_child(&prefix, p)).collect())
    }

    /// Entries exactly one segment below `path`, directories first, then
    /// lexicographic by name.
    pub async fn direct_children(&self, backend_id: i64, path: &str) -> Result<Vec<FileEntry>> {
        let prefix = dir_prefix(path)?;
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/entries_under_prefix.sql"))
            .bind(backend_id)
            .bind(format!("{}%", like_escape(&prefix)))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut children = Vec::new();
        for row in rows {
            let entry = FileEntry::try_from(row)?;
            if is_direct_child(&prefix, &entry.path) {
                children.push(entry);
            }
        }
        Ok(children)
    }

    /// Case-insensitive substring search over leaf names, files only,
    /// ordered by name and capped at 200 rows.
    ///
    /// Case folding is SQLite's `LIKE` (ASCII only); documented product
    /// decision, see DESIGN.md.
    pub async fn search_names(&self, query: &str) -> Result<Vec<FileEntry>> {
        let rows: Vec<FileRow> = sqlx::query_as(include_str!("../queries/search_names.sql"))
            .bind(format!("%{}%", like_escape(query)))
            .bind(SEARCH_LIMIT)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileEntry::try_from).collect()
    }

    /// Total number of indexed entries for a backend.
    pub async fn count_entries(&self, backend_id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_entries.sql"))
            .bind(backend_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    fn backend(url: &str) -> NewBackend {
        NewBackend { url: url.to_string(), ..Default::default() }
    }

    fn entry(path: &str, url_base: &str) -> DiscoveredEntry {
        let is_directory = path.ends_with('/');
        let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string();
        DiscoveredEntry {
            path: path.to_string(),
            name,
            url: format!("{}{}", url_base, path),
            is_directory,
            size: None,
            modified_at: None,
        }
    }

    fn now() -> UtcDateTime {
        UtcDateTime::now()
    }

    #[test]
    fn test_like_escape() {
        assert_eq!(like_escape("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(like_escape("plain"), "plain");
    }

    #[rstest::rstest]
    #[case("/a/", "/a/b/", true)]
    #[case("/a/", "/a/d", true)]
    #[case("/a/", "/a/b/c", false)]
    #[case("/a/", "/a/", false)]
    #[case("/a/", "/other/x", false)]
    #[case("/", "/top.txt", true)]
    fn test_is_direct_child(#[case] prefix: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_direct_child(prefix, path), expected);
    }

    #[tokio::test]
    async fn test_insert_assigns_smallest_unused_id() {
        let repo = repo().await;
        let one = repo.insert_backend(&backend("https://one.example")).await.unwrap();
        let two = repo.insert_backend(&backend("https://two.example")).await.unwrap();
        assert_eq!((one.id, two.id), (1, 2));
        repo.delete_backend(1).await.unwrap();
        // Old id 2 has been renumbered down to 1; the next insert follows it.
        let three = repo.insert_backend(&backend("https://three.example")).await.unwrap();
        assert_eq!(three.id, 2);
    }

    #[tokio::test]
    async fn test_credentials_round_trip() {
        let repo = repo().await;
        let new = NewBackend {
            name: Some("private".to_string()),
            url: "https://private.example".to_string(),
            credentials: Some(Credentials {
                username: "admin".to_string(),
                password: "hunter2".to_string(),
            }),
            rescan_interval: Some(30),
        };
        let created = repo.insert_backend(&new).await.unwrap();
        let fetched = repo.get_backend(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.credentials.unwrap().password, "hunter2");
        assert_eq!(fetched.rescan_interval, Some(30));
        assert_eq!(fetched.scanned_at, None);
    }

    #[tokio::test]
    async fn test_update_unknown_backend_fails() {
        let repo = repo().await;
        let err = repo.update_backend(42, &backend("https://nope.example")).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::BackendNotFound(42)));
    }

    #[tokio::test]
    async fn test_upsert_refreshes_without_clobbering_metadata() {
        let repo = repo().await;
        let b = repo.insert_backend(&backend("https://files.example")).await.unwrap();
        let first_scan = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut seen = entry("/readme.txt", "https://files.example");
        seen.size = Some(2048);
        repo.upsert_entry(b.id, &seen, first_scan).await.unwrap();

        // Second observation without size: refreshes the stamp, keeps size.
        let second_scan = UtcDateTime::from_unix_timestamp(1_700_000_600).unwrap();
        let seen_again = entry("/readme.txt", "https://files.example");
        repo.upsert_entry(b.id, &seen_again, second_scan).await.unwrap();

        let stored = repo.lookup_entry(b.id, "/readme.txt").await.unwrap().unwrap();
        assert_eq!(stored.size, Some(2048));
        assert_eq!(stored.scanned_at, second_scan);
        assert_eq!(repo.count_entries(b.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_direct_children_filter() {
        let repo = repo().await;
        let b = repo.insert_backend(&backend("https://files.example")).await.unwrap();
        let scan = now();
        for path in ["/a/", "/a/b/", "/a/b/c", "/a/d"] {
            repo.upsert_entry(b.id, &entry(path, "https://files.example"), scan).await.unwrap();
        }
        let children = repo.direct_children(b.id, "/a/").await.unwrap();
        let paths: Vec<&str> = children.iter().map(|e| e.path.as_str()).collect();
        // Directories first, then files; /a/b/c is two levels down.
        assert_eq!(paths, vec!["/a/b/", "/a/d"]);

        // Input without the trailing slash behaves identically.
        let children = repo.direct_children(b.id, "/a").await.unwrap();
        assert_eq!(children.len(), 2);

        // Relative paths are rejected before touching the store.
        let err = repo.direct_children(b.id, "a/").await.unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidData("directory path")));
    }

    #[tokio::test]
    async fn test_child_directories_feed() {
        let repo = repo().await;
        let b = repo.insert_backend(&backend("https://files.example")).await.unwrap();
        let scan = now();
        for path in ["/docs/", "/docs/api/", "/docs/api/v2/", "/docs/readme.txt"] {
            repo.upsert_entry(b.id, &entry(path, "https://files.example"), scan).await.unwrap();
        }
        assert_eq!(repo.child_directories(b.id, "/docs/").await.unwrap(), vec!["/docs/api/"]);
        assert_eq!(repo.child_directories(b.id, "/docs/api/").await.unwrap(), vec![
            "/docs/api/v2/"
        ]);
        assert!(repo.child_directories(b.id, "/docs/api/v2/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_names_files_only_ordered() {
        let repo = repo().await;
        let b = repo.insert_backend(&backend("https://files.example")).await.unwrap();
        let scan = now();
        for path in ["/report.pdf", "/sub/report2.txt", "/image.png", "/report/"] {
            repo.upsert_entry(b.id, &entry(path, "https://files.example"), scan).await.unwrap();
        }
        let hits = repo.search_names("report").await.unwrap();
        let names: Vec<&str> = hits.iter().map(|e| e.name.as_str()).collect();
        // The directory named "report" is excluded.
        assert_eq!(names, vec!["report.pdf", "report2.txt"]);

        // Case-insensitive for ASCII.
        let hits = repo.search_names("REPORT").await.unwrap();
        assert_eq!(hits.len(), 2);

        // LIKE metacharacters in the query are literals.
        assert!(repo.search_names("100%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_renumbers_backends_and_files() {
        let repo = repo().await;
        let scan = now();
        for url in ["https://one.example", "https://two.example", "https://three.example"] {
            let b = repo.insert_backend(&backend(url)).await.unwrap();
            repo.upsert_entry(b.id, &entry("/file.txt", url), scan).await.unwrap();
        }

        repo.delete_backend(2).await.unwrap();

        let backends = repo.list_backends().await.unwrap();
        let ids: Vec<i64> = backends.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2]);
        // Old backend 3 is now backend 2, and still owns its file.
        assert_eq!(backends[1].url, "https://three.example");
        let moved = repo.lookup_entry(2, "/file.txt").await.unwrap().unwrap();
        assert_eq!(moved.url, "https://three.example/file.txt");
        // Old backend 2's file went with it.
        assert_eq!(repo.count_entries(1).await.unwrap(), 1);
        assert_eq!(repo.count_entries(2).await.unwrap(), 1);
        assert_eq!(repo.count_entries(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_backend_fails() {
        let repo = repo().await;
        let err = repo.delete_backend(9).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::BackendNotFound(9)));
    }
}
