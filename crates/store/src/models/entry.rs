use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// One indexed remote object (file or directory) belonging to a backend.
///
/// `path` is canonical: absolute, normalized, and slash-terminated iff the
/// entry is a directory. `(backend_id, path)` is unique per index.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: i64,
    pub backend_id: i64,
    pub path: String,
    /// Percent-decoded leaf name.
    pub name: String,
    /// Fully resolved remote URL.
    pub url: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub modified_at: Option<UtcDateTime>,
    /// Last crawl that observed this entry; entries that vanish from the
    /// remote keep their last value (no automatic deletion).
    pub scanned_at: UtcDateTime,
}

/// An entry observed during a crawl, before it is keyed into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntry {
    pub path: String,
    pub name: String,
    pub url: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub modified_at: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    id: i64,
    backend_id: i64,
    path: String,
    name: String,
    url: String,
    is_directory: i64,
    size: Option<i64>,
    modified_at: Option<i64>,
    scanned_at: i64,
}

impl TryFrom<FileRow> for FileEntry {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            backend_id: row.backend_id,
            path: row.path,
            name: row.name,
            url: row.url,
            is_directory: row.is_directory != 0,
            size: row
                .size
                .map(|v| u64::try_from(v).or_raise(|| ErrorKind::InvalidData("file size")))
                .transpose()?,
            modified_at: row
                .modified_at
                .map(|ts| {
                    UtcDateTime::from_unix_timestamp(ts)
                        .or_raise(|| ErrorKind::InvalidData("modification date"))
                })
                .transpose()?,
            scanned_at: UtcDateTime::from_unix_timestamp(row.scanned_at)
                .or_raise(|| ErrorKind::InvalidData("scan date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = FileRow {
            id: 7,
            backend_id: 1,
            path: "/media/shows/".to_string(),
            name: "shows".to_string(),
            url: "https://files.example.net/media/shows/".to_string(),
            is_directory: 1,
            size: None,
            modified_at: None,
            scanned_at: 1_700_000_000,
        };
        let entry = FileEntry::try_from(row).unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.scanned_at.unix_timestamp(), 1_700_000_000);
        assert_eq!(entry.size, None);
    }

    #[test]
    fn test_negative_size_is_rejected() {
        let row = FileRow {
            id: 8,
            backend_id: 1,
            path: "/readme.txt".to_string(),
            name: "readme.txt".to_string(),
            url: "https://files.example.net/readme.txt".to_string(),
            is_directory: 0,
            size: Some(-1),
            modified_at: None,
            scanned_at: 1_700_000_000,
        };
        assert!(FileEntry::try_from(row).is_err());
    }
}
