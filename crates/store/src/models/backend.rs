use crate::error::Error;
use exn::ResultExt;
use time::UtcDateTime;

use crate::error::ErrorKind;

/// Basic-auth credentials for a protected backend.
///
/// Stored as-is; base64 encoding happens at the point the Authorization
/// header is built, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A registered remote source exposing directory listings.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Dense 1-based identifier, reassigned on deletion of a lower id.
    pub id: i64,
    pub name: String,
    /// Base URL of the remote, e.g. `https://files.example.net`.
    pub url: String,
    /// `Some` iff the remote requires Basic auth.
    pub credentials: Option<Credentials>,
    /// Minutes between scheduled rescans; `None` means manual-only.
    pub rescan_interval: Option<u32>,
    /// When the last *successful* full crawl finished.
    pub scanned_at: Option<UtcDateTime>,
}

/// Input for registering or updating a backend.
#[derive(Debug, Clone, Default)]
pub struct NewBackend {
    /// Display name; falls back to the URL when empty.
    pub name: Option<String>,
    pub url: String,
    pub credentials: Option<Credentials>,
    pub rescan_interval: Option<u32>,
}

impl NewBackend {
    /// The display label: the trimmed name, or the URL when no name was given.
    pub fn label(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.url,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BackendRow {
    id: i64,
    name: String,
    url: String,
    auth_enabled: i64,
    username: Option<String>,
    password: Option<String>,
    rescan_interval: Option<i64>,
    scanned_at: Option<i64>,
}

impl TryFrom<BackendRow> for Backend {
    type Error = Error;
    fn try_from(row: BackendRow) -> Result<Self, Self::Error> {
        let credentials = (row.auth_enabled != 0).then(|| Credentials {
            username: row.username.unwrap_or_default(),
            password: row.password.unwrap_or_default(),
        });
        Ok(Self {
            id: row.id,
            name: row.name,
            url: row.url,
            credentials,
            rescan_interval: row
                .rescan_interval
                .map(|v| u32::try_from(v).or_raise(|| ErrorKind::InvalidData("rescan interval")))
                .transpose()?,
            scanned_at: row
                .scanned_at
                .map(|ts| {
                    UtcDateTime::from_unix_timestamp(ts)
                        .or_raise(|| ErrorKind::InvalidData("scan date"))
                })
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_falls_back_to_url() {
        let new = NewBackend { url: "https://files.example.net".to_string(), ..Default::default() };
        assert_eq!(new.label(), "https://files.example.net");
        let new = NewBackend { name: Some("   ".to_string()), ..new };
        assert_eq!(new.label(), "https://files.example.net");
        let new = NewBackend { name: Some("  media box ".to_string()), ..new };
        assert_eq!(new.label(), "media box");
    }

    #[test]
    fn test_row_without_auth_has_no_credentials() {
        let row = BackendRow {
            id: 1,
            name: "media box".to_string(),
            url: "https://files.example.net".to_string(),
            auth_enabled: 0,
            // Stale credential columns from before auth was switched off
            // must not leak into the model.
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            rescan_interval: Some(60),
            scanned_at: None,
        };
        let backend = Backend::try_from(row).unwrap();
        assert_eq!(backend.credentials, None);
        assert_eq!(backend.rescan_interval, Some(60));
    }

    #[test]
    fn test_row_with_auth() {
        let row = BackendRow {
            id: 2,
            name: "private".to_string(),
            url: "https://private.example.net".to_string(),
            auth_enabled: 1,
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            rescan_interval: None,
            scanned_at: Some(1_700_000_000),
        };
        let backend = Backend::try_from(row).unwrap();
        let creds = backend.credentials.expect("credentials present");
        assert_eq!(creds.username, "admin");
        assert_eq!(backend.scanned_at.unwrap().unix_timestamp(), 1_700_000_000);
    }
}
