//! Layered configuration for autodex.
//!
//! Settings are merged from three sources, later ones winning:
//! 1. compiled-in defaults,
//! 2. a TOML file (`autodex.toml` in the working directory, or an explicit
//!    path),
//! 3. `AUTODEX_*` environment variables (`__` separates nesting, e.g.
//!    `AUTODEX_HTTP__TIMEOUT_SECS=10`).

pub mod error;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use exn::ResultExt;

use crate::error::{ErrorKind, Result};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "AUTODEX_";
/// Default configuration file looked up in the working directory.
const DEFAULT_FILE: &str = "autodex.toml";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub http: HttpSettings,
    pub crawl: CrawlSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            http: HttpSettings::default(),
            crawl: CrawlSettings::default(),
        }
    }
}

/// Where the index lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite file; created on first connect.
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

/// Outbound HTTP behavior, shared by the crawler and the content proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Per-request timeout. Listing pages are small; anything slower than
    /// this is a remote in trouble.
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("autodex/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

/// Crawl behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Seconds the scheduler waits between sweep checks. The "due" decision
    /// itself belongs to the scheduler, not the sync engine.
    pub sweep_interval_secs: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self { sweep_interval_secs: 60 }
    }
}

impl Settings {
    /// Load settings from defaults, then the TOML file, then environment.
    ///
    /// With an explicit `file`, that file must exist; the implicit
    /// `autodex.toml` is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match file {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file(DEFAULT_FILE)),
        };
        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Invalid)?;
        tracing::debug!(database = %settings.database.path.display(), "configuration loaded");
        Ok(settings)
    }
}

/// Platform data directory, falling back to the working directory when the
/// platform refuses to name one.
fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "autodex")
        .map(|dirs| dirs.data_dir().join("index.db"))
        .unwrap_or_else(|| PathBuf::from("autodex.db"))
}
