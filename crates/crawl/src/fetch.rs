//! Fetching raw listing markup from a backend.

use async_trait::async_trait;
use autodex_store::Credentials;
use exn::ResultExt;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ErrorKind, Result};

/// Seam between the crawl engine and the network.
///
/// The engine only ever needs "give me the markup behind this URL"; keeping
/// that behind a trait lets tests drive a whole crawl from an in-memory map
/// of pages.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    /// GET `url` and return the response body as text.
    ///
    /// Attaches Basic auth when credentials are given. Non-success statuses
    /// and transport failures are both [`ErrorKind::Fetch`]. No retries at
    /// this layer; the operator re-triggers a sync instead.
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<String>;
}

/// Production fetcher over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with its own configured client.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ListingFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<String> {
        let mut request = self.client.get(url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request
            .send()
            .await
            .or_raise(|| ErrorKind::Fetch { url: url.to_string(), status: None })?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Fetch { url: url.to_string(), status: Some(status.as_u16()) });
        }
        response
            .text()
            .await
            .or_raise(|| ErrorKind::Fetch { url: url.to_string(), status: Some(status.as_u16()) })
    }
}

/// In-memory fetcher for testing.
///
/// Maps URLs to canned markup; unknown URLs and explicitly-failed URLs
/// produce [`ErrorKind::Fetch`]. Fetch counts are recorded so tests can
/// assert each listing is requested exactly once.
///
/// Note: not gated behind `#[cfg(test)]` so that other crates can also use
/// this in their tests.
#[derive(Debug, Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    failing: std::collections::HashSet<String>,
    hits: std::sync::Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    /// Create a mock serving the given `(url, markup)` pairs.
    pub fn with_pages(
        pages: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            pages: pages.into_iter().map(|(url, markup)| (url.into(), markup.into())).collect(),
            ..Default::default()
        }
    }

    /// Make a URL fail with a 500 even if markup is registered for it.
    pub fn fail_on(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// How many times `url` has been fetched.
    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().expect("mock lock poisoned").get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ListingFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _credentials: Option<&Credentials>) -> Result<String> {
        *self.hits.lock().expect("mock lock poisoned").entry(url.to_string()).or_insert(0) += 1;
        if self.failing.contains(url) {
            exn::bail!(ErrorKind::Fetch { url: url.to_string(), status: Some(500) });
        }
        match self.pages.get(url) {
            Some(markup) => Ok(markup.clone()),
            None => exn::bail!(ErrorKind::Fetch { url: url.to_string(), status: Some(404) }),
        }
    }
}
