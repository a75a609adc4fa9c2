//! Content proxy: stream an indexed file from its remote, transparently.
//!
//! Resolves a `(backend, path)` pair to the remote URL recorded at crawl
//! time, forwards the client's `Range` header and the backend's Basic auth,
//! and hands back the upstream body as a byte stream without buffering it.
//! Response metadata is preserved (status 200/206 and the cache/range
//! headers) except `Content-Disposition`, which is forced to inline so
//! browsers render media instead of downloading it.

pub mod error;

use bytes::Bytes;
use exn::{OptionExt, ResultExt};
use futures::{Stream, TryStreamExt};
use reqwest::header::{self, HeaderMap};
use std::pin::Pin;
use tracing::instrument;

use autodex_store::Repository;

use crate::error::{ErrorKind, Result};

/// Body bytes as they arrive from the remote.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Upstream headers forwarded to the client verbatim.
const FORWARDED_HEADERS: [&str; 6] = [
    "content-type",
    "accept-ranges",
    "content-range",
    "content-length",
    "cache-control",
    "etag",
];

/// A resolved remote response ready to relay.
///
/// Transport-agnostic on purpose: the presentation layer decides how these
/// become an actual HTTP response.
pub struct ProxiedContent {
    /// Upstream status, 200 or 206 in practice.
    pub status: u16,
    /// Lowercase header name/value pairs, already filtered and with the
    /// disposition override applied.
    pub headers: Vec<(String, String)>,
    pub body: ByteStream,
}

impl std::fmt::Debug for ProxiedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxiedContent")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Streams indexed files from their backing remote.
#[derive(Debug, Clone)]
pub struct ContentProxy {
    repo: Repository,
    client: reqwest::Client,
}

impl ContentProxy {
    pub fn new(repo: Repository, client: reqwest::Client) -> Self {
        Self { repo, client }
    }

    /// Resolve `(backend_id, path)` and open a streaming GET against the
    /// remote.
    ///
    /// `range` is the client's `Range` header value, forwarded verbatim when
    /// present. Unknown backend or path is a 404-equivalent; an upstream
    /// non-success status is surfaced with its status code preserved.
    #[instrument(skip(self), fields(backend = backend_id))]
    pub async fn resolve_and_stream(
        &self,
        backend_id: i64,
        path: &str,
        range: Option<&str>,
    ) -> Result<ProxiedContent> {
        let backend = self
            .repo
            .get_backend(backend_id)
            .await
            .or_raise(|| ErrorKind::Store)?
            .ok_or_raise(|| ErrorKind::UnknownBackend(backend_id))?;
        let entry = self
            .repo
            .lookup_entry(backend_id, path)
            .await
            .or_raise(|| ErrorKind::Store)?
            .ok_or_raise(|| ErrorKind::FileNotFound(backend_id, path.to_string()))?;

        let mut request = self.client.get(&entry.url);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        if let Some(creds) = &backend.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request
            .send()
            .await
            .or_raise(|| ErrorKind::Transport(entry.url.clone()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Upstream { url: entry.url, status: status.as_u16() });
        }

        let mut headers = forwarded_headers(response.headers());
        headers.push((
            "content-disposition".to_string(),
            inline_disposition(&entry.name),
        ));

        let url = entry.url;
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(move |_| exn::Exn::from(ErrorKind::Transport(url.clone()))),
        );
        Ok(ProxiedContent { status: status.as_u16(), headers, body })
    }
}

/// Copy the allow-listed headers out of an upstream response.
fn forwarded_headers(upstream: &HeaderMap) -> Vec<(String, String)> {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = upstream.get(*name)?;
            let value = value.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Build an `inline` content-disposition with a sanitized filename.
///
/// Quotes, backslashes and control characters would let a filename break
/// out of the quoted-string; they become underscores.
fn inline_disposition(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("inline; filename=\"{sanitized}\"")
}
