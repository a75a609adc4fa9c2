//! Extraction of entries from autoindex markup.
//!
//! Apache's `mod_autoindex` and nginx's `autoindex` both boil down to a page
//! of anchors: one per child, plus furniture (a parent-directory link and,
//! for Apache, `?C=N;O=D`-style sort links). We take every `a[href]`, drop
//! the furniture, and let the href's trailing slash tell files and
//! directories apart.

use scraper::{Html, Selector};
use std::sync::LazyLock;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector is valid"));

/// An anchor pulled off a listing page, unresolved and unnormalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub href: String,
    /// Directory iff the href ends with `/`.
    pub is_directory: bool,
}

/// Extract content entries from listing markup.
///
/// Filters hrefs starting with `..` (parent navigation) or `?` (sort/control
/// links). No dedup here; `(backend_id, path)` uniqueness in the store is
/// the dedup.
pub fn parse_listing(markup: &str) -> Vec<RawEntry> {
    let document = Html::parse_document(markup);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| !href.is_empty() && !href.starts_with("..") && !href.starts_with('?'))
        .map(|href| RawEntry { href: href.to_string(), is_directory: href.ends_with('/') })
        .collect()
}
