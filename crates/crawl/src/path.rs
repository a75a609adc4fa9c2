//! Canonicalization of listing hrefs into index paths.
//!
//! An autoindex page hands us hrefs in whatever shape the server felt like:
//! relative (`sub/`), absolute (`/media/sub/`), percent-encoded, with
//! redundant separators or dot segments. Everything is normalized into one
//! canonical form before it touches the index, so `(backend_id, path)`
//! uniqueness actually means something.

use exn::ResultExt;
use url::Url;

use crate::error::{ErrorKind, Result};

/// A canonicalized listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Absolute, collapsed path; trailing `/` iff a directory.
    pub path: String,
    /// Percent-decoded leaf name.
    pub name: String,
    /// The fully resolved remote URL, with the canonical path spliced in.
    pub url: String,
    pub is_directory: bool,
}

/// Canonicalize `href` as found on the listing page at `listing_url`.
///
/// Deterministic and idempotent: feeding a produced path back through (as an
/// absolute href on the same listing) yields the same string.
pub fn normalize(href: &str, listing_url: &Url) -> Result<Normalized> {
    let mut resolved = listing_url
        .join(href)
        .or_raise(|| ErrorKind::InvalidUrl(href.to_string()))?;
    let is_directory = href.ends_with('/');
    let mut path = collapse(resolved.path());
    if is_directory && !path.ends_with('/') {
        path.push('/');
    }
    // Keep the stored URL in lockstep with the canonical path.
    resolved.set_path(&path);
    let name = leaf_name(&path);
    Ok(Normalized { path, name, url: resolved.into(), is_directory })
}

/// Collapse `.`/`..`/empty segments into an absolute path with single
/// separators and a single leading `/`. `..` at the root is dropped rather
/// than rejected; the parser filters parent links before they get here.
fn collapse(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut out = String::with_capacity(path.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The percent-decoded final segment of a canonical path. Falls back to the
/// raw segment when the encoding isn't valid UTF-8.
fn leaf_name(path: &str) -> String {
    let raw = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn listing(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[rstest]
    #[case("sub/", "https://h/a/", "/a/sub/")]
    #[case("file.txt", "https://h/a/", "/a/file.txt")]
    #[case("/abs/path.bin", "https://h/a/", "/abs/path.bin")]
    #[case("b//c/", "https://h/a/", "/a/b/c/")]
    #[case("./x", "https://h/a/", "/a/x")]
    #[case("sub/", "https://h/", "/sub/")]
    fn normalize_cases(#[case] href: &str, #[case] base: &str, #[case] expected: &str) {
        let normalized = normalize(href, &listing(base)).unwrap();
        assert_eq!(normalized.path, expected);
        assert_eq!(normalized.is_directory, href.ends_with('/'));
    }

    #[test]
    fn test_idempotent() {
        let base = listing("https://h/a/");
        let first = normalize("sub%20dir/", &base).unwrap();
        let second = normalize(&first.path, &base).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.url, second.url);
    }

    #[test]
    fn test_leaf_name_is_percent_decoded() {
        let normalized = normalize("annual%20report.pdf", &listing("https://h/docs/")).unwrap();
        assert_eq!(normalized.name, "annual report.pdf");
        assert_eq!(normalized.path, "/docs/annual%20report.pdf");
    }

    #[test]
    fn test_url_carries_canonical_path() {
        let normalized = normalize("b//c/", &listing("https://h/a/")).unwrap();
        assert_eq!(normalized.url, "https://h/a/b/c/");
    }

    #[test]
    fn test_directory_root() {
        let normalized = normalize("/", &listing("https://h/anything/")).unwrap();
        assert_eq!(normalized.path, "/");
        assert!(normalized.is_directory);
        assert_eq!(normalized.name, "");
    }

    #[rstest]
    #[case("/a//b/./c", "/a/b/c")]
    #[case("/", "/")]
    #[case("//", "/")]
    #[case("/x/../y", "/y")]
    #[case("/../../x", "/x")]
    fn collapse_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(collapse(input), expected);
    }
}
