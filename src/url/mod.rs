//! URL handling for the crawler
//!
//! This module owns the crawl's URL policy:
//! - parsing and canonicalizing the root URL
//! - resolving raw hrefs against a base into absolute HTTP(S) URLs
//! - the same-origin test that gates crawling and link probes
//! - the canonical form used to deduplicate broken links

use thiserror::Error;
use url::Url;

/// Root-URL validation errors.
#[derive(Debug, Error)]
pub enum RootUrlError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("missing scheme or host")]
    MissingHost,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// Parses and canonicalizes the root URL.
///
/// The URL must be absolute, have a host, and use http or https. The
/// fragment is dropped. Display canonicalization (trailing-slash handling)
/// happens in [`root_display`].
pub fn parse_root_url(raw: &str) -> Result<Url, RootUrlError> {
    let mut parsed = Url::parse(raw)?;

    if parsed.host_str().is_none() {
        return Err(RootUrlError::MissingHost);
    }

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(RootUrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Canonical display form of the root URL.
///
/// A bare `/` path is dropped so the reported root reads
/// `https://example.com` rather than `https://example.com/`. This may
/// differ byte-for-byte from the configured URL; report consumers compare
/// against the stripped form.
pub fn root_display(url: &Url) -> String {
    if url.path() != "/" || url.query().is_some() {
        return url.to_string();
    }

    let mut out = url.to_string();
    if out.ends_with('/') {
        out.pop();
    }

    out
}

/// Resolves a raw href against `base` into an absolute HTTP(S) URL.
///
/// Returns `None` for hrefs the crawler ignores: empty, fragment-only,
/// non-HTTP(S) schemes (`mailto:`, `javascript:`, `data:`, ...), and
/// anything that fails to parse. Protocol-relative hrefs inherit the base
/// scheme. The resolved URL has its fragment removed.
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let mut resolved = match Url::parse(trimmed) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(trimmed).ok()?,
        Err(_) => return None,
    };

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    resolved.set_fragment(None);

    Some(resolved.to_string())
}

/// Reports whether `raw` shares scheme and host-with-port with `base`.
///
/// `http://example.com` and `https://example.com` are different origins, as
/// are `https://example.com` and `https://example.com:8443`. Hosts are
/// compared after parser normalization (lowercasing, default-port removal).
pub fn same_origin(base: &Url, raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };

    parsed.scheme() == base.scheme()
        && parsed.host_str() == base.host_str()
        && parsed.port() == base.port()
}

/// Canonical form for broken-link deduplication.
///
/// Lowercases scheme and host, drops default ports and the fragment, and
/// strips a single trailing slash from the path (so `/missing/` collapses
/// with `/missing`, and a bare `/` flattens to the empty path). Unparseable
/// input is returned unchanged.
pub fn canonical_broken_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    let mut path = parsed.path().to_string();
    if path.ends_with('/') {
        path.pop();
    }

    let mut out = format!("{}://", parsed.scheme());
    if let Some(host) = parsed.host_str() {
        out.push_str(host);
    }
    if let Some(port) = parsed.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(&path);
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_parse_root_url_valid() {
        let url = parse_root_url("https://example.com/a").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_parse_root_url_strips_fragment() {
        let url = parse_root_url("https://example.com/a#frag").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_parse_root_url_rejects_relative() {
        assert!(parse_root_url("example.com/a").is_err());
    }

    #[test]
    fn test_parse_root_url_rejects_non_http_scheme() {
        assert!(matches!(
            parse_root_url("ftp://example.com/a"),
            Err(RootUrlError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_parse_root_url_rejects_garbage() {
        assert!(parse_root_url("://broken").is_err());
    }

    #[test]
    fn test_root_display_strips_bare_slash() {
        let url = parse_root_url("https://example.com/").unwrap();
        assert_eq!(root_display(&url), "https://example.com");
    }

    #[test]
    fn test_root_display_keeps_real_path() {
        let url = parse_root_url("https://example.com/docs").unwrap();
        assert_eq!(root_display(&url), "https://example.com/docs");
    }

    #[test]
    fn test_resolve_relative_href() {
        assert_eq!(
            resolve(&base(), "/a"),
            Some("https://example.com/a".to_string())
        );
    }

    #[test]
    fn test_resolve_absolute_href() {
        assert_eq!(
            resolve(&base(), "https://other.com/x"),
            Some("https://other.com/x".to_string())
        );
    }

    #[test]
    fn test_resolve_protocol_relative_inherits_scheme() {
        assert_eq!(
            resolve(&base(), "//cdn.example.com/x"),
            Some("https://cdn.example.com/x".to_string())
        );
    }

    #[test]
    fn test_resolve_drops_fragment() {
        assert_eq!(
            resolve(&base(), "https://example.com/b#f"),
            Some("https://example.com/b".to_string())
        );
    }

    #[test]
    fn test_resolve_rejects_empty_and_fragment_only() {
        assert_eq!(resolve(&base(), ""), None);
        assert_eq!(resolve(&base(), "   "), None);
        assert_eq!(resolve(&base(), "#section"), None);
    }

    #[test]
    fn test_resolve_rejects_non_http_schemes() {
        assert_eq!(resolve(&base(), "mailto:x@y.z"), None);
        assert_eq!(resolve(&base(), "javascript:void(0)"), None);
        assert_eq!(resolve(&base(), "data:text/html,hi"), None);
        assert_eq!(resolve(&base(), "tel:+123456"), None);
    }

    #[test]
    fn test_same_origin_scheme_and_port_sensitive() {
        let root = base();
        assert!(same_origin(&root, "https://example.com/c"));
        assert!(!same_origin(&root, "http://example.com/a"));
        assert!(!same_origin(&root, "https://example.com:8443/b"));
        assert!(!same_origin(&root, "https://other.com/"));
        assert!(!same_origin(&root, "not a url"));
    }

    #[test]
    fn test_same_origin_explicit_port() {
        let root = Url::parse("https://example.com:8443").unwrap();
        assert!(same_origin(&root, "https://example.com:8443/x"));
        assert!(!same_origin(&root, "https://example.com/x"));
    }

    #[test]
    fn test_canonical_flattens_root_path() {
        assert_eq!(
            canonical_broken_url("https://example.com/"),
            "https://example.com"
        );
    }

    #[test]
    fn test_canonical_strips_one_trailing_slash() {
        assert_eq!(
            canonical_broken_url("https://example.com/missing/"),
            "https://example.com/missing"
        );
        assert_eq!(
            canonical_broken_url("https://example.com/missing"),
            "https://example.com/missing"
        );
    }

    #[test]
    fn test_canonical_lowercases_and_drops_default_port() {
        assert_eq!(
            canonical_broken_url("HTTPS://EXAMPLE.COM:443/Missing"),
            "https://example.com/Missing"
        );
    }

    #[test]
    fn test_canonical_keeps_explicit_port_and_query() {
        assert_eq!(
            canonical_broken_url("https://example.com:8443/a?b=1#frag"),
            "https://example.com:8443/a?b=1"
        );
    }

    #[test]
    fn test_canonical_passes_through_unparseable() {
        assert_eq!(canonical_broken_url("not a url"), "not a url");
    }
}
