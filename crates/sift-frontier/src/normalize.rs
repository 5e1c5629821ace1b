use url::Url;

use crate::error::FrontierError;

/// File extensions that never point to a crawlable page.
const SKIPPED_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp", ".svg", ".ico", ".css", ".js", ".map",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".7z", ".tar",
    ".gz", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".exe", ".msi", ".dmg", ".app",
];

/// Path fragments that identify API endpoints and downloads rather than pages.
const SKIPPED_PATTERNS: &[&str] = &[
    "/api/",
    "/ajax/",
    "/json/",
    "/rss/",
    "?download=",
    "&download=",
];

/// Canonicalizes `raw` into the key used for frontier deduplication.
///
/// Scheme and host are lowercased, default ports stripped, the fragment
/// removed, query parameters sorted by key, and a single trailing slash
/// dropped (the root path stays `/`). Two URLs differing only in those
/// respects normalize to the same key.
pub fn normalize(raw: &str) -> Result<String, FrontierError> {
    let mut url = Url::parse(raw).map_err(|_| FrontierError::InvalidUrl(raw.to_string()))?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(FrontierError::InvalidUrl(raw.to_string()));
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = url.path().to_owned();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    Ok(url.into())
}

/// Quick pre-filter for discovered links: only http(s) URLs that don't
/// point at static assets, archives or API endpoints are worth queueing.
pub fn is_fetchable(raw: &str) -> bool {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return false,
    };
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return false;
    }

    let path = url.path().to_ascii_lowercase();
    if SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }

    let lower = raw.to_ascii_lowercase();
    !SKIPPED_PATTERNS.iter().any(|pat| lower.contains(pat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_and_slash_and_query_order_are_equivalent() {
        let variants = [
            "https://example.com/docs?b=2&a=1",
            "https://example.com/docs/?b=2&a=1",
            "https://example.com/docs?a=1&b=2#section",
            "HTTPS://EXAMPLE.COM/docs/?a=1&b=2",
            "https://example.com:443/docs?b=2&a=1",
        ];
        let keys: Vec<_> = variants.iter().map(|u| normalize(u).unwrap()).collect();
        assert!(keys.iter().all(|k| k == &keys[0]), "{keys:?}");
        assert_eq!(keys[0], "https://example.com/docs?a=1&b=2");
    }

    #[test]
    fn root_path_is_retained() {
        assert_eq!(
            normalize("http://example.com").unwrap(),
            "http://example.com/"
        );
        assert_eq!(
            normalize("http://example.com/").unwrap(),
            "http://example.com/"
        );
    }

    #[test]
    fn default_port_is_stripped() {
        assert_eq!(
            normalize("http://example.com:80/a").unwrap(),
            "http://example.com/a"
        );
        assert_eq!(
            normalize("http://example.com:8080/a").unwrap(),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn invalid_urls_are_rejected() {
        assert!(normalize("example.com/page").is_err());
        assert!(normalize("mailto:someone@example.com").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn fetchable_filters_assets_and_apis() {
        assert!(is_fetchable("https://example.com/news/mining"));
        assert!(!is_fetchable("https://example.com/logo.png"));
        assert!(!is_fetchable("https://example.com/report.PDF"));
        assert!(!is_fetchable("https://example.com/api/v1/items"));
        assert!(!is_fetchable("ftp://example.com/file"));
        assert!(!is_fetchable("javascript:void(0)"));
    }
}
