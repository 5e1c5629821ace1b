use std::time::Duration;

use sift_score::ExtractedFields;
use thiserror::Error;

/// Content types we treat as a page worth parsing.
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/xml"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("timed out fetching {url} after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
}

impl FetchedPage {
    /// Whether the response looks like an HTML page. Falls back to the
    /// URL's path when the server sent no content type.
    pub fn is_html(&self, url: &str) -> bool {
        match self.content_type.as_deref() {
            Some(ct) if !ct.trim().is_empty() => {
                HTML_CONTENT_TYPES.iter().any(|t| ct.contains(t))
            }
            _ => {
                let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
                path.ends_with('/')
                    || path.ends_with(".html")
                    || path.ends_with(".htm")
                    || !path.rsplit('/').next().unwrap_or("").contains('.')
            }
        }
    }
}

/// Static HTTP fetch, owned by an external HTTP layer.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// A render-capable fetch handle with setup/teardown cost, pooled by
/// [`crate::DriverPool`]. Exclusive access while checked out, hence
/// `&mut self`.
///
/// Implementations must enforce their own fetch deadline (browser
/// automation clients expose a page-load timeout): the dispatcher
/// applies none, and a `fetch_rendered` that never returns pins its
/// worker slot until shutdown.
pub trait RenderFetcher: Send {
    fn fetch_rendered(&mut self, url: &str) -> anyhow::Result<FetchedPage>;
}

/// Outbound link discovery over a fetched body.
pub trait LinkExtractor: Send + Sync {
    fn extract_links(&self, body: &str, base_url: &str) -> Vec<String>;
}

/// Best-effort text extraction, split per field for weighted scoring.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, body: &str) -> ExtractedFields;
}

#[derive(Debug, Clone)]
pub struct PageMeta {
    pub url: String,
    pub title: String,
    pub depth: u32,
    pub relevance_score: u32,
    pub quality_score: f32,
    pub rendered: bool,
}

/// External persistence for pages that pass the quality gate.
pub trait PageSink: Send + Sync {
    fn store(&self, normalized_url: &str, text: &str, meta: &PageMeta) -> anyhow::Result<()>;
}

/// What happened to one successfully fetched page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub normalized_url: String,
    pub relevance_score: u32,
    pub quality_score: f32,
    pub needed_rendering: bool,
    pub kept: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content_type: Option<&str>) -> FetchedPage {
        FetchedPage {
            status: 200,
            body: String::new(),
            content_type: content_type.map(|s| s.to_string()),
        }
    }

    #[test]
    fn html_content_types_are_recognized() {
        assert!(page(Some("text/html; charset=utf-8")).is_html("https://e.com/x"));
        assert!(page(Some("application/xhtml+xml")).is_html("https://e.com/x"));
        assert!(!page(Some("application/pdf")).is_html("https://e.com/x"));
        assert!(!page(Some("image/png")).is_html("https://e.com/x"));
    }

    #[test]
    fn missing_content_type_falls_back_to_the_path() {
        assert!(page(None).is_html("https://e.com/"));
        assert!(page(None).is_html("https://e.com/news/item.html"));
        assert!(page(None).is_html("https://e.com/news/item?id=3"));
        assert!(!page(None).is_html("https://e.com/files/report.pdf"));
    }
}
