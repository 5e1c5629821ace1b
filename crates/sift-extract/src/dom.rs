use std::collections::HashSet;

use select::document::Document;
use select::node::Node;
use select::predicate::{Name, Text};
use sift_crawler::{LinkExtractor, TextExtractor};
use sift_score::ExtractedFields;
use url::Url;

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript"];

/// Collects `<a href>` and `<iframe src>` targets, resolved against the
/// page URL. Relative and absolute links come out absolute; anything
/// that won't join is skipped.
pub struct DomLinkExtractor;

impl LinkExtractor for DomLinkExtractor {
    fn extract_links(&self, body: &str, base_url: &str) -> Vec<String> {
        let base = match Url::parse(base_url) {
            Ok(base) => base,
            Err(_) => return vec![],
        };

        let doc = Document::from(body);
        let mut seen = HashSet::new();
        let mut links = vec![];

        let candidates = doc
            .find(Name("a"))
            .filter_map(|n| n.attr("href"))
            .chain(doc.find(Name("iframe")).filter_map(|n| n.attr("src")));
        for raw in candidates {
            if let Ok(joined) = base.join(raw) {
                let url = String::from(joined);
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }
        links
    }
}

/// Best-effort split of a page into the fields the relevance filter
/// weights: title, meta description/keywords, headings, body text.
pub struct DomTextExtractor;

impl TextExtractor for DomTextExtractor {
    fn extract_text(&self, body: &str) -> ExtractedFields {
        let doc = Document::from(body);

        let title = doc
            .find(Name("title"))
            .next()
            .map(|n| n.text().trim().to_string())
            .unwrap_or_default();

        let mut meta = String::new();
        for node in doc.find(Name("meta")) {
            let name = node.attr("name").unwrap_or_default().to_lowercase();
            if name == "description" || name == "keywords" {
                if let Some(content) = node.attr("content") {
                    meta.push_str(content);
                    meta.push(' ');
                }
            }
        }

        let mut headings = String::new();
        for tag in HEADING_TAGS {
            for node in doc.find(Name(*tag)) {
                headings.push_str(node.text().trim());
                headings.push(' ');
            }
        }

        let mut raw = String::new();
        match doc.find(Name("body")).next() {
            Some(body) => visible_text(body, &mut raw),
            // Fragment without a <body>: fall back to all text nodes.
            None => {
                for node in doc.find(Text) {
                    let invisible = node
                        .parent()
                        .and_then(|p| p.name().map(|n| INVISIBLE_TAGS.contains(&n)))
                        .unwrap_or(false);
                    if !invisible {
                        raw.push_str(node.as_text().unwrap_or_default());
                    }
                }
            }
        }

        ExtractedFields {
            title,
            meta: meta.trim().to_string(),
            headings: headings.trim().to_string(),
            body: tidy(&raw),
        }
    }
}

fn visible_text(node: Node, out: &mut String) {
    if let Some(name) = node.name() {
        if INVISIBLE_TAGS.contains(&name) {
            return;
        }
    }
    if let Some(text) = node.as_text() {
        out.push_str(text);
        return;
    }
    for child in node.children() {
        visible_text(child, out);
    }
    // Block boundaries become line breaks so structure survives.
    if node.name().is_some() {
        out.push('\n');
    }
}

/// Trims each line and collapses blank runs.
fn tidy(raw: &str) -> String {
    let mut lines = vec![];
    for line in raw.lines() {
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Basin geology</title>
            <meta name="description" content="Survey of mineral deposits">
            <meta name="keywords" content="mining, assay">
            <script>var hidden = "not text";</script>
          </head>
          <body>
            <h1>Regional survey</h1>
            <p>The basin holds several mapped deposits.</p>
            <a href="/reports/2024">Annual report</a>
            <a href="https://other.example.org/page">External</a>
            <a href="/reports/2024">Duplicate</a>
            <iframe src="/embed/map"></iframe>
          </body>
        </html>"#;

    #[test]
    fn links_are_absolute_and_deduplicated() {
        let links = DomLinkExtractor.extract_links(PAGE, "https://example.com/home");
        assert_eq!(
            links,
            vec![
                "https://example.com/reports/2024".to_string(),
                "https://other.example.org/page".to_string(),
                "https://example.com/embed/map".to_string(),
            ]
        );
    }

    #[test]
    fn fields_are_split_by_origin() {
        let fields = DomTextExtractor.extract_text(PAGE);
        assert_eq!(fields.title, "Basin geology");
        assert!(fields.meta.contains("Survey of mineral deposits"));
        assert!(fields.meta.contains("mining, assay"));
        assert_eq!(fields.headings, "Regional survey");
        assert!(fields.body.contains("The basin holds several mapped deposits."));
    }

    #[test]
    fn script_content_is_invisible() {
        let fields = DomTextExtractor.extract_text(PAGE);
        assert!(!fields.body.contains("not text"));
    }

    #[test]
    fn unparseable_base_yields_no_links() {
        assert!(DomLinkExtractor.extract_links(PAGE, "not a url").is_empty());
    }
}
