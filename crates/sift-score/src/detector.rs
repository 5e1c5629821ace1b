use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Below this visible-text / markup ratio the page body is assumed
    /// to be filled in client-side.
    #[serde(default = "default_min_text_markup_ratio")]
    pub min_text_markup_ratio: f32,

    /// Visible text shorter than this, in a response at least
    /// `min_response_len` bytes long, also flags the page.
    #[serde(default = "default_min_visible_text_len")]
    pub min_visible_text_len: usize,

    /// Responses smaller than this are too small to judge; they never
    /// trigger the ratio or length rules.
    #[serde(default = "default_min_response_len")]
    pub min_response_len: usize,

    /// Markers of SPA bootstraps and loading placeholders, matched
    /// case-insensitively against the raw markup.
    #[serde(default = "default_render_markers")]
    pub render_markers: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_text_markup_ratio: default_min_text_markup_ratio(),
            min_visible_text_len: default_min_visible_text_len(),
            min_response_len: default_min_response_len(),
            render_markers: default_render_markers(),
        }
    }
}

fn default_min_text_markup_ratio() -> f32 {
    0.05
}

fn default_min_visible_text_len() -> usize {
    200
}

fn default_min_response_len() -> usize {
    2048
}

fn default_render_markers() -> Vec<String> {
    [
        "<app-root",
        "<react-root",
        "id=\"app\"",
        "id=\"root\"",
        "reactdom.render",
        "new vue(",
        "angular.module(",
        "data-src=",
        "loading=\"lazy\"",
        "class=\"spinner",
        "class=\"loader",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Heuristic for whether a statically fetched page needs the rendering
/// path. A false positive costs one extra render cycle; a false
/// negative costs missing content.
#[derive(Debug, Clone)]
pub struct JsNeedDetector {
    config: DetectorConfig,
    markers: Vec<String>,
}

impl JsNeedDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let markers = config
            .render_markers
            .iter()
            .map(|m| m.to_lowercase())
            .collect();
        Self { config, markers }
    }

    pub fn needs_rendering(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        if let Some(marker) = self.markers.iter().find(|m| lower.contains(m.as_str())) {
            log::debug!("render marker matched: {marker}");
            return true;
        }

        if body.len() < self.config.min_response_len {
            return false;
        }

        let visible = visible_text_len(body);
        let ratio = visible as f32 / body.len() as f32;
        if ratio < self.config.min_text_markup_ratio {
            log::debug!("text/markup ratio {ratio:.3} below threshold");
            return true;
        }
        if visible < self.config.min_visible_text_len {
            log::debug!("only {visible} visible chars in a {} byte response", body.len());
            return true;
        }

        false
    }
}

/// Length of the text a reader would see: tag contents minus script and
/// style bodies, whitespace runs collapsed.
fn visible_text_len(html: &str) -> usize {
    let lower = html.to_lowercase();
    let bytes = lower.as_bytes();
    let mut len = 0usize;
    let mut i = 0usize;
    let mut in_tag = false;
    let mut skip_until: Option<&[u8]> = None;
    let mut last_was_space = true;

    while i < bytes.len() {
        if let Some(end) = skip_until {
            if bytes[i..].starts_with(end) {
                skip_until = None;
                i += end.len();
                in_tag = false;
            } else {
                i += 1;
            }
            continue;
        }
        match bytes[i] {
            b'<' => {
                if bytes[i..].starts_with(b"<script") {
                    skip_until = Some(&b"</script>"[..]);
                } else if bytes[i..].starts_with(b"<style") {
                    skip_until = Some(&b"</style>"[..]);
                } else {
                    in_tag = true;
                }
                i += 1;
            }
            b'>' => {
                in_tag = false;
                i += 1;
            }
            c => {
                if !in_tag {
                    if c.is_ascii_whitespace() {
                        if !last_was_space {
                            len += 1;
                        }
                        last_was_space = true;
                    } else {
                        len += 1;
                        last_was_space = false;
                    }
                }
                i += 1;
            }
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> JsNeedDetector {
        JsNeedDetector::new(DetectorConfig::default())
    }

    #[test]
    fn spa_bootstrap_markers_trigger() {
        assert!(detector().needs_rendering(r#"<html><body><div id="root"></div></body></html>"#));
        assert!(detector().needs_rendering(r#"<html><body><app-root></app-root></body></html>"#));
        assert!(detector().needs_rendering(
            r#"<html><script>ReactDOM.render(App, el)</script><body>x</body></html>"#
        ));
    }

    #[test]
    fn loading_placeholders_trigger() {
        assert!(detector().needs_rendering(r#"<div class="spinner">loading</div>"#));
    }

    #[test]
    fn markup_heavy_page_triggers_ratio_rule() {
        // Lots of markup, almost no text.
        let body = format!(
            "<html><body>{}</body></html>",
            r#"<div class="cell" data-idx="00000000000000"></div>"#.repeat(100)
        );
        assert!(detector().needs_rendering(&body));
    }

    #[test]
    fn article_page_does_not_trigger() {
        let paragraph = "<p>The survey covered the northern basin in detail and the \
                         published report lists every drill site with assay data.</p>";
        let body = format!("<html><body>{}</body></html>", paragraph.repeat(40));
        assert!(!detector().needs_rendering(&body));
    }

    #[test]
    fn small_responses_are_not_judged_by_ratio() {
        // Tiny page, no markers: nothing to conclude.
        assert!(!detector().needs_rendering("<html><body><p>ok</p></body></html>"));
    }

    #[test]
    fn visible_text_skips_tags_and_scripts() {
        let html = r#"<html><head><script>var x = "invisible";</script></head>
            <body><p>visible words</p></body></html>"#;
        // "visible words" plus collapsed whitespace around it.
        let len = visible_text_len(html);
        assert!(len >= "visible words".len());
        assert!(len < 20, "{len}");
    }
}
