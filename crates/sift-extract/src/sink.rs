use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};
use sift_crawler::{PageMeta, PageSink};
use url::Url;

/// Persists retained pages as `<hash>-<slug>.txt` plus a JSON sidecar
/// with the crawl metadata.
pub struct FileSink {
    dir: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredMeta<'a> {
    url: &'a str,
    normalized_url: &'a str,
    title: &'a str,
    depth: u32,
    relevance_score: u32,
    quality_score: f32,
    rendered: bool,
    stored_at_ms: u64,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs_err::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Stable per-URL filename stem: a short hash (collision guard) plus
    /// a readable slug from the host and path.
    fn file_stem(normalized_url: &str) -> String {
        let digest = format!("{:x}", Sha256::digest(normalized_url.as_bytes()));
        let slug = match Url::parse(normalized_url) {
            Ok(url) => {
                let mut raw = url.host_str().unwrap_or("page").to_string();
                raw.push_str(url.path());
                slugify(&raw)
            }
            Err(_) => "page".to_string(),
        };
        format!("{}-{}", &digest[..8], slug)
    }
}

impl PageSink for FileSink {
    fn store(&self, normalized_url: &str, text: &str, meta: &PageMeta) -> anyhow::Result<()> {
        let stem = Self::file_stem(normalized_url);

        fs_err::write(self.dir.join(format!("{stem}.txt")), text)?;

        let stored_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let sidecar = StoredMeta {
            url: &meta.url,
            normalized_url,
            title: &meta.title,
            depth: meta.depth,
            relevance_score: meta.relevance_score,
            quality_score: meta.quality_score,
            rendered: meta.rendered,
            stored_at_ms,
        };
        let json = serde_json::to_string_pretty(&sidecar)?;
        fs_err::write(self.dir.join(format!("{stem}.json")), json)?;

        log::debug!("stored {normalized_url} as {stem}");
        Ok(())
    }
}

fn slugify(raw: &str) -> String {
    let mut slug = String::new();
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 60 {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}
