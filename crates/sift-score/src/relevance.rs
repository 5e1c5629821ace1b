use serde::{Deserialize, Serialize};

/// Text of a page split by where it appeared, so scoring can weight a
/// keyword in the title differently from one buried in the body.
#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    pub title: String,
    pub meta: String,
    pub headings: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevanceConfig {
    /// Keywords defining the crawl's topical domain, matched
    /// case-insensitively.
    pub keywords: Vec<String>,

    /// A page is relevant once this many distinct keywords match...
    #[serde(default = "default_min_distinct_keywords")]
    pub min_distinct_keywords: usize,

    /// ...or once the weighted occurrence score reaches this value, so a
    /// single keyword repeated often still qualifies.
    #[serde(default = "default_min_weighted_score")]
    pub min_weighted_score: u32,

    #[serde(default = "default_title_weight")]
    pub title_weight: u32,

    #[serde(default = "default_meta_weight")]
    pub meta_weight: u32,

    #[serde(default = "default_heading_weight")]
    pub heading_weight: u32,

    #[serde(default = "default_body_weight")]
    pub body_weight: u32,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            keywords: vec![],
            min_distinct_keywords: default_min_distinct_keywords(),
            min_weighted_score: default_min_weighted_score(),
            title_weight: default_title_weight(),
            meta_weight: default_meta_weight(),
            heading_weight: default_heading_weight(),
            body_weight: default_body_weight(),
        }
    }
}

fn default_min_distinct_keywords() -> usize {
    2
}

fn default_min_weighted_score() -> u32 {
    5
}

fn default_title_weight() -> u32 {
    5
}

fn default_meta_weight() -> u32 {
    3
}

fn default_heading_weight() -> u32 {
    2
}

fn default_body_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScore {
    /// Distinct keywords that appeared anywhere in the page.
    pub matched: Vec<String>,
    /// Occurrence count summed over all fields, weighted per field.
    pub weighted_score: u32,
}

/// Decides whether a page belongs to the crawl's topical domain.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
    config: RelevanceConfig,
}

impl RelevanceFilter {
    pub fn new(config: RelevanceConfig) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords, config }
    }

    pub fn evaluate(&self, fields: &ExtractedFields) -> RelevanceScore {
        let title = fields.title.to_lowercase();
        let meta = fields.meta.to_lowercase();
        let headings = fields.headings.to_lowercase();
        let body = fields.body.to_lowercase();

        let mut score = RelevanceScore::default();
        for keyword in &self.keywords {
            let occurrences = count(&title, keyword) * self.config.title_weight
                + count(&meta, keyword) * self.config.meta_weight
                + count(&headings, keyword) * self.config.heading_weight
                + count(&body, keyword) * self.config.body_weight;
            if occurrences > 0 {
                score.matched.push(keyword.clone());
                score.weighted_score += occurrences;
            }
        }
        score
    }

    pub fn is_relevant(&self, fields: &ExtractedFields) -> bool {
        let score = self.evaluate(fields);
        let relevant = self.decide(&score);
        log::debug!(
            "relevance: matched={} weighted={} -> {relevant}",
            score.matched.len(),
            score.weighted_score,
        );
        relevant
    }

    pub fn decide(&self, score: &RelevanceScore) -> bool {
        score.matched.len() >= self.config.min_distinct_keywords
            || score.weighted_score >= self.config.min_weighted_score
    }

    /// Distinct keyword hits in a flat piece of text, for reuse by the
    /// quality evaluator's domain sub-score.
    pub fn keyword_hits(&self, text: &str) -> usize {
        let text = text.to_lowercase();
        self.keywords.iter().filter(|k| text.contains(k.as_str())).count()
    }
}

fn count(haystack: &str, needle: &str) -> u32 {
    haystack.matches(needle).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RelevanceFilter {
        RelevanceFilter::new(RelevanceConfig {
            keywords: vec!["mining".into(), "geology".into(), "mineral".into()],
            ..Default::default()
        })
    }

    fn body_only(text: &str) -> ExtractedFields {
        ExtractedFields {
            body: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn two_distinct_keywords_at_low_frequency_qualify() {
        let fields = body_only("an intro to mining and a note on geology");
        assert!(filter().is_relevant(&fields));
    }

    #[test]
    fn one_keyword_repeated_often_qualifies() {
        let fields = body_only("mining mining mining mining mining");
        assert!(filter().is_relevant(&fields));
    }

    #[test]
    fn one_title_keyword_outweighs_body_occurrences() {
        // A single title hit scores 5 on its own.
        let fields = ExtractedFields {
            title: "mining report".into(),
            ..Default::default()
        };
        assert!(filter().is_relevant(&fields));
    }

    #[test]
    fn unrelated_text_is_rejected() {
        let fields = body_only("a cooking blog about sourdough bread");
        assert!(!filter().is_relevant(&fields));

        let sparse = body_only("one mention of geology only");
        assert!(!filter().is_relevant(&sparse));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let fields = body_only("MINING and GEOLOGY in caps");
        assert!(filter().is_relevant(&fields));
    }

    #[test]
    fn weights_follow_field_importance() {
        let filter = filter();
        let score = filter.evaluate(&ExtractedFields {
            title: "mining".into(),
            meta: "mining".into(),
            headings: "mining".into(),
            body: "mining".into(),
        });
        assert_eq!(score.weighted_score, 5 + 3 + 2 + 1);
        assert_eq!(score.matched, vec!["mining".to_string()]);
    }

    #[test]
    fn keyword_hits_counts_distinct_matches() {
        let filter = filter();
        assert_eq!(filter.keyword_hits("mining near a mineral belt"), 2);
        assert_eq!(filter.keyword_hits("nothing topical"), 0);
    }
}
