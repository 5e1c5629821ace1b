use serde::{Deserialize, Serialize};

use crate::relevance::RelevanceFilter;

/// Sub-score ceilings; together they add up to 100.
const MAX_LENGTH_SCORE: f32 = 20.0;
const CHARS_PER_LENGTH_POINT: f32 = 50.0;
const STRUCTURE_POINTS: f32 = 5.0;
const MIN_WORDS_FOR_STRUCTURE: usize = 10;
const SUBSTANCE_WEIGHT: f32 = 30.0;
const MAX_NAV_SCORE: f32 = 20.0;
const NAV_PHRASE_PENALTY: f32 = 5.0;
const MAX_DOMAIN_SCORE: f32 = 10.0;
const DOMAIN_POINTS_PER_KEYWORD: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityConfig {
    /// Minimum total score for a page to be persisted.
    #[serde(default = "default_retention_threshold")]
    pub retention_threshold: f32,

    /// Minimum extracted text length in characters, enforced
    /// independently of the score.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Phrases that indicate navigation chrome rather than content.
    #[serde(default = "default_nav_phrases")]
    pub nav_phrases: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            retention_threshold: default_retention_threshold(),
            min_text_length: default_min_text_length(),
            nav_phrases: default_nav_phrases(),
        }
    }
}

fn default_retention_threshold() -> f32 {
    40.0
}

fn default_min_text_length() -> usize {
    200
}

fn default_nav_phrases() -> Vec<String> {
    [
        "skip to content",
        "back to top",
        "previous page",
        "next page",
        "read more",
        "breadcrumb",
        "all rights reserved",
        "privacy policy",
        "terms of use",
        "cookie settings",
        "sitemap",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub total: f32,
    pub length: f32,
    pub structure: f32,
    pub substance: f32,
    pub navigation: f32,
    pub domain: f32,
}

/// Scores extracted text 0-100 from five independent signals: raw
/// length, structural completeness, substantive-character ratio,
/// navigation-noise penalty and topical keyword presence.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    config: QualityConfig,
    filter: RelevanceFilter,
    nav_phrases: Vec<String>,
}

impl QualityEvaluator {
    pub fn new(config: QualityConfig, filter: RelevanceFilter) -> Self {
        let nav_phrases = config
            .nav_phrases
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            config,
            filter,
            nav_phrases,
        }
    }

    pub fn assess(&self, text: &str) -> QualityScore {
        let text = text.trim();
        if text.is_empty() {
            return QualityScore::default();
        }

        let chars = text.chars().count();
        let length = (chars as f32 / CHARS_PER_LENGTH_POINT).min(MAX_LENGTH_SCORE);

        let mut structure = 0.0;
        if text.contains(['.', '。']) {
            structure += STRUCTURE_POINTS;
        }
        if text.contains('\n') {
            structure += STRUCTURE_POINTS;
        }
        if text.split_whitespace().count() > MIN_WORDS_FOR_STRUCTURE {
            structure += STRUCTURE_POINTS;
        }
        if text.contains([':', ',', ';', '：', '，', '；', '、']) {
            structure += STRUCTURE_POINTS;
        }

        let substantial = text.chars().filter(|c| c.is_alphanumeric()).count();
        let substance = substantial as f32 / chars as f32 * SUBSTANCE_WEIGHT;

        let lower = text.to_lowercase();
        let nav_matches = self
            .nav_phrases
            .iter()
            .filter(|p| lower.contains(p.as_str()))
            .count();
        let navigation = (MAX_NAV_SCORE - nav_matches as f32 * NAV_PHRASE_PENALTY).max(0.0);

        let hits = self.filter.keyword_hits(text);
        let domain = (hits as f32 * DOMAIN_POINTS_PER_KEYWORD).min(MAX_DOMAIN_SCORE);

        QualityScore {
            total: length + structure + substance + navigation + domain,
            length,
            structure,
            substance,
            navigation,
            domain,
        }
    }

    /// Both conditions are required: a high score cannot compensate for
    /// text below the length floor, nor the other way around.
    pub fn should_retain(&self, text: &str, score: &QualityScore) -> bool {
        score.total >= self.config.retention_threshold
            && text.trim().chars().count() >= self.config.min_text_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::{RelevanceConfig, RelevanceFilter};

    fn evaluator() -> QualityEvaluator {
        let filter = RelevanceFilter::new(RelevanceConfig {
            keywords: vec!["mining".into(), "geology".into(), "mineral".into()],
            ..Default::default()
        });
        QualityEvaluator::new(QualityConfig::default(), filter)
    }

    fn article() -> String {
        let mut text = String::new();
        for i in 0..8 {
            text.push_str(&format!(
                "Section {i}: the regional geology survey mapped mineral deposits \
                 across the basin, and mining operations followed the assay results.\n"
            ));
        }
        text
    }

    #[test]
    fn substantive_article_is_retained() {
        let eval = evaluator();
        let text = article();
        let score = eval.assess(&text);
        assert!(score.total >= 40.0, "{score:?}");
        assert!(eval.should_retain(&text, &score));
    }

    #[test]
    fn short_snippet_fails_length_floor_regardless_of_score() {
        let eval = evaluator();
        // Keyword-dense but only ~50 characters.
        let text = "mining geology mineral mining geology mineral mining";
        let score = eval.assess(text);
        assert!(!eval.should_retain(text, &score));
    }

    #[test]
    fn empty_text_scores_zero() {
        let score = evaluator().assess("   ");
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn navigation_noise_is_penalized() {
        let eval = evaluator();
        let clean = eval.assess("A plain paragraph about the survey results.");
        let noisy = eval.assess(
            "A plain paragraph about the survey results. \
             Skip to content. Back to top. Privacy policy. Sitemap.",
        );
        assert!(noisy.navigation < clean.navigation);
        assert_eq!(clean.navigation, MAX_NAV_SCORE);
    }

    #[test]
    fn length_score_is_capped() {
        let eval = evaluator();
        let long = "word ".repeat(2000);
        assert_eq!(eval.assess(&long).length, MAX_LENGTH_SCORE);
    }

    #[test]
    fn domain_score_follows_distinct_keywords() {
        let eval = evaluator();
        let one = eval.assess("a note about mining practices");
        let three = eval.assess("mining, geology and mineral rights");
        assert_eq!(one.domain, 2.0);
        assert_eq!(three.domain, 6.0);
    }

    #[test]
    fn boilerplate_soup_scores_below_threshold() {
        let eval = evaluator();
        let text = "| > | > | > | — — — | > |".repeat(20);
        let score = eval.assess(&text);
        assert!(score.total < 40.0, "{score:?}");
    }
}
