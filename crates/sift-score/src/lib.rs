mod detector;
mod quality;
mod relevance;

pub use detector::{DetectorConfig, JsNeedDetector};
pub use quality::{QualityConfig, QualityEvaluator, QualityScore};
pub use relevance::{ExtractedFields, RelevanceConfig, RelevanceFilter, RelevanceScore};

/// The complete page judgment pipeline, built once from immutable
/// configuration and cloned into every worker.
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    pub relevance: RelevanceFilter,
    pub quality: QualityEvaluator,
    pub detector: JsNeedDetector,
}

impl ScoringPipeline {
    pub fn new(
        relevance: RelevanceConfig,
        quality: QualityConfig,
        detector: DetectorConfig,
    ) -> Self {
        let relevance = RelevanceFilter::new(relevance);
        let quality = QualityEvaluator::new(quality, relevance.clone());
        let detector = JsNeedDetector::new(detector);
        Self {
            relevance,
            quality,
            detector,
        }
    }
}
