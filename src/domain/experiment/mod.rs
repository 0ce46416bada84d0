//! Experiment domain - A/B tests comparing two prompt templates

mod assignment;
mod entity;
mod metrics;
mod repository;
mod result;
mod validation;

pub use assignment::{assignment_bucket, variant_for_bucket, Variant, VariantAssignment, BUCKET_COUNT};
pub use entity::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_TRAFFIC_SPLIT, ExperimentId,
    ExperimentMetric, ExperimentStatus, PromptExperiment, PromptExperimentBuilder,
};
pub use metrics::ExperimentMetrics;
pub use repository::{ExperimentQuery, ExperimentRepository};
pub use result::{
    ConfidenceInterval, EffectMagnitude, EffectSize, ExperimentAnalysis, Recommendation,
    ZTestResult, SIGNIFICANCE_LEVEL,
};
pub use validation::ExperimentError;

#[cfg(test)]
pub use repository::MockExperimentRepository;
