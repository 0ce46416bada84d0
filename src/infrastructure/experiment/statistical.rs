//! Statistical analysis functions for A/B testing
//!
//! Provides a two-proportion z-test over success counts, Cohen's h effect size
//! and normal-approximation confidence intervals.

use crate::domain::experiment::{
    ConfidenceInterval, EffectSize, ExperimentAnalysis, PromptExperiment, Recommendation,
    Variant, ZTestResult,
};

/// Two-tailed two-proportion z-test
///
/// Uses the pooled proportion for the standard error. Empty samples or a zero
/// standard error (both proportions 0 or both 1) give an inconclusive result
/// with `z = 0` and `p = 1`.
pub fn two_proportion_z_test(
    successes_a: u64,
    total_a: u64,
    successes_b: u64,
    total_b: u64,
) -> ZTestResult {
    if total_a == 0 || total_b == 0 {
        return ZTestResult::inconclusive();
    }

    let n1 = total_a as f64;
    let n2 = total_b as f64;
    let p1 = successes_a as f64 / n1;
    let p2 = successes_b as f64 / n2;

    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 || !se.is_finite() {
        return ZTestResult::inconclusive();
    }

    let z = (p1 - p2) / se;
    let p_value = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);

    ZTestResult::new(z, p_value)
}

/// Cohen's h for the difference between two proportions
pub fn cohens_h(p1: f64, p2: f64) -> EffectSize {
    let arcsine = |p: f64| 2.0 * p.clamp(0.0, 1.0).sqrt().asin();
    EffectSize::new(arcsine(p1) - arcsine(p2))
}

/// Critical z value for a confidence level
///
/// Only 0.90, 0.95 and 0.99 are tabulated; anything else falls back to 1.96.
pub fn z_for_confidence_level(level: f64) -> f64 {
    const TABLE: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];

    TABLE
        .iter()
        .find(|(known, _)| (known - level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(1.96)
}

/// Normal-approximation interval for a single proportion, clamped to [0, 1]
///
/// With no observations the interval spans the whole range.
pub fn proportion_confidence_interval(
    proportion: f64,
    sample_size: u64,
    level: f64,
) -> ConfidenceInterval {
    if sample_size == 0 {
        return ConfidenceInterval {
            lower: 0.0,
            upper: 1.0,
            level,
        };
    }

    let p = proportion.clamp(0.0, 1.0);
    let margin = z_for_confidence_level(level) * (p * (1.0 - p) / sample_size as f64).sqrt();

    ConfidenceInterval {
        lower: (p - margin).max(0.0),
        upper: (p + margin).min(1.0),
        level,
    }
}

/// Recommended next step given the sample sizes and the z-test outcome
pub fn recommend(experiment: &PromptExperiment, z_test: &ZTestResult) -> Recommendation {
    let (a, b) = (experiment.metrics_a(), experiment.metrics_b());

    if !experiment.has_sufficient_data() {
        return Recommendation::CollectMoreData {
            min_sample_size: experiment.min_sample_size(),
            runs_a: a.total_runs(),
            runs_b: b.total_runs(),
        };
    }

    if !z_test.is_significant {
        return Recommendation::ContinueCollecting;
    }

    let variant = if a.success_rate() >= b.success_rate() {
        Variant::A
    } else {
        Variant::B
    };

    Recommendation::Complete {
        variant,
        winner: experiment.prompt_id_for(variant).clone(),
    }
}

/// Full significance report for an experiment's current metrics
///
/// Confidence intervals use the experiment's `confidence_threshold` as level.
pub fn analyze(experiment: &PromptExperiment) -> ExperimentAnalysis {
    let (a, b) = (experiment.metrics_a(), experiment.metrics_b());
    let level = experiment.confidence_threshold();

    let z_test = two_proportion_z_test(
        a.success_count(),
        a.total_runs(),
        b.success_count(),
        b.total_runs(),
    );

    ExperimentAnalysis {
        experiment_id: experiment.id().clone(),
        status: experiment.status(),
        metric: experiment.metric(),
        sample_size_met: experiment.has_sufficient_data(),
        success_rate_a: a.success_rate(),
        success_rate_b: b.success_rate(),
        z_test,
        effect_size: cohens_h(a.success_rate(), b.success_rate()),
        confidence_interval_a: proportion_confidence_interval(
            a.success_rate(),
            a.total_runs(),
            level,
        ),
        confidence_interval_b: proportion_confidence_interval(
            b.success_rate(),
            b.total_runs(),
            level,
        ),
        winner: experiment.determine_winner().cloned(),
        recommendation: recommend(experiment, &z_test),
    }
}

/// Standard normal cumulative distribution function
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function approximation (Abramowitz and Stegun 7.1.26)
///
/// Uses Horner's method for the polynomial approximation.
/// Accurate to about 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
