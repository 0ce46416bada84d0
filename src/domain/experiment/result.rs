//! Experiment analysis result types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::assignment::Variant;
use super::entity::{ExperimentId, ExperimentMetric, ExperimentStatus};
use crate::domain::prompt::TemplateId;

/// Two-tailed significance level for the z-test
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

// ============================================================================
// ZTestResult
// ============================================================================

/// Outcome of a two-proportion z-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTestResult {
    pub z_score: f64,
    /// Two-tailed p-value
    pub p_value: f64,
    pub is_significant: bool,
}

impl ZTestResult {
    pub fn new(z_score: f64, p_value: f64) -> Self {
        Self {
            z_score,
            p_value,
            is_significant: p_value < SIGNIFICANCE_LEVEL,
        }
    }

    /// Result for inputs the test cannot handle (empty sample, zero variance)
    pub fn inconclusive() -> Self {
        Self::new(0.0, 1.0)
    }
}

// ============================================================================
// EffectSize
// ============================================================================

/// Interpretation of Cohen's h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMagnitude {
    Negligible,
    Medium,
    Large,
}

impl EffectMagnitude {
    pub fn from_h(h: f64) -> Self {
        let h = h.abs();

        if h < 0.5 {
            Self::Negligible
        } else if h < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

impl fmt::Display for EffectMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negligible => write!(f, "negligible"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// Cohen's h together with its interpretation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    pub h: f64,
    pub magnitude: EffectMagnitude,
}

impl EffectSize {
    pub fn new(h: f64) -> Self {
        Self {
            h,
            magnitude: EffectMagnitude::from_h(h),
        }
    }
}

// ============================================================================
// ConfidenceInterval
// ============================================================================

/// Interval estimate for a single proportion, clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Confidence level, e.g. 0.95
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// What to do next with an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recommendation {
    /// At least one variant is below the minimum sample size
    CollectMoreData {
        min_sample_size: u64,
        runs_a: u64,
        runs_b: u64,
    },
    /// Enough samples but the difference is not significant
    ContinueCollecting,
    /// Significant difference; complete with this variant as the winner
    Complete { variant: Variant, winner: TemplateId },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CollectMoreData {
                min_sample_size,
                runs_a,
                runs_b,
            } => write!(
                f,
                "Collect more data: need {} runs per variant (A has {}, B has {})",
                min_sample_size, runs_a, runs_b
            ),
            Self::ContinueCollecting => {
                write!(f, "Continue collecting: difference is not statistically significant")
            }
            Self::Complete { variant, winner } => write!(
                f,
                "Complete the experiment: variant {} ({}) has the higher success rate",
                variant, winner
            ),
        }
    }
}

// ============================================================================
// ExperimentAnalysis
// ============================================================================

/// Full significance report for an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    pub experiment_id: ExperimentId,
    pub status: ExperimentStatus,
    pub metric: ExperimentMetric,
    pub sample_size_met: bool,
    pub success_rate_a: f64,
    pub success_rate_b: f64,
    pub z_test: ZTestResult,
    pub effect_size: EffectSize,
    pub confidence_interval_a: ConfidenceInterval,
    pub confidence_interval_b: ConfidenceInterval,
    /// Winner under the experiment's own metric, if one can be declared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<TemplateId>,
    pub recommendation: Recommendation,
}

impl ExperimentAnalysis {
    pub fn is_significant(&self) -> bool {
        self.z_test.is_significant
    }
}
