//! Per-variant experiment counters

use serde::{Deserialize, Serialize};

use super::validation::ExperimentError;

/// Immutable counters for one experiment variant
///
/// Updates are functional: [`ExperimentMetrics::record_run`] returns a new value.
/// `total_runs == success_count + failure_count` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ExperimentMetricsData", into = "ExperimentMetricsData")]
pub struct ExperimentMetrics {
    total_runs: u64,
    success_count: u64,
    failure_count: u64,
    total_tokens: u64,
    total_latency_ms: f64,
    rating_sum: f64,
    rating_count: u64,
}

impl ExperimentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the counters after one more run
    ///
    /// Negative token counts and latencies are clamped to zero. Non-finite
    /// ratings are ignored. Once the run counter is exhausted the counters
    /// stay as they are.
    pub fn record_run(&self, success: bool, tokens: i64, latency_ms: f64, rating: Option<f64>) -> Self {
        // success, failure and rating counts never exceed total_runs
        let Some(total_runs) = self.total_runs.checked_add(1) else {
            return *self;
        };

        let latency_ms = if latency_ms.is_finite() { latency_ms.max(0.0) } else { 0.0 };
        let rating = rating.filter(|r| r.is_finite());

        Self {
            total_runs,
            success_count: self.success_count.saturating_add(u64::from(success)),
            failure_count: self.failure_count.saturating_add(u64::from(!success)),
            total_tokens: self.total_tokens.saturating_add(tokens.max(0) as u64),
            total_latency_ms: self.total_latency_ms + latency_ms,
            rating_sum: self.rating_sum + rating.unwrap_or(0.0),
            rating_count: self.rating_count.saturating_add(u64::from(rating.is_some())),
        }
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_latency_ms(&self) -> f64 {
        self.total_latency_ms
    }

    pub fn rating_sum(&self) -> f64 {
        self.rating_sum
    }

    pub fn rating_count(&self) -> u64 {
        self.rating_count
    }

    // Derived statistics

    /// Fraction of successful runs, 0.0 with no runs
    pub fn success_rate(&self) -> f64 {
        ratio(self.success_count as f64, self.total_runs)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        ratio(self.total_latency_ms, self.total_runs)
    }

    pub fn avg_tokens(&self) -> f64 {
        ratio(self.total_tokens as f64, self.total_runs)
    }

    /// Mean user rating, 0.0 when nothing was rated
    pub fn avg_rating(&self) -> f64 {
        ratio(self.rating_sum, self.rating_count)
    }

    /// Tokens spent per successful run; infinite with no successes
    pub fn token_efficiency(&self) -> f64 {
        if self.success_count == 0 {
            return f64::INFINITY;
        }

        self.total_tokens as f64 / self.success_count as f64
    }
}

fn ratio(numerator: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentMetricsData {
    total_runs: u64,
    success_count: u64,
    failure_count: u64,
    total_tokens: u64,
    total_latency_ms: f64,
    rating_sum: f64,
    rating_count: u64,
}

impl TryFrom<ExperimentMetricsData> for ExperimentMetrics {
    type Error = ExperimentError;

    fn try_from(data: ExperimentMetricsData) -> Result<Self, Self::Error> {
        let counted = data
            .success_count
            .checked_add(data.failure_count)
            .ok_or_else(|| ExperimentError::validation("success_count + failure_count overflows"))?;

        if data.total_runs != counted {
            return Err(ExperimentError::validation(format!(
                "total_runs ({}) must equal success_count ({}) + failure_count ({})",
                data.total_runs, data.success_count, data.failure_count
            )));
        }

        if data.total_latency_ms < 0.0 || data.rating_count > data.total_runs {
            return Err(ExperimentError::validation("Inconsistent metric totals"));
        }

        Ok(Self {
            total_runs: data.total_runs,
            success_count: data.success_count,
            failure_count: data.failure_count,
            total_tokens: data.total_tokens,
            total_latency_ms: data.total_latency_ms,
            rating_sum: data.rating_sum,
            rating_count: data.rating_count,
        })
    }
}

impl From<ExperimentMetrics> for ExperimentMetricsData {
    fn from(metrics: ExperimentMetrics) -> Self {
        Self {
            total_runs: metrics.total_runs,
            success_count: metrics.success_count,
            failure_count: metrics.failure_count,
            total_tokens: metrics.total_tokens,
            total_latency_ms: metrics.total_latency_ms,
            rating_sum: metrics.rating_sum,
            rating_count: metrics.rating_count,
        }
    }
}
