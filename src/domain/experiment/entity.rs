//! Experiment domain entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::assignment::{assignment_bucket, variant_for_bucket, Variant, VariantAssignment};
use super::metrics::ExperimentMetrics;
use super::validation::{
    validate_confidence_threshold, validate_min_sample_size, validate_traffic_split,
    ExperimentError,
};
use crate::domain::prompt::TemplateId;

/// Default percentage of traffic routed to variant A
pub const DEFAULT_TRAFFIC_SPLIT: u8 = 50;

/// Default number of runs per variant before a winner can be declared
pub const DEFAULT_MIN_SAMPLE_SIZE: u64 = 100;

/// Default confidence threshold
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.95;

// ============================================================================
// ExperimentId
// ============================================================================

/// Unique identifier for an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Create an experiment ID from an existing value
    pub fn new(id: impl Into<String>) -> Result<Self, ExperimentError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(ExperimentError::validation("Experiment ID cannot be empty"));
        }

        Ok(Self(id))
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentId {
    type Error = ExperimentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExperimentId> for String {
    fn from(id: ExperimentId) -> Self {
        id.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExperimentStatus
// ============================================================================

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Being configured, not yet assigning traffic
    #[default]
    Draft,
    /// Actively assigning traffic and recording results
    Running,
    /// Temporarily stopped, can be resumed
    Paused,
    /// Finished, possibly with a winner
    Completed,
    /// Retired administratively
    Archived,
}

impl ExperimentStatus {
    /// Check if a transition to the target status is valid
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        match (self, target) {
            (Self::Draft, Self::Running) => true,
            (Self::Running, Self::Paused) => true,
            (Self::Paused, Self::Running) => true,
            (Self::Running | Self::Paused, Self::Completed) => true,
            (Self::Draft | Self::Paused | Self::Completed, Self::Archived) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

// ============================================================================
// ExperimentMetric
// ============================================================================

/// Metric used to pick a winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentMetric {
    /// Higher success rate wins
    #[default]
    SuccessRate,
    /// Higher average rating wins
    UserRating,
    /// Fewer tokens per success wins
    TokenEfficiency,
    /// Lower average latency wins
    Latency,
}

impl ExperimentMetric {
    /// The strictly better variant under this metric, `None` on a tie
    pub fn better_variant(&self, a: &ExperimentMetrics, b: &ExperimentMetrics) -> Option<Variant> {
        match self {
            Self::SuccessRate => prefer_higher(a.success_rate(), b.success_rate()),
            Self::UserRating => prefer_higher(a.avg_rating(), b.avg_rating()),
            Self::Latency => prefer_lower(a.avg_latency_ms(), b.avg_latency_ms()),
            // Infinite efficiency (no successes) loses to any finite value
            Self::TokenEfficiency => prefer_lower(a.token_efficiency(), b.token_efficiency()),
        }
    }
}

impl fmt::Display for ExperimentMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuccessRate => write!(f, "success_rate"),
            Self::UserRating => write!(f, "user_rating"),
            Self::TokenEfficiency => write!(f, "token_efficiency"),
            Self::Latency => write!(f, "latency"),
        }
    }
}

fn prefer_higher(a: f64, b: f64) -> Option<Variant> {
    if a > b {
        Some(Variant::A)
    } else if b > a {
        Some(Variant::B)
    } else {
        None
    }
}

fn prefer_lower(a: f64, b: f64) -> Option<Variant> {
    prefer_higher(b, a)
}

// ============================================================================
// PromptExperiment
// ============================================================================

/// A/B experiment comparing two prompt templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PromptExperimentData", into = "PromptExperimentData")]
pub struct PromptExperiment {
    id: ExperimentId,
    name: String,
    description: Option<String>,
    prompt_a_id: TemplateId,
    prompt_b_id: TemplateId,
    metric: ExperimentMetric,
    traffic_split: u8,
    status: ExperimentStatus,
    metrics_a: ExperimentMetrics,
    metrics_b: ExperimentMetrics,
    winner: Option<TemplateId>,
    min_sample_size: u64,
    confidence_threshold: f64,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl PromptExperiment {
    /// Start building a Draft experiment comparing two templates
    pub fn builder(
        name: impl Into<String>,
        prompt_a_id: TemplateId,
        prompt_b_id: TemplateId,
    ) -> PromptExperimentBuilder {
        PromptExperimentBuilder::new(name, prompt_a_id, prompt_b_id)
    }

    // Getters

    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn prompt_a_id(&self) -> &TemplateId {
        &self.prompt_a_id
    }

    pub fn prompt_b_id(&self) -> &TemplateId {
        &self.prompt_b_id
    }

    pub fn metric(&self) -> ExperimentMetric {
        self.metric
    }

    pub fn traffic_split(&self) -> u8 {
        self.traffic_split
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    pub fn metrics_a(&self) -> &ExperimentMetrics {
        &self.metrics_a
    }

    pub fn metrics_b(&self) -> &ExperimentMetrics {
        &self.metrics_b
    }

    pub fn winner(&self) -> Option<&TemplateId> {
        self.winner.as_ref()
    }

    pub fn min_sample_size(&self) -> u64 {
        self.min_sample_size
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Template ids of both arms, A first
    pub fn variant_ids(&self) -> [&TemplateId; 2] {
        [&self.prompt_a_id, &self.prompt_b_id]
    }

    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    /// Whether the experiment compares the given template
    pub fn involves(&self, prompt_id: &TemplateId) -> bool {
        self.variant_of(prompt_id).is_some()
    }

    /// Which arm a template id belongs to
    pub fn variant_of(&self, prompt_id: &TemplateId) -> Option<Variant> {
        if prompt_id == &self.prompt_a_id {
            Some(Variant::A)
        } else if prompt_id == &self.prompt_b_id {
            Some(Variant::B)
        } else {
            None
        }
    }

    pub fn prompt_id_for(&self, variant: Variant) -> &TemplateId {
        match variant {
            Variant::A => &self.prompt_a_id,
            Variant::B => &self.prompt_b_id,
        }
    }

    pub fn metrics_for(&self, variant: Variant) -> &ExperimentMetrics {
        match variant {
            Variant::A => &self.metrics_a,
            Variant::B => &self.metrics_b,
        }
    }

    /// Time between start and end (or now, while still going)
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.ended_at.unwrap_or_else(Utc::now) - started)
    }

    // Assignment

    /// Deterministically assign a user (and optional session) to a variant
    pub fn assign_variant(&self, user_id: &str, session_id: Option<&str>) -> VariantAssignment {
        let bucket = assignment_bucket(user_id, session_id);
        let variant = variant_for_bucket(bucket, self.traffic_split);
        VariantAssignment::new(variant, self.prompt_id_for(variant).clone(), bucket)
    }

    // Recording

    /// Record a successful run against one of the two templates
    pub fn record_success(
        &mut self,
        variant_id: &TemplateId,
        tokens: i64,
        latency_ms: f64,
        rating: Option<f64>,
    ) -> Result<(), ExperimentError> {
        self.record(variant_id, true, tokens, latency_ms, rating)
    }

    /// Record a failed run against one of the two templates
    pub fn record_failure(
        &mut self,
        variant_id: &TemplateId,
        tokens: i64,
        latency_ms: f64,
    ) -> Result<(), ExperimentError> {
        self.record(variant_id, false, tokens, latency_ms, None)
    }

    fn record(
        &mut self,
        variant_id: &TemplateId,
        success: bool,
        tokens: i64,
        latency_ms: f64,
        rating: Option<f64>,
    ) -> Result<(), ExperimentError> {
        let variant = self.require_variant(variant_id)?;
        let slot = match variant {
            Variant::A => &mut self.metrics_a,
            Variant::B => &mut self.metrics_b,
        };
        *slot = slot.record_run(success, tokens, latency_ms, rating);
        Ok(())
    }

    // Configuration

    /// Change the traffic split; only allowed while in Draft
    pub fn set_traffic_split(&mut self, traffic_split: u8) -> Result<(), ExperimentError> {
        if self.status != ExperimentStatus::Draft {
            return Err(ExperimentError::validation(
                "Traffic split can only be changed while the experiment is a draft",
            ));
        }

        validate_traffic_split(traffic_split)?;
        self.traffic_split = traffic_split;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    // Status transitions

    /// Start the experiment (Draft -> Running)
    pub fn start(&mut self) -> Result<(), ExperimentError> {
        self.transition(ExperimentStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Pause the experiment (Running -> Paused)
    pub fn pause(&mut self) -> Result<(), ExperimentError> {
        self.transition(ExperimentStatus::Paused)
    }

    /// Resume the experiment (Paused -> Running)
    pub fn resume(&mut self) -> Result<(), ExperimentError> {
        self.transition(ExperimentStatus::Running)
    }

    /// Complete the experiment (Running/Paused -> Completed)
    ///
    /// An explicit winner must be one of the two templates. Without one the
    /// winner is auto-detected and may stay empty.
    pub fn complete(&mut self, winner: Option<&TemplateId>) -> Result<(), ExperimentError> {
        self.check_transition(ExperimentStatus::Completed)?;

        let winner = match winner {
            Some(id) => {
                self.require_variant(id)?;
                Some(id.clone())
            }
            None => self.determine_winner().cloned(),
        };

        self.status = ExperimentStatus::Completed;
        self.winner = winner;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Archive the experiment (Draft/Paused/Completed -> Archived)
    pub fn archive(&mut self) -> Result<(), ExperimentError> {
        let was_open = !self.status.is_terminal();
        self.transition(ExperimentStatus::Archived)?;

        if was_open {
            self.ended_at = Some(Utc::now());
        }

        Ok(())
    }

    // Analysis

    /// Template that wins under the configured metric
    ///
    /// `None` when either variant has fewer than `min_sample_size` runs or
    /// the metric values tie exactly.
    pub fn determine_winner(&self) -> Option<&TemplateId> {
        if !self.has_sufficient_data() {
            return None;
        }

        self.metric
            .better_variant(&self.metrics_a, &self.metrics_b)
            .map(|variant| self.prompt_id_for(variant))
    }

    /// Both variants reached the minimum sample size
    pub fn has_sufficient_data(&self) -> bool {
        self.metrics_a.total_runs() >= self.min_sample_size
            && self.metrics_b.total_runs() >= self.min_sample_size
    }

    // Private helpers

    fn require_variant(&self, variant_id: &TemplateId) -> Result<Variant, ExperimentError> {
        self.variant_of(variant_id)
            .ok_or_else(|| ExperimentError::InvalidVariant {
                variant_id: variant_id.to_string(),
            })
    }

    fn check_transition(&self, target: ExperimentStatus) -> Result<(), ExperimentError> {
        if !self.status.can_transition_to(target) {
            return Err(ExperimentError::InvalidTransition {
                current: self.status,
                attempted: target,
            });
        }

        Ok(())
    }

    fn transition(&mut self, target: ExperimentStatus) -> Result<(), ExperimentError> {
        self.check_transition(target)?;
        self.status = target;
        Ok(())
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        if self.name.trim().is_empty() {
            return Err(ExperimentError::validation("Experiment name cannot be empty"));
        }

        if self.prompt_a_id == self.prompt_b_id {
            return Err(ExperimentError::validation(
                "Variants A and B must reference different templates",
            ));
        }

        validate_traffic_split(self.traffic_split)?;
        validate_min_sample_size(self.min_sample_size)?;
        validate_confidence_threshold(self.confidence_threshold)?;

        if let Some(winner) = &self.winner {
            self.require_variant(winner)?;
        }

        Ok(())
    }
}

// ============================================================================
// PromptExperimentBuilder
// ============================================================================

/// Builder for new Draft experiments
#[derive(Debug, Clone)]
pub struct PromptExperimentBuilder {
    id: Option<ExperimentId>,
    name: String,
    description: Option<String>,
    prompt_a_id: TemplateId,
    prompt_b_id: TemplateId,
    metric: ExperimentMetric,
    traffic_split: u8,
    min_sample_size: u64,
    confidence_threshold: f64,
    created_by: Option<String>,
}

impl PromptExperimentBuilder {
    fn new(name: impl Into<String>, prompt_a_id: TemplateId, prompt_b_id: TemplateId) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            prompt_a_id,
            prompt_b_id,
            metric: ExperimentMetric::default(),
            traffic_split: DEFAULT_TRAFFIC_SPLIT,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            created_by: None,
        }
    }

    pub fn with_id(mut self, id: ExperimentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metric(mut self, metric: ExperimentMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_traffic_split(mut self, traffic_split: u8) -> Self {
        self.traffic_split = traffic_split;
        self
    }

    pub fn with_min_sample_size(mut self, min_sample_size: u64) -> Self {
        self.min_sample_size = min_sample_size;
        self
    }

    pub fn with_confidence_threshold(mut self, confidence_threshold: f64) -> Self {
        self.confidence_threshold = confidence_threshold;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn build(self) -> Result<PromptExperiment, ExperimentError> {
        let experiment = PromptExperiment {
            id: self.id.unwrap_or_else(ExperimentId::generate),
            name: self.name,
            description: self.description,
            prompt_a_id: self.prompt_a_id,
            prompt_b_id: self.prompt_b_id,
            metric: self.metric,
            traffic_split: self.traffic_split,
            status: ExperimentStatus::Draft,
            metrics_a: ExperimentMetrics::new(),
            metrics_b: ExperimentMetrics::new(),
            winner: None,
            min_sample_size: self.min_sample_size,
            confidence_threshold: self.confidence_threshold,
            created_by: self.created_by,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        experiment.validate()?;
        Ok(experiment)
    }
}

// ============================================================================
// Wire form
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptExperimentData {
    #[serde(default = "ExperimentId::generate")]
    id: ExperimentId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    prompt_a_id: TemplateId,
    prompt_b_id: TemplateId,
    #[serde(default)]
    metric: ExperimentMetric,
    #[serde(default = "default_traffic_split")]
    traffic_split: u8,
    #[serde(default)]
    status: ExperimentStatus,
    #[serde(default)]
    metrics_a: ExperimentMetrics,
    #[serde(default)]
    metrics_b: ExperimentMetrics,
    #[serde(default)]
    winner: Option<TemplateId>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default = "default_min_sample_size")]
    min_sample_size: u64,
    #[serde(default = "default_confidence_threshold")]
    confidence_threshold: f64,
}

fn default_traffic_split() -> u8 {
    DEFAULT_TRAFFIC_SPLIT
}

fn default_min_sample_size() -> u64 {
    DEFAULT_MIN_SAMPLE_SIZE
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

impl TryFrom<PromptExperimentData> for PromptExperiment {
    type Error = ExperimentError;

    fn try_from(data: PromptExperimentData) -> Result<Self, Self::Error> {
        let experiment = Self {
            id: data.id,
            name: data.name,
            description: data.description,
            prompt_a_id: data.prompt_a_id,
            prompt_b_id: data.prompt_b_id,
            metric: data.metric,
            traffic_split: data.traffic_split,
            status: data.status,
            metrics_a: data.metrics_a,
            metrics_b: data.metrics_b,
            winner: data.winner,
            min_sample_size: data.min_sample_size,
            confidence_threshold: data.confidence_threshold,
            created_by: data.created_by,
            created_at: data.created_at,
            started_at: data.started_at,
            ended_at: data.ended_at,
        };
        experiment.validate()?;
        Ok(experiment)
    }
}

impl From<PromptExperiment> for PromptExperimentData {
    fn from(experiment: PromptExperiment) -> Self {
        Self {
            id: experiment.id,
            name: experiment.name,
            description: experiment.description,
            prompt_a_id: experiment.prompt_a_id,
            prompt_b_id: experiment.prompt_b_id,
            metric: experiment.metric,
            traffic_split: experiment.traffic_split,
            status: experiment.status,
            metrics_a: experiment.metrics_a,
            metrics_b: experiment.metrics_b,
            winner: experiment.winner,
            created_at: experiment.created_at,
            started_at: experiment.started_at,
            ended_at: experiment.ended_at,
            created_by: experiment.created_by,
            min_sample_size: experiment.min_sample_size,
            confidence_threshold: experiment.confidence_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> TemplateId {
        TemplateId::new(value).unwrap()
    }

    fn experiment(split: u8) -> PromptExperiment {
        PromptExperiment::builder("Greeting test", id("prompt-a"), id("prompt-b"))
            .with_traffic_split(split)
            .with_min_sample_size(50)
            .build()
            .unwrap()
    }

    fn record_outcomes(exp: &mut PromptExperiment, variant: &str, successes: u64, total: u64) {
        for i in 0..total {
            if i < successes {
                exp.record_success(&id(variant), 100, 200.0, None).unwrap();
            } else {
                exp.record_failure(&id(variant), 100, 200.0).unwrap();
            }
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn test_default_status() {
            assert_eq!(ExperimentStatus::default(), ExperimentStatus::Draft);
        }

        #[test]
        fn test_status_transitions() {
            assert!(ExperimentStatus::Draft.can_transition_to(ExperimentStatus::Running));
            assert!(ExperimentStatus::Running.can_transition_to(ExperimentStatus::Paused));
            assert!(ExperimentStatus::Running.can_transition_to(ExperimentStatus::Completed));
            assert!(ExperimentStatus::Paused.can_transition_to(ExperimentStatus::Running));
            assert!(ExperimentStatus::Paused.can_transition_to(ExperimentStatus::Completed));
            assert!(ExperimentStatus::Completed.can_transition_to(ExperimentStatus::Archived));

            assert!(!ExperimentStatus::Draft.can_transition_to(ExperimentStatus::Paused));
            assert!(!ExperimentStatus::Draft.can_transition_to(ExperimentStatus::Completed));
            assert!(!ExperimentStatus::Completed.can_transition_to(ExperimentStatus::Running));
            assert!(!ExperimentStatus::Completed.can_transition_to(ExperimentStatus::Draft));
            assert!(!ExperimentStatus::Running.can_transition_to(ExperimentStatus::Archived));
            assert!(!ExperimentStatus::Archived.can_transition_to(ExperimentStatus::Draft));
        }

        #[test]
        fn test_status_serialization() {
            let json = serde_json::to_string(&ExperimentStatus::Running).unwrap();
            assert_eq!(json, "\"running\"");
            let metric = serde_json::to_string(&ExperimentMetric::TokenEfficiency).unwrap();
            assert_eq!(metric, "\"token_efficiency\"");
        }
    }

    mod construction_tests {
        use super::*;

        #[test]
        fn test_builder_defaults() {
            let exp = PromptExperiment::builder("t", id("a"), id("b")).build().unwrap();
            assert_eq!(exp.status(), ExperimentStatus::Draft);
            assert_eq!(exp.traffic_split(), DEFAULT_TRAFFIC_SPLIT);
            assert_eq!(exp.min_sample_size(), DEFAULT_MIN_SAMPLE_SIZE);
            assert_eq!(exp.metric(), ExperimentMetric::SuccessRate);
            assert!(exp.winner().is_none());
            assert!(exp.started_at().is_none());
        }

        #[test]
        fn test_same_prompt_rejected() {
            let result = PromptExperiment::builder("t", id("a"), id("a")).build();
            assert!(matches!(result, Err(ExperimentError::Validation { .. })));
        }

        #[test]
        fn test_invalid_parameters_rejected() {
            let base = PromptExperiment::builder("t", id("a"), id("b"));
            assert!(base.clone().with_traffic_split(101).build().is_err());
            assert!(base.clone().with_min_sample_size(0).build().is_err());
            assert!(base.clone().with_confidence_threshold(0.0).build().is_err());
            assert!(PromptExperiment::builder(" ", id("a"), id("b")).build().is_err());
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_full_lifecycle() {
            let mut exp = experiment(50);

            exp.start().unwrap();
            assert_eq!(exp.status(), ExperimentStatus::Running);
            assert!(exp.started_at().is_some());

            exp.pause().unwrap();
            assert_eq!(exp.status(), ExperimentStatus::Paused);

            exp.resume().unwrap();
            assert!(exp.is_running());

            exp.complete(None).unwrap();
            assert_eq!(exp.status(), ExperimentStatus::Completed);
            assert!(exp.ended_at().is_some());
            assert!(exp.winner().is_none());

            exp.archive().unwrap();
            assert_eq!(exp.status(), ExperimentStatus::Archived);
        }

        #[test]
        fn test_invalid_transitions() {
            let mut exp = experiment(50);

            assert_eq!(
                exp.pause(),
                Err(ExperimentError::InvalidTransition {
                    current: ExperimentStatus::Draft,
                    attempted: ExperimentStatus::Paused,
                })
            );
            assert!(exp.complete(None).is_err());
            assert!(exp.resume().is_err());

            exp.start().unwrap();
            assert!(exp.start().is_err());
            assert!(exp.archive().is_err());

            exp.complete(None).unwrap();
            assert!(exp.start().is_err());
            assert!(exp.resume().is_err());
            assert!(exp.complete(None).is_err());
        }

        #[test]
        fn test_complete_with_explicit_winner() {
            let mut exp = experiment(50);
            exp.start().unwrap();

            let err = exp.complete(Some(&id("prompt-c"))).unwrap_err();
            assert!(matches!(err, ExperimentError::InvalidVariant { .. }));
            assert_eq!(exp.status(), ExperimentStatus::Running);

            exp.complete(Some(&id("prompt-b"))).unwrap();
            assert_eq!(exp.winner(), Some(&id("prompt-b")));
        }

        #[test]
        fn test_complete_auto_detects_winner() {
            let mut exp = experiment(50);
            exp.start().unwrap();
            record_outcomes(&mut exp, "prompt-a", 80, 100);
            record_outcomes(&mut exp, "prompt-b", 60, 100);
            exp.pause().unwrap();

            exp.complete(None).unwrap();
            assert_eq!(exp.winner(), Some(&id("prompt-a")));
        }

        #[test]
        fn test_traffic_split_only_editable_in_draft() {
            let mut exp = experiment(50);
            exp.set_traffic_split(70).unwrap();
            assert_eq!(exp.traffic_split(), 70);

            exp.start().unwrap();
            assert!(exp.set_traffic_split(30).is_err());
        }
    }

    mod recording_tests {
        use super::*;

        #[test]
        fn test_record_updates_correct_variant() {
            let mut exp = experiment(50);
            exp.record_success(&id("prompt-a"), 120, 300.0, Some(5.0)).unwrap();
            exp.record_failure(&id("prompt-b"), 80, 100.0).unwrap();

            assert_eq!(exp.metrics_a().success_count(), 1);
            assert_eq!(exp.metrics_a().rating_count(), 1);
            assert_eq!(exp.metrics_b().failure_count(), 1);
            assert_eq!(exp.metrics_for(Variant::B).total_tokens(), 80);
        }

        #[test]
        fn test_record_unknown_variant() {
            let mut exp = experiment(50);
            let err = exp.record_success(&id("other"), 1, 1.0, None).unwrap_err();
            assert_eq!(
                err,
                ExperimentError::InvalidVariant {
                    variant_id: "other".to_string()
                }
            );
            assert_eq!(exp.metrics_a().total_runs(), 0);
        }

        #[test]
        fn test_totals_invariant_holds() {
            let mut exp = experiment(50);
            record_outcomes(&mut exp, "prompt-a", 7, 20);
            record_outcomes(&mut exp, "prompt-b", 0, 5);

            for metrics in [exp.metrics_a(), exp.metrics_b()] {
                assert_eq!(
                    metrics.total_runs(),
                    metrics.success_count() + metrics.failure_count()
                );
            }
        }
    }

    mod assignment_tests {
        use super::*;

        #[test]
        fn test_assignment_is_deterministic() {
            let exp = experiment(50);
            let first = exp.assign_variant("user-1", Some("session-9"));
            let second = exp.assign_variant("user-1", Some("session-9"));
            assert_eq!(first, second);
        }

        #[test]
        fn test_assignment_split_converges() {
            let exp = experiment(30);
            let assigned_a = (0..10_000)
                .filter(|i| exp.assign_variant(&format!("user-{}", i), None).variant() == Variant::A)
                .count();

            let fraction = assigned_a as f64 / 10_000.0;
            assert!(
                (0.25..=0.35).contains(&fraction),
                "fraction assigned to A was {}",
                fraction
            );
        }

        #[test]
        fn test_assignment_extremes() {
            let all_b = experiment(0);
            let all_a = experiment(100);

            for i in 0..1000 {
                let user = format!("user-{}", i);
                assert_eq!(all_b.assign_variant(&user, None).prompt_id(), &id("prompt-b"));
                assert_eq!(all_a.assign_variant(&user, Some("s")).prompt_id(), &id("prompt-a"));
            }
        }
    }

    mod winner_tests {
        use super::*;

        fn with_metric(metric: ExperimentMetric) -> PromptExperiment {
            PromptExperiment::builder("t", id("prompt-a"), id("prompt-b"))
                .with_metric(metric)
                .with_min_sample_size(2)
                .build()
                .unwrap()
        }

        #[test]
        fn test_success_rate_winner() {
            let mut exp = experiment(50);
            record_outcomes(&mut exp, "prompt-a", 80, 100);
            record_outcomes(&mut exp, "prompt-b", 60, 100);
            assert_eq!(exp.determine_winner(), Some(&id("prompt-a")));
        }

        #[test]
        fn test_insufficient_data() {
            let mut exp = experiment(50);
            record_outcomes(&mut exp, "prompt-a", 40, 49);
            record_outcomes(&mut exp, "prompt-b", 10, 100);
            assert!(!exp.has_sufficient_data());
            assert!(exp.determine_winner().is_none());
        }

        #[test]
        fn test_exact_tie() {
            let mut exp = experiment(50);
            record_outcomes(&mut exp, "prompt-a", 30, 60);
            record_outcomes(&mut exp, "prompt-b", 30, 60);
            assert!(exp.determine_winner().is_none());
        }

        #[test]
        fn test_latency_prefers_lower() {
            let mut exp = with_metric(ExperimentMetric::Latency);
            for _ in 0..2 {
                exp.record_success(&id("prompt-a"), 10, 500.0, None).unwrap();
                exp.record_success(&id("prompt-b"), 10, 150.0, None).unwrap();
            }
            assert_eq!(exp.determine_winner(), Some(&id("prompt-b")));
        }

        #[test]
        fn test_user_rating_prefers_higher() {
            let mut exp = with_metric(ExperimentMetric::UserRating);
            for _ in 0..2 {
                exp.record_success(&id("prompt-a"), 10, 1.0, Some(4.5)).unwrap();
                exp.record_success(&id("prompt-b"), 10, 1.0, Some(3.0)).unwrap();
            }
            assert_eq!(exp.determine_winner(), Some(&id("prompt-a")));
        }

        #[test]
        fn test_token_efficiency_finite_beats_infinite() {
            let mut exp = with_metric(ExperimentMetric::TokenEfficiency);
            for _ in 0..2 {
                exp.record_failure(&id("prompt-a"), 10, 1.0).unwrap();
                exp.record_success(&id("prompt-b"), 5000, 1.0, None).unwrap();
            }
            assert_eq!(exp.determine_winner(), Some(&id("prompt-b")));
        }

        #[test]
        fn test_token_efficiency_both_infinite_is_tie() {
            let mut exp = with_metric(ExperimentMetric::TokenEfficiency);
            for _ in 0..2 {
                exp.record_failure(&id("prompt-a"), 10, 1.0).unwrap();
                exp.record_failure(&id("prompt-b"), 20, 1.0).unwrap();
            }
            assert!(exp.determine_winner().is_none());
        }

        #[test]
        fn test_token_efficiency_prefers_lower() {
            let mut exp = with_metric(ExperimentMetric::TokenEfficiency);
            for _ in 0..2 {
                exp.record_success(&id("prompt-a"), 300, 1.0, None).unwrap();
                exp.record_success(&id("prompt-b"), 200, 1.0, None).unwrap();
            }
            assert_eq!(exp.determine_winner(), Some(&id("prompt-b")));
        }
    }

    mod serialization_tests {
        use super::*;

        #[test]
        fn test_round_trip() {
            let mut exp = PromptExperiment::builder("Tone test", id("prompt-a"), id("prompt-b"))
                .with_description("Formal vs casual")
                .with_metric(ExperimentMetric::Latency)
                .with_traffic_split(40)
                .with_created_by("alice")
                .build()
                .unwrap();
            exp.start().unwrap();
            exp.record_success(&id("prompt-a"), 10, 20.5, Some(4.0)).unwrap();
            exp.complete(Some(&id("prompt-a"))).unwrap();

            let json = serde_json::to_value(&exp).unwrap();
            assert_eq!(json["status"], "completed");
            assert_eq!(json["metric"], "latency");
            assert_eq!(json["winner"], "prompt-a");
            assert_eq!(json["metrics_a"]["success_count"], 1);

            let parsed: PromptExperiment = serde_json::from_value(json).unwrap();
            assert_eq!(parsed, exp);
        }

        #[test]
        fn test_null_timestamps() {
            let exp = experiment(50);
            let json = serde_json::to_value(&exp).unwrap();
            assert!(json["started_at"].is_null());
            assert!(json["ended_at"].is_null());
        }

        #[test]
        fn test_deserialize_rejects_foreign_winner() {
            let mut json = serde_json::to_value(experiment(50)).unwrap();
            json["winner"] = serde_json::Value::String("prompt-z".to_string());
            assert!(serde_json::from_value::<PromptExperiment>(json).is_err());
        }
    }
}
