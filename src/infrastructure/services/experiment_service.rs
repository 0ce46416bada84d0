//! Experiment service for prompt A/B testing
//!
//! Provides business logic for managing experiments, variant assignments,
//! result recording and significance analysis.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::experiment::{
    ExperimentAnalysis, ExperimentError, ExperimentId, ExperimentMetric, ExperimentQuery,
    ExperimentRepository, PromptExperiment, VariantAssignment,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_TRAFFIC_SPLIT,
};
use crate::domain::prompt::{PromptTemplateRepository, TemplateId};
use crate::domain::DomainError;
use crate::infrastructure::experiment::analyze;

// ============================================================================
// Request Types
// ============================================================================

/// Defaults applied to new experiments when a request leaves them unset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentDefaults {
    pub traffic_split: u8,
    pub min_sample_size: u64,
    pub confidence_threshold: f64,
}

impl Default for ExperimentDefaults {
    fn default() -> Self {
        Self {
            traffic_split: DEFAULT_TRAFFIC_SPLIT,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Request to create a new experiment
#[derive(Debug, Clone, Default)]
pub struct CreateExperimentRequest {
    pub name: String,
    pub description: Option<String>,
    pub prompt_a_id: String,
    pub prompt_b_id: String,
    pub metric: ExperimentMetric,
    pub traffic_split: Option<u8>,
    pub min_sample_size: Option<u64>,
    pub confidence_threshold: Option<f64>,
    pub created_by: Option<String>,
}

// ============================================================================
// Experiment Service
// ============================================================================

/// Service for managing prompt A/B experiments
///
/// Every read-modify-write of an experiment runs under one async lock, so
/// concurrent recordings against the same experiment are never lost.
#[derive(Debug)]
pub struct ExperimentService<E: ExperimentRepository, P: PromptTemplateRepository> {
    experiments: Arc<E>,
    prompts: Arc<P>,
    defaults: ExperimentDefaults,
    write_lock: Mutex<()>,
}

impl<E: ExperimentRepository, P: PromptTemplateRepository> ExperimentService<E, P> {
    /// Create a new experiment service
    pub fn new(experiments: Arc<E>, prompts: Arc<P>) -> Self {
        Self {
            experiments,
            prompts,
            defaults: ExperimentDefaults::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Override the defaults used for new experiments
    pub fn with_defaults(mut self, defaults: ExperimentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    // ========================================================================
    // CRUD Operations
    // ========================================================================

    /// Create a Draft experiment; both templates must exist
    pub async fn create(
        &self,
        request: CreateExperimentRequest,
    ) -> Result<PromptExperiment, DomainError> {
        debug!(name = %request.name, "Creating experiment");

        let prompt_a_id = self.require_prompt(&request.prompt_a_id).await?;
        let prompt_b_id = self.require_prompt(&request.prompt_b_id).await?;

        let mut builder = PromptExperiment::builder(request.name, prompt_a_id, prompt_b_id)
            .with_metric(request.metric)
            .with_traffic_split(request.traffic_split.unwrap_or(self.defaults.traffic_split))
            .with_min_sample_size(
                request
                    .min_sample_size
                    .unwrap_or(self.defaults.min_sample_size),
            )
            .with_confidence_threshold(
                request
                    .confidence_threshold
                    .unwrap_or(self.defaults.confidence_threshold),
            );

        if let Some(description) = request.description {
            builder = builder.with_description(description);
        }

        if let Some(created_by) = request.created_by {
            builder = builder.with_created_by(created_by);
        }

        let experiment = builder.build()?;
        self.experiments.save(experiment.clone()).await?;

        info!(experiment_id = %experiment.id(), "Experiment created");
        Ok(experiment)
    }

    /// Get an experiment by ID
    pub async fn get(&self, id: &str) -> Result<Option<PromptExperiment>, DomainError> {
        let experiment_id = self.parse_id(id)?;
        self.experiments.get_by_id(&experiment_id).await
    }

    /// Get an experiment by ID, returning an error if not found
    pub async fn get_required(&self, id: &str) -> Result<PromptExperiment, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Experiment '{}' not found", id)))
    }

    /// List experiments with optional filters
    pub async fn list(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<PromptExperiment>, DomainError> {
        self.experiments.list_all(query).await
    }

    /// Count experiments matching the filters
    pub async fn count(&self, query: &ExperimentQuery) -> Result<usize, DomainError> {
        self.experiments.count(query).await
    }

    /// Delete an experiment; running experiments must be paused or completed first
    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        debug!(experiment_id = %id, "Deleting experiment");

        let _guard = self.write_lock.lock().await;
        let experiment_id = self.parse_id(id)?;

        let Some(experiment) = self.experiments.get_by_id(&experiment_id).await? else {
            return Ok(false);
        };

        if experiment.is_running() {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' is running and cannot be deleted",
                id
            )));
        }

        let deleted = self.experiments.delete(&experiment_id).await?;

        if deleted {
            info!(experiment_id = %id, "Experiment deleted");
        }

        Ok(deleted)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a Draft experiment
    pub async fn start(&self, id: &str) -> Result<PromptExperiment, DomainError> {
        let experiment = self.mutate(id, |e| e.start()).await?;
        info!(experiment_id = %id, "Experiment started");
        Ok(experiment)
    }

    /// Pause a running experiment
    pub async fn pause(&self, id: &str) -> Result<PromptExperiment, DomainError> {
        let experiment = self.mutate(id, |e| e.pause()).await?;
        info!(experiment_id = %id, "Experiment paused");
        Ok(experiment)
    }

    /// Resume a paused experiment
    pub async fn resume(&self, id: &str) -> Result<PromptExperiment, DomainError> {
        let experiment = self.mutate(id, |e| e.resume()).await?;
        info!(experiment_id = %id, "Experiment resumed");
        Ok(experiment)
    }

    /// Complete an experiment, with an explicit winner or auto-detection
    pub async fn complete(
        &self,
        id: &str,
        winner: Option<&str>,
    ) -> Result<PromptExperiment, DomainError> {
        let winner = winner.map(TemplateId::new).transpose()?;
        let experiment = self.mutate(id, |e| e.complete(winner.as_ref())).await?;

        info!(
            experiment_id = %id,
            winner = ?experiment.winner().map(|w| w.as_str()),
            "Experiment completed"
        );
        Ok(experiment)
    }

    /// Archive an experiment that is not running
    pub async fn archive(&self, id: &str) -> Result<PromptExperiment, DomainError> {
        let experiment = self.mutate(id, |e| e.archive()).await?;
        info!(experiment_id = %id, "Experiment archived");
        Ok(experiment)
    }

    // ========================================================================
    // Assignment and recording
    // ========================================================================

    /// Assign a user (and optional session) to a variant of a running experiment
    pub async fn assign(
        &self,
        id: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<VariantAssignment, DomainError> {
        let experiment = self.get_required(id).await?;
        Self::require_running(&experiment)?;

        let assignment = experiment.assign_variant(user_id, session_id);

        debug!(
            experiment_id = %id,
            user_id = %user_id,
            variant = %assignment.variant(),
            bucket = assignment.bucket(),
            "Variant assigned"
        );
        Ok(assignment)
    }

    /// Record a successful run for a variant of a running experiment
    pub async fn record_success(
        &self,
        id: &str,
        variant_id: &str,
        tokens: i64,
        latency_ms: f64,
        rating: Option<f64>,
    ) -> Result<PromptExperiment, DomainError> {
        let variant_id = TemplateId::new(variant_id)?;

        self.mutate_running(id, |e| {
            e.record_success(&variant_id, tokens, latency_ms, rating)
        })
        .await
    }

    /// Record a failed run for a variant of a running experiment
    pub async fn record_failure(
        &self,
        id: &str,
        variant_id: &str,
        tokens: i64,
        latency_ms: f64,
    ) -> Result<PromptExperiment, DomainError> {
        let variant_id = TemplateId::new(variant_id)?;

        self.mutate_running(id, |e| e.record_failure(&variant_id, tokens, latency_ms))
            .await
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Significance report for the experiment's current metrics
    pub async fn analyze(&self, id: &str) -> Result<ExperimentAnalysis, DomainError> {
        let experiment = self.get_required(id).await?;
        let analysis = analyze(&experiment);

        debug!(
            experiment_id = %id,
            z_score = analysis.z_test.z_score,
            p_value = analysis.z_test.p_value,
            "Experiment analyzed"
        );
        Ok(analysis)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn parse_id(&self, id: &str) -> Result<ExperimentId, DomainError> {
        Ok(ExperimentId::new(id)?)
    }

    async fn require_prompt(&self, id: &str) -> Result<TemplateId, DomainError> {
        let prompt_id = TemplateId::new(id)?;

        if self.prompts.get_by_id(&prompt_id).await?.is_none() {
            return Err(DomainError::not_found(format!("Template '{}' not found", id)));
        }

        Ok(prompt_id)
    }

    fn require_running(experiment: &PromptExperiment) -> Result<(), DomainError> {
        if !experiment.is_running() {
            return Err(DomainError::validation(format!(
                "Experiment '{}' is {}, not running",
                experiment.id(),
                experiment.status()
            )));
        }

        Ok(())
    }

    async fn mutate_running<F>(&self, id: &str, change: F) -> Result<PromptExperiment, DomainError>
    where
        F: FnOnce(&mut PromptExperiment) -> Result<(), ExperimentError>,
    {
        self.apply(id, true, change).await
    }

    async fn mutate<F>(&self, id: &str, change: F) -> Result<PromptExperiment, DomainError>
    where
        F: FnOnce(&mut PromptExperiment) -> Result<(), ExperimentError>,
    {
        self.apply(id, false, change).await
    }

    async fn apply<F>(
        &self,
        id: &str,
        running_only: bool,
        change: F,
    ) -> Result<PromptExperiment, DomainError>
    where
        F: FnOnce(&mut PromptExperiment) -> Result<(), ExperimentError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut experiment = self.get_required(id).await?;

        if running_only {
            Self::require_running(&experiment)?;
        }

        change(&mut experiment)?;
        self.experiments.save(experiment.clone()).await?;
        Ok(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        ExperimentStatus, MockExperimentRepository, Recommendation, Variant,
    };
    use crate::domain::prompt::{MockPromptTemplateRepository, PromptTemplate};
    use crate::infrastructure::experiment::InMemoryExperimentRepository;
    use crate::infrastructure::prompt::InMemoryPromptTemplateRepository;

    type Service = ExperimentService<InMemoryExperimentRepository, InMemoryPromptTemplateRepository>;

    async fn setup() -> (Service, TemplateId, TemplateId) {
        let prompts = Arc::new(InMemoryPromptTemplateRepository::new());
        let a = PromptTemplate::new("formal", "Dear {{name}},").unwrap();
        let b = PromptTemplate::new("casual", "Hey {{name}}!").unwrap();
        let a_id = prompts.save(a).await.unwrap();
        let b_id = prompts.save(b).await.unwrap();

        let service = ExperimentService::new(
            Arc::new(InMemoryExperimentRepository::new()),
            prompts,
        )
        .with_defaults(ExperimentDefaults {
            min_sample_size: 50,
            ..Default::default()
        });

        (service, a_id, b_id)
    }

    fn request(a: &TemplateId, b: &TemplateId) -> CreateExperimentRequest {
        CreateExperimentRequest {
            name: "Greeting tone".to_string(),
            prompt_a_id: a.to_string(),
            prompt_b_id: b.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let (service, a, b) = setup().await;
        let exp = service.create(request(&a, &b)).await.unwrap();

        assert_eq!(exp.status(), ExperimentStatus::Draft);
        assert_eq!(exp.min_sample_size(), 50);
        assert_eq!(exp.traffic_split(), DEFAULT_TRAFFIC_SPLIT);

        let loaded = service.get_required(exp.id().as_str()).await.unwrap();
        assert_eq!(loaded, exp);
    }

    #[tokio::test]
    async fn test_create_requires_existing_prompts() {
        let (service, a, _) = setup().await;
        let missing = TemplateId::new("ghost").unwrap();

        let err = service.create(request(&a, &missing)).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_same_prompt() {
        let (service, a, _) = setup().await;
        let err = service.create(request(&a, &a)).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Experiment(ExperimentError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_persists() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();

        service.start(&id).await.unwrap();
        service.pause(&id).await.unwrap();
        assert_eq!(
            service.get_required(&id).await.unwrap().status(),
            ExperimentStatus::Paused
        );

        service.resume(&id).await.unwrap();
        let done = service.complete(&id, Some(b.as_str())).await.unwrap();
        assert_eq!(done.winner(), Some(&b));

        let archived = service.archive(&id).await.unwrap();
        assert_eq!(archived.status(), ExperimentStatus::Archived);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_reported() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();

        let err = service.pause(&id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Experiment(ExperimentError::InvalidTransition { .. })
        ));
        assert_eq!(
            service.get_required(&id).await.unwrap().status(),
            ExperimentStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_assign_requires_running() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();

        assert!(service.assign(&id, "user-1", None).await.is_err());

        service.start(&id).await.unwrap();
        let first = service.assign(&id, "user-1", Some("s1")).await.unwrap();
        let second = service.assign(&id, "user-1", Some("s1")).await.unwrap();
        assert_eq!(first, second);
        assert!(first.prompt_id() == &a || first.prompt_id() == &b);
    }

    #[tokio::test]
    async fn test_recording_and_analysis() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();

        assert!(service
            .record_success(&id, a.as_str(), 10, 5.0, None)
            .await
            .is_err());

        service.start(&id).await.unwrap();

        for i in 0..100 {
            if i < 80 {
                service.record_success(&id, a.as_str(), 10, 5.0, Some(4.0)).await.unwrap();
            } else {
                service.record_failure(&id, a.as_str(), 10, 5.0).await.unwrap();
            }

            if i < 60 {
                service.record_success(&id, b.as_str(), 10, 5.0, None).await.unwrap();
            } else {
                service.record_failure(&id, b.as_str(), 10, 5.0).await.unwrap();
            }
        }

        let analysis = service.analyze(&id).await.unwrap();
        assert!(analysis.sample_size_met);
        assert_eq!(analysis.winner, Some(a.clone()));
        assert_eq!(
            analysis.recommendation,
            Recommendation::Complete {
                variant: Variant::A,
                winner: a.clone(),
            }
        );

        let done = service.complete(&id, None).await.unwrap();
        assert_eq!(done.winner(), Some(&a));
    }

    #[tokio::test]
    async fn test_record_unknown_variant() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();
        service.start(&id).await.unwrap();

        let err = service
            .record_failure(&id, "not-a-variant", 1, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Experiment(ExperimentError::InvalidVariant { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_is_not_lost() {
        let (service, a, b) = setup().await;
        let service = Arc::new(service);
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();
        service.start(&id).await.unwrap();

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = id.clone();
                let variant = a.to_string();
                tokio::spawn(async move {
                    service
                        .record_success(&id, &variant, 1, 1.0, None)
                        .await
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let exp = service.get_required(&id).await.unwrap();
        assert_eq!(exp.metrics_a().total_runs(), 40);
    }

    #[tokio::test]
    async fn test_delete_refuses_running() {
        let (service, a, b) = setup().await;
        let id = service.create(request(&a, &b)).await.unwrap().id().to_string();
        service.start(&id).await.unwrap();

        let err = service.delete(&id).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        service.pause(&id).await.unwrap();
        assert!(service.delete(&id).await.unwrap());
        assert!(!service.delete(&id).await.unwrap());
        assert_eq!(service.count(&ExperimentQuery::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        let mut experiments = MockExperimentRepository::new();
        experiments
            .expect_get_by_id()
            .returning(|_| Err(DomainError::internal("connection reset")));

        let service = ExperimentService::new(
            Arc::new(experiments),
            Arc::new(MockPromptTemplateRepository::new()),
        );

        let err = service.start("exp-1").await.unwrap_err();
        assert!(matches!(err, DomainError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_save_not_called_on_failed_transition() {
        let draft = PromptExperiment::builder(
            "exp",
            TemplateId::new("a").unwrap(),
            TemplateId::new("b").unwrap(),
        )
        .build()
        .unwrap();

        let mut experiments = MockExperimentRepository::new();
        experiments
            .expect_get_by_id()
            .returning(move |_| Ok(Some(draft.clone())));
        experiments.expect_save().never();

        let service = ExperimentService::new(
            Arc::new(experiments),
            Arc::new(MockPromptTemplateRepository::new()),
        );

        assert!(service.resume("exp").await.is_err());
    }
}
