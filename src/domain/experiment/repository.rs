//! Experiment repository trait and query types

use async_trait::async_trait;

use super::entity::{ExperimentId, ExperimentStatus, PromptExperiment};
use crate::domain::DomainError;
use crate::domain::prompt::TemplateId;

#[cfg(test)]
use mockall::automock;

/// Query parameters for listing experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by template (matches either variant)
    pub prompt_id: Option<TemplateId>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl ExperimentQuery {
    /// Create a new query with no filters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_prompt(mut self, prompt_id: TemplateId) -> Self {
        self.prompt_id = Some(prompt_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check the status and template filters against an experiment
    pub fn matches(&self, experiment: &PromptExperiment) -> bool {
        let status_ok = self.status.is_none_or(|status| experiment.status() == status);
        let prompt_ok = self
            .prompt_id
            .as_ref()
            .is_none_or(|prompt_id| experiment.involves(prompt_id));

        status_ok && prompt_ok
    }
}

/// Repository trait for experiments
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    /// Insert or replace an experiment, returning its id
    async fn save(&self, experiment: PromptExperiment) -> Result<ExperimentId, DomainError>;

    /// Get an experiment by ID
    async fn get_by_id(&self, id: &ExperimentId)
        -> Result<Option<PromptExperiment>, DomainError>;

    /// List experiments matching the query, oldest first
    async fn list_all(&self, query: &ExperimentQuery)
        -> Result<Vec<PromptExperiment>, DomainError>;

    /// Delete an experiment by ID
    async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError>;

    /// Count experiments matching the query's filters (paging is ignored)
    async fn count(&self, query: &ExperimentQuery) -> Result<usize, DomainError>;
}
