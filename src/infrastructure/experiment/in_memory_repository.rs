//! In-memory implementation of the experiment repository

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::DomainError;
use crate::domain::experiment::{
    ExperimentId, ExperimentQuery, ExperimentRepository, PromptExperiment,
};

/// In-memory experiment repository implementation
#[derive(Debug, Clone, Default)]
pub struct InMemoryExperimentRepository {
    experiments: Arc<RwLock<HashMap<String, PromptExperiment>>>,
}

impl InMemoryExperimentRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self::default()
    }

    async fn matching(&self, query: &ExperimentQuery) -> Vec<PromptExperiment> {
        let experiments = self.experiments.read().await;

        let mut results: Vec<PromptExperiment> = experiments
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });

        results
    }
}

#[async_trait]
impl ExperimentRepository for InMemoryExperimentRepository {
    async fn save(&self, experiment: PromptExperiment) -> Result<ExperimentId, DomainError> {
        let mut experiments = self.experiments.write().await;
        let id = experiment.id().clone();

        experiments.insert(id.as_str().to_string(), experiment);
        Ok(id)
    }

    async fn get_by_id(
        &self,
        id: &ExperimentId,
    ) -> Result<Option<PromptExperiment>, DomainError> {
        let experiments = self.experiments.read().await;
        Ok(experiments.get(id.as_str()).cloned())
    }

    async fn list_all(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<PromptExperiment>, DomainError> {
        let results = self.matching(query).await;

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        let mut experiments = self.experiments.write().await;
        Ok(experiments.remove(id.as_str()).is_some())
    }

    async fn count(&self, query: &ExperimentQuery) -> Result<usize, DomainError> {
        Ok(self.matching(query).await.len())
    }
}
