//! In-memory prompt template repository implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::DomainError;
use crate::domain::prompt::{PromptTemplate, PromptTemplateRepository, TemplateId, TemplateQuery};

#[derive(Debug, Default)]
struct Store {
    templates: HashMap<String, PromptTemplate>,
    deleted: HashSet<String>,
}

impl Store {
    fn live(&self) -> impl Iterator<Item = &PromptTemplate> {
        self.templates
            .values()
            .filter(|t| !self.deleted.contains(t.id().as_str()))
    }

    fn get(&self, id: &str) -> Option<&PromptTemplate> {
        if self.deleted.contains(id) {
            return None;
        }

        self.templates.get(id)
    }
}

/// In-memory implementation of PromptTemplateRepository
///
/// Deleted ids are remembered so they cannot be saved again.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromptTemplateRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryPromptTemplateRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptTemplateRepository for InMemoryPromptTemplateRepository {
    async fn save(&self, template: PromptTemplate) -> Result<TemplateId, DomainError> {
        let mut store = self.store.write().await;
        let id = template.id().clone();

        if store.deleted.contains(id.as_str()) {
            return Err(DomainError::conflict(format!(
                "Template '{}' was deleted and cannot be saved again",
                id
            )));
        }

        store.templates.insert(id.as_str().to_string(), template);
        Ok(id)
    }

    async fn get_by_id(&self, id: &TemplateId) -> Result<Option<PromptTemplate>, DomainError> {
        let store = self.store.read().await;
        Ok(store.get(id.as_str()).cloned())
    }

    async fn get_by_name(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<PromptTemplate>, DomainError> {
        let store = self.store.read().await;
        let mut candidates = store.live().filter(|t| t.name() == name);

        let found = match version {
            Some(version) => candidates.find(|t| t.version() == version),
            None => candidates.max_by_key(|t| t.version()),
        };

        Ok(found.cloned())
    }

    async fn list_all(&self, query: &TemplateQuery) -> Result<Vec<PromptTemplate>, DomainError> {
        let store = self.store.read().await;

        let mut results: Vec<PromptTemplate> =
            store.live().filter(|t| query.matches(t)).cloned().collect();

        results.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.version().cmp(&b.version()))
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: &TemplateId) -> Result<bool, DomainError> {
        let mut store = self.store.write().await;

        if store.get(id.as_str()).is_none() {
            return Ok(false);
        }

        store.deleted.insert(id.as_str().to_string());
        Ok(true)
    }

    async fn get_version_history(
        &self,
        id: &TemplateId,
    ) -> Result<Vec<PromptTemplate>, DomainError> {
        let store = self.store.read().await;

        let Some(name) = store.get(id.as_str()).map(|t| t.name().to_string()) else {
            return Ok(Vec::new());
        };

        let mut history: Vec<PromptTemplate> =
            store.live().filter(|t| t.name() == name).cloned().collect();
        history.sort_by_key(|t| t.version());

        Ok(history)
    }
}
