//! Prompt template repository trait

use async_trait::async_trait;

use super::{PromptTemplate, TemplateId};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Query parameters for listing templates
#[derive(Debug, Clone, Default)]
pub struct TemplateQuery {
    /// Only templates carrying every one of these tags
    pub tags: Vec<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl TemplateQuery {
    /// Create a new query with no filters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
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

    /// Check the tag filter against a template
    pub fn matches(&self, template: &PromptTemplate) -> bool {
        self.tags.iter().all(|tag| template.has_tag(tag))
    }
}

/// Repository trait for prompt template persistence
///
/// Deletion is soft: deleted templates disappear from every read but their
/// ids are never reused.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PromptTemplateRepository: Send + Sync {
    /// Store a template, returning its id
    async fn save(&self, template: PromptTemplate) -> Result<TemplateId, DomainError>;

    /// Get a template by ID
    async fn get_by_id(&self, id: &TemplateId) -> Result<Option<PromptTemplate>, DomainError>;

    /// Get a template by name; the latest version unless one is given
    async fn get_by_name(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<PromptTemplate>, DomainError>;

    /// List templates matching the query
    async fn list_all(&self, query: &TemplateQuery) -> Result<Vec<PromptTemplate>, DomainError>;

    /// Soft-delete a template by ID
    async fn delete(&self, id: &TemplateId) -> Result<bool, DomainError>;

    /// Every version sharing the template's name, ascending by version
    async fn get_version_history(
        &self,
        id: &TemplateId,
    ) -> Result<Vec<PromptTemplate>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_tag_filter() {
        let template = PromptTemplate::builder("t", "static")
            .with_tags(vec!["a".to_string(), "b".to_string()])
            .build()
            .unwrap();

        assert!(TemplateQuery::new().matches(&template));
        assert!(TemplateQuery::new().with_tag("a").matches(&template));
        assert!(TemplateQuery::new().with_tag("a").with_tag("b").matches(&template));
        assert!(!TemplateQuery::new().with_tag("c").matches(&template));
    }
}
