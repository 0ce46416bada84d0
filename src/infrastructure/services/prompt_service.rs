//! Prompt service - versioning, lookup and rendering of prompt templates

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::prompt::{
    GenerationConfig, PromptTemplate, PromptTemplateRepository, SyntaxIssue, TemplateId,
    TemplateQuery, TemplateRegistry, TemplateUpdate, VariableDefinition,
};
use crate::domain::DomainError;

/// Request to create the first version of a template
#[derive(Debug, Clone, Default)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    /// Auto-detected from the content when empty
    pub variables: Vec<VariableDefinition>,
    pub generation_config: Option<GenerationConfig>,
    pub extends: Vec<String>,
    pub tags: Vec<String>,
}

/// Request to render a template by id or name
#[derive(Debug, Clone, Default)]
pub struct RenderTemplateRequest {
    /// Template id, or name for the latest version
    pub reference: String,
    pub values: HashMap<String, Value>,
    /// Overrides the service default when set
    pub strict: Option<bool>,
}

/// Rendered template result
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    pub template_id: TemplateId,
    pub name: String,
    pub version: u32,
    pub content: String,
    pub generation_config: GenerationConfig,
}

/// Prompt service for versioning and rendering operations
#[derive(Debug)]
pub struct PromptService<R: PromptTemplateRepository> {
    repository: Arc<R>,
    strict: bool,
    /// Serialises the check-then-save of create and new_version
    write_lock: Mutex<()>,
}

impl<R: PromptTemplateRepository> PromptService<R> {
    /// Create a new PromptService rendering in strict mode by default
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            strict: true,
            write_lock: Mutex::new(()),
        }
    }

    /// Set the default strictness used when a request does not choose one
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Create a template; the name must not already be in use
    pub async fn create(
        &self,
        request: CreateTemplateRequest,
    ) -> Result<PromptTemplate, DomainError> {
        debug!(name = %request.name, "Creating prompt template");

        let _guard = self.write_lock.lock().await;

        if self.repository.get_by_name(&request.name, None).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "Template '{}' already exists, create a new version instead",
                request.name
            )));
        }

        let mut builder = PromptTemplate::builder(request.name, request.content)
            .with_extends(request.extends)
            .with_tags(request.tags);

        if !request.variables.is_empty() {
            builder = builder.with_variables(request.variables);
        }

        if let Some(description) = request.description {
            builder = builder.with_description(description);
        }

        if let Some(config) = request.generation_config {
            builder = builder.with_generation_config(config);
        }

        let template = builder.build()?;
        self.warn_on_syntax_issues(&template);
        self.repository.save(template.clone()).await?;

        info!(template_id = %template.id(), name = %template.name(), "Prompt template created");
        Ok(template)
    }

    /// Derive and store the next version of a template
    ///
    /// Only the latest version of a name can be extended, keeping the chain linear.
    pub async fn new_version(
        &self,
        id: &str,
        update: TemplateUpdate,
    ) -> Result<PromptTemplate, DomainError> {
        debug!(template_id = %id, "Creating new template version");

        let _guard = self.write_lock.lock().await;

        let current = self.get_required(id).await?;
        let latest = self
            .repository
            .get_by_name(current.name(), None)
            .await?
            .unwrap_or_else(|| current.clone());

        if latest.id() != current.id() {
            return Err(DomainError::conflict(format!(
                "Template '{}' is version {}, but version {} is the latest",
                id,
                current.version(),
                latest.version()
            )));
        }

        let next = current.create_new_version(update)?;

        if next.name() != current.name()
            && self.repository.get_by_name(next.name(), None).await?.is_some()
        {
            return Err(DomainError::conflict(format!(
                "Template name '{}' is already in use",
                next.name()
            )));
        }

        self.warn_on_syntax_issues(&next);
        self.repository.save(next.clone()).await?;

        info!(
            template_id = %next.id(),
            parent_id = %current.id(),
            version = next.version(),
            "Template version created"
        );
        Ok(next)
    }

    /// Get a template by ID
    pub async fn get(&self, id: &str) -> Result<Option<PromptTemplate>, DomainError> {
        let template_id = self.parse_id(id)?;
        self.repository.get_by_id(&template_id).await
    }

    /// Get a template by ID, returning an error if not found
    pub async fn get_required(&self, id: &str) -> Result<PromptTemplate, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Template '{}' not found", id)))
    }

    /// Get a template by name, the latest version unless one is given
    pub async fn get_by_name(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Option<PromptTemplate>, DomainError> {
        self.repository.get_by_name(name, version).await
    }

    /// List templates
    pub async fn list(&self, query: &TemplateQuery) -> Result<Vec<PromptTemplate>, DomainError> {
        self.repository.list_all(query).await
    }

    /// All versions sharing the template's name, oldest first
    pub async fn history(&self, id: &str) -> Result<Vec<PromptTemplate>, DomainError> {
        let template_id = self.parse_id(id)?;
        self.repository.get_version_history(&template_id).await
    }

    /// Soft-delete a template version
    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        debug!(template_id = %id, "Deleting template");

        let template_id = self.parse_id(id)?;
        let deleted = self.repository.delete(&template_id).await?;

        if deleted {
            info!(template_id = %id, "Template deleted");
        }

        Ok(deleted)
    }

    /// Render a template with includes inlined and inherited variables merged
    ///
    /// References inside the template resolve against every stored template,
    /// by id first and then by name (latest version).
    pub async fn render(
        &self,
        request: RenderTemplateRequest,
    ) -> Result<RenderedTemplate, DomainError> {
        let strict = request.strict.unwrap_or(self.strict);
        let templates = self.repository.list_all(&TemplateQuery::new()).await?;
        let registry = TemplateRegistry::from_templates(&templates);

        let template = registry.lookup(&request.reference).ok_or_else(|| {
            DomainError::not_found(format!("Template '{}' not found", request.reference))
        })?;

        debug!(
            template_id = %template.id(),
            registry_size = registry.len(),
            strict,
            "Rendering template"
        );

        let content = template.render_with_inheritance(&request.values, &registry, strict)?;

        Ok(RenderedTemplate {
            template_id: template.id().clone(),
            name: template.name().to_string(),
            version: template.version(),
            content,
            generation_config: template.generation_config().clone(),
        })
    }

    /// Lint a stored template's content
    pub async fn lint(&self, id: &str) -> Result<Vec<SyntaxIssue>, DomainError> {
        Ok(self.get_required(id).await?.validate_syntax())
    }

    fn parse_id(&self, id: &str) -> Result<TemplateId, DomainError> {
        Ok(TemplateId::new(id)?)
    }

    fn warn_on_syntax_issues(&self, template: &PromptTemplate) {
        for issue in template.validate_syntax() {
            warn!(template_id = %template.id(), %issue, "Template syntax issue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prompt::{MockPromptTemplateRepository, TemplateError, VariableType};
    use crate::infrastructure::prompt::InMemoryPromptTemplateRepository;
    use serde_json::json;

    fn service() -> PromptService<InMemoryPromptTemplateRepository> {
        PromptService::new(Arc::new(InMemoryPromptTemplateRepository::new()))
    }

    fn create_request(name: &str, content: &str) -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: name.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = service();
        let created = service
            .create(create_request("greeting", "Hello {{name}}"))
            .await
            .unwrap();

        assert_eq!(created.version(), 1);
        assert_eq!(created.variables().len(), 1);

        let loaded = service.get_required(created.id().as_str()).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_name_conflicts() {
        let service = service();
        service.create(create_request("greeting", "Hi")).await.unwrap();

        let err = service.create(create_request("greeting", "Hey")).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_invalid_template() {
        let service = service();
        let request = CreateTemplateRequest {
            variables: vec![VariableDefinition::string("other")],
            ..create_request("bad", "{{a}}")
        };

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Template(TemplateError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_version_chain() {
        let service = service();
        let v1 = service
            .create(create_request("greeting", "Hello {{name}}"))
            .await
            .unwrap();

        let v2 = service
            .new_version(
                v1.id().as_str(),
                TemplateUpdate::new().with_content("Hi {{name}}!"),
            )
            .await
            .unwrap();

        assert_eq!(v2.version(), 2);
        assert_eq!(v2.parent_version_id(), Some(v1.id()));

        let history = service.history(v1.id().as_str()).await.unwrap();
        let versions: Vec<u32> = history.iter().map(|t| t.version()).collect();
        assert_eq!(versions, vec![1, 2]);

        let latest = service.get_by_name("greeting", None).await.unwrap().unwrap();
        assert_eq!(latest.id(), v2.id());
    }

    #[tokio::test]
    async fn test_new_version_from_stale_version_conflicts() {
        let service = service();
        let v1 = service.create(create_request("greeting", "Hi")).await.unwrap();
        service
            .new_version(v1.id().as_str(), TemplateUpdate::new().with_content("Hey"))
            .await
            .unwrap();

        let err = service
            .new_version(v1.id().as_str(), TemplateUpdate::new().with_content("Yo"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_new_versions_keep_chain_linear() {
        let service = Arc::new(service());
        let v1 = service.create(create_request("greeting", "Hi")).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = Arc::clone(&service);
                let id = v1.id().to_string();
                tokio::spawn(async move {
                    service
                        .new_version(&id, TemplateUpdate::new().with_content(format!("Hi {}", i)))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let history = service.history(v1.id().as_str()).await.unwrap();
        let versions: Vec<u32> = history.iter().map(|t| t.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_creates_share_one_name() {
        let service = Arc::new(service());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.create(create_request("greeting", "Hi")).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(service.list(&TemplateQuery::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_render_with_includes_and_inheritance() {
        let service = service();
        service
            .create(CreateTemplateRequest {
                variables: vec![
                    VariableDefinition::new("tone", VariableType::String)
                        .with_default("friendly")
                        .with_required(false),
                ],
                ..create_request("persona", "You are a {{tone}} assistant.")
            })
            .await
            .unwrap();
        service
            .create(create_request("task", "{{> persona}} Answer {{question}}"))
            .await
            .unwrap();

        let rendered = service
            .render(RenderTemplateRequest {
                reference: "task".to_string(),
                values: values(&[("question", json!("why?"))]),
                strict: None,
            })
            .await
            .unwrap();

        assert_eq!(rendered.content, "You are a friendly assistant. Answer why?");
        assert_eq!(rendered.name, "task");
    }

    #[tokio::test]
    async fn test_render_strictness() {
        let service = service();
        service
            .create(create_request("greeting", "Hello {{name}}"))
            .await
            .unwrap();

        let strict = service
            .render(RenderTemplateRequest {
                reference: "greeting".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            strict,
            DomainError::Template(TemplateError::MissingVariable { .. })
        ));

        let lenient = service
            .render(RenderTemplateRequest {
                reference: "greeting".to_string(),
                strict: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(lenient.content, "Hello ");
    }

    #[tokio::test]
    async fn test_render_unknown_reference() {
        let err = service()
            .render(RenderTemplateRequest {
                reference: "missing".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_hides_template() {
        let service = service();
        let t = service.create(create_request("temp", "static")).await.unwrap();

        assert!(service.delete(t.id().as_str()).await.unwrap());
        assert!(service.get(t.id().as_str()).await.unwrap().is_none());
        assert!(service.lint(t.id().as_str()).await.is_err());
    }

    #[tokio::test]
    async fn test_lint_reports_issues() {
        let service = service();
        let t = service
            .create(create_request("loose", "Hi {name} {{x}}"))
            .await
            .unwrap();

        let issues = service.lint(t.id().as_str()).await.unwrap();
        assert!(issues.contains(&SyntaxIssue::StrayPlaceholder {
            name: "name".to_string()
        }));
    }

    #[tokio::test]
    async fn test_repository_errors_propagate() {
        let mut repo = MockPromptTemplateRepository::new();
        repo.expect_list_all()
            .returning(|_| Err(DomainError::internal("storage offline")));

        let service = PromptService::new(Arc::new(repo));
        let err = service
            .render(RenderTemplateRequest {
                reference: "any".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_save_failure_propagates() {
        let mut repo = MockPromptTemplateRepository::new();
        repo.expect_get_by_name().returning(|_, _| Ok(None));
        repo.expect_save()
            .times(1)
            .returning(|_| Err(DomainError::internal("disk full")));

        let service = PromptService::new(Arc::new(repo));
        let err = service.create(create_request("x", "static")).await.unwrap_err();
        assert!(!err.is_client_error());
    }
}
