//! Prompt template entity and related types

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::generation::GenerationConfig;
use super::resolver::TemplateRegistry;
use super::template::{self, SyntaxIssue};
use super::validation::{is_valid_identifier, require_non_empty, TemplateError};
use super::variable::{render_value, VariableDefinition};

/// Template identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemplateId(String);

impl TemplateId {
    /// Create a TemplateId from an existing value
    pub fn new(id: impl Into<String>) -> Result<Self, TemplateError> {
        let id = id.into();
        require_non_empty("id", &id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TemplateId {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TemplateId> for String {
    fn from(id: TemplateId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A versioned, immutable prompt template
///
/// Every edit produces a new entity through [`PromptTemplate::create_new_version`],
/// so templates sharing a `name` form a linear version chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PromptTemplateData", into = "PromptTemplateData")]
pub struct PromptTemplate {
    id: TemplateId,
    name: String,
    description: Option<String>,
    content: String,
    variables: Vec<VariableDefinition>,
    generation_config: GenerationConfig,
    extends: Vec<String>,
    version: u32,
    parent_version_id: Option<TemplateId>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    /// Create a version 1 template, detecting variables from the content
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Result<Self, TemplateError> {
        Self::builder(name, content).build()
    }

    /// Start building a version 1 template
    pub fn builder(name: impl Into<String>, content: impl Into<String>) -> PromptTemplateBuilder {
        PromptTemplateBuilder::new(name, content)
    }

    // Getters

    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn extends(&self) -> &[String] {
        &self.extends
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn parent_version_id(&self) -> Option<&TemplateId> {
        self.parent_version_id.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Look up a variable definition by name
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name() == name)
    }

    /// Variables that must be supplied under strict rendering
    pub fn required_variables(&self) -> Vec<&VariableDefinition> {
        self.variables.iter().filter(|v| v.is_required()).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    // Lexical inspection

    /// Names of the `{{var}}` markers present in the content
    pub fn extract_variables(&self) -> Vec<String> {
        template::extract_variables(&self.content)
    }

    /// References of the `{{> other}}` directives present in the content
    pub fn includes(&self) -> Vec<String> {
        template::extract_includes(&self.content)
    }

    pub fn has_includes(&self) -> bool {
        !self.includes().is_empty()
    }

    /// Lint the content for brace problems; never fails
    pub fn validate_syntax(&self) -> Vec<SyntaxIssue> {
        template::lint(&self.content)
    }

    // Rendering

    /// Render this template's own content with its own variables
    pub fn render(
        &self,
        values: &HashMap<String, Value>,
        strict: bool,
    ) -> Result<String, TemplateError> {
        render_content(&self.content, &self.variables, values, strict)
    }

    /// Inline every inclusion directive, recursively
    pub fn resolve_content<'a>(
        &'a self,
        registry: &TemplateRegistry<'a>,
    ) -> Result<String, TemplateError> {
        registry.resolve_content(self)
    }

    /// Merge variables from `extends` parents and included templates
    pub fn resolve_variables<'a>(
        &'a self,
        registry: &TemplateRegistry<'a>,
    ) -> Result<Vec<VariableDefinition>, TemplateError> {
        registry.resolve_variables(self)
    }

    /// Render with includes inlined and inherited variables merged
    pub fn render_with_inheritance<'a>(
        &'a self,
        values: &HashMap<String, Value>,
        registry: &TemplateRegistry<'a>,
        strict: bool,
    ) -> Result<String, TemplateError> {
        let content = registry.resolve_content(self)?;
        let variables = registry.resolve_variables(self)?;
        render_content(&content, &variables, values, strict)
    }

    // Versioning

    /// Derive the next version of this template
    ///
    /// The new entity gets a fresh id, `version + 1` and `parent_version_id`
    /// pointing at this template. Fields not overridden are copied.
    pub fn create_new_version(&self, update: TemplateUpdate) -> Result<Self, TemplateError> {
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| TemplateError::validation("version overflow"))?;
        let now = Utc::now();
        let next = Self {
            id: TemplateId::generate(),
            name: update.name.unwrap_or_else(|| self.name.clone()),
            description: update.description.or_else(|| self.description.clone()),
            content: update.content.unwrap_or_else(|| self.content.clone()),
            variables: update.variables.unwrap_or_else(|| self.variables.clone()),
            generation_config: update
                .generation_config
                .unwrap_or_else(|| self.generation_config.clone()),
            extends: update.extends.unwrap_or_else(|| self.extends.clone()),
            version,
            parent_version_id: Some(self.id.clone()),
            tags: update.tags.unwrap_or_else(|| self.tags.clone()),
            created_at: now,
            updated_at: now,
        };
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> Result<(), TemplateError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("content", &self.content)?;

        if self.version < 1 {
            return Err(TemplateError::validation("version must be at least 1"));
        }

        let mut seen = HashSet::new();

        for var in &self.variables {
            if !is_valid_identifier(var.name()) {
                return Err(TemplateError::validation(format!(
                    "Invalid variable name: '{}'",
                    var.name()
                )));
            }

            if !seen.insert(var.name()) {
                return Err(TemplateError::validation(format!(
                    "Duplicate variable definition: '{}'",
                    var.name()
                )));
            }
        }

        // Include directives defer variable checks to the referenced templates
        if !self.has_includes() {
            for marker in self.extract_variables() {
                if !seen.contains(marker.as_str()) {
                    return Err(TemplateError::validation(format!(
                        "Variable '{}' is used in content but not defined",
                        marker
                    )));
                }
            }
        }

        if self.extends.iter().any(|parent| parent == self.id.as_str()) {
            return Err(TemplateError::validation(format!(
                "Template '{}' cannot extend itself",
                self.id
            )));
        }

        Ok(())
    }
}

/// Substitute resolved, coerced values into content
fn render_content(
    content: &str,
    variables: &[VariableDefinition],
    values: &HashMap<String, Value>,
    strict: bool,
) -> Result<String, TemplateError> {
    let mut rendered = HashMap::with_capacity(variables.len());

    for var in variables {
        let value = match values.get(var.name()) {
            Some(value) => Some(value),
            None if var.is_required() && strict => {
                return Err(TemplateError::MissingVariable {
                    name: var.name().to_string(),
                });
            }
            None => var.default_value(),
        };

        let text = match value {
            Some(value) => render_value(&var.coerce(value)?),
            None => String::new(),
        };

        rendered.insert(var.name().to_string(), text);
    }

    Ok(template::substitute_variables(content, &rendered))
}

/// Builder for version 1 templates
#[derive(Debug, Clone)]
pub struct PromptTemplateBuilder {
    id: Option<TemplateId>,
    name: String,
    content: String,
    description: Option<String>,
    variables: Option<Vec<VariableDefinition>>,
    generation_config: GenerationConfig,
    extends: Vec<String>,
    tags: Vec<String>,
}

impl PromptTemplateBuilder {
    fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            content: content.into(),
            description: None,
            variables: None,
            generation_config: GenerationConfig::default(),
            extends: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: TemplateId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Explicit variable definitions; without them markers become required strings
    pub fn with_variables(mut self, variables: Vec<VariableDefinition>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_variable(mut self, variable: VariableDefinition) -> Self {
        self.variables.get_or_insert_with(Vec::new).push(variable);
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    pub fn with_extends(mut self, extends: Vec<String>) -> Self {
        self.extends = extends;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn build(self) -> Result<PromptTemplate, TemplateError> {
        let variables = match self.variables {
            Some(variables) => variables,
            None => template::extract_variables(&self.content)
                .into_iter()
                .map(VariableDefinition::string)
                .collect(),
        };

        let now = Utc::now();
        let template = PromptTemplate {
            id: self.id.unwrap_or_else(TemplateId::generate),
            name: self.name,
            description: self.description,
            content: self.content,
            variables,
            generation_config: self.generation_config,
            extends: self.extends,
            version: 1,
            parent_version_id: None,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        };
        template.validate()?;
        Ok(template)
    }
}

/// Field overrides for [`PromptTemplate::create_new_version`]
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub variables: Option<Vec<VariableDefinition>>,
    pub generation_config: Option<GenerationConfig>,
    pub tags: Option<Vec<String>>,
    pub extends: Option<Vec<String>>,
}

impl TemplateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_variables(mut self, variables: Vec<VariableDefinition>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_extends(mut self, extends: Vec<String>) -> Self {
        self.extends = Some(extends);
        self
    }
}

/// Wire form of [`PromptTemplate`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptTemplateData {
    #[serde(default = "TemplateId::generate")]
    id: TemplateId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    content: String,
    #[serde(default)]
    variables: Vec<VariableDefinition>,
    #[serde(default)]
    generation_config: GenerationConfig,
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default = "first_version")]
    version: u32,
    #[serde(default)]
    parent_version_id: Option<TemplateId>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn first_version() -> u32 {
    1
}

impl TryFrom<PromptTemplateData> for PromptTemplate {
    type Error = TemplateError;

    fn try_from(data: PromptTemplateData) -> Result<Self, Self::Error> {
        let template = Self {
            id: data.id,
            name: data.name,
            description: data.description,
            content: data.content,
            variables: data.variables,
            generation_config: data.generation_config,
            extends: data.extends,
            version: data.version,
            parent_version_id: data.parent_version_id,
            tags: data.tags,
            created_at: data.created_at,
            updated_at: data.updated_at,
        };
        template.validate()?;
        Ok(template)
    }
}

impl From<PromptTemplate> for PromptTemplateData {
    fn from(template: PromptTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name,
            description: template.description,
            content: template.content,
            variables: template.variables,
            generation_config: template.generation_config,
            extends: template.extends,
            version: template.version,
            parent_version_id: template.parent_version_id,
            tags: template.tags,
            created_at: template.created_at,
            updated_at: template.updated_at,
        }
    }
}
