//! Prompt template domain - versioned templates with typed variables and composition

mod entity;
mod generation;
mod repository;
mod resolver;
mod template;
mod validation;
mod variable;

pub use entity::{PromptTemplate, PromptTemplateBuilder, TemplateId, TemplateUpdate};
pub use generation::GenerationConfig;
pub use repository::{PromptTemplateRepository, TemplateQuery};
pub use resolver::TemplateRegistry;
pub use template::{extract_includes, extract_variables, lint, SyntaxIssue};
pub use validation::{is_valid_identifier, TemplateError};
pub use variable::{render_value, VariableDefinition, VariableType};

#[cfg(test)]
pub use repository::MockPromptTemplateRepository;
