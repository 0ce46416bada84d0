//! Domain layer - prompt templates, experiments and their invariants

pub mod error;
pub mod experiment;
pub mod prompt;

pub use error::DomainError;
pub use experiment::{ExperimentError, ExperimentId, PromptExperiment};
pub use prompt::{PromptTemplate, TemplateError, TemplateId};
