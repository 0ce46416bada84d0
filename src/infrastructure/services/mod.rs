//! Infrastructure services

mod experiment_service;
mod prompt_service;

pub use experiment_service::{CreateExperimentRequest, ExperimentDefaults, ExperimentService};
pub use prompt_service::{
    CreateTemplateRequest, PromptService, RenderTemplateRequest, RenderedTemplate,
};
