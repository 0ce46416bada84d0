//! Render command - renders one template from a JSON template collection

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::read_json;
use crate::config::AppConfig;
use crate::domain::prompt::{PromptTemplate, PromptTemplateRepository};
use crate::infrastructure::prompt::InMemoryPromptTemplateRepository;
use crate::infrastructure::services::{PromptService, RenderTemplateRequest};

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// JSON file holding an array of templates
    #[arg(long)]
    pub templates: PathBuf,

    /// Id or name of the template to render
    #[arg(long)]
    pub template: String,

    /// JSON file holding an object of variable values
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// Variable value as name=value; the value is parsed as JSON when possible
    #[arg(long = "var")]
    pub vars: Vec<String>,

    /// Fall back to defaults instead of failing on missing required variables
    #[arg(long)]
    pub lenient: bool,
}

/// Run the render command
pub async fn run(args: RenderArgs, config: &AppConfig) -> anyhow::Result<()> {
    let repository = Arc::new(load_templates(&args.templates).await?);
    let service = PromptService::new(repository).with_strict(config.render.strict);

    let mut values: HashMap<String, Value> = match &args.values {
        Some(path) => read_json(path)?,
        None => HashMap::new(),
    };

    for pair in &args.vars {
        let (name, value) = parse_var(pair)?;
        values.insert(name, value);
    }

    let rendered = service
        .render(RenderTemplateRequest {
            reference: args.template,
            values,
            strict: args.lenient.then_some(false),
        })
        .await?;

    info!(
        template_id = %rendered.template_id,
        version = rendered.version,
        "Template rendered"
    );
    println!("{}", rendered.content);
    Ok(())
}

/// Load a JSON template array into an in-memory repository
pub(crate) async fn load_templates(
    path: &std::path::Path,
) -> anyhow::Result<InMemoryPromptTemplateRepository> {
    let templates: Vec<PromptTemplate> = read_json(path)?;
    let repository = InMemoryPromptTemplateRepository::new();

    for template in templates {
        let name = template.name().to_string();
        repository
            .save(template)
            .await
            .with_context(|| format!("Failed to load template '{}'", name))?;
    }

    Ok(repository)
}

fn parse_var(pair: &str) -> anyhow::Result<(String, Value)> {
    let (name, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected name=value, got '{}'", pair))?;

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.trim().to_string(), value))
}
