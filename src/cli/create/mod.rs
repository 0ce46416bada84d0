//! Create command - drafts an experiment between two stored templates

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::render::load_templates;
use crate::config::AppConfig;
use crate::domain::experiment::{ExperimentMetric, PromptExperiment};
use crate::domain::prompt::{PromptTemplateRepository, TemplateId};
use crate::infrastructure::experiment::InMemoryExperimentRepository;
use crate::infrastructure::prompt::InMemoryPromptTemplateRepository;
use crate::infrastructure::services::{
    CreateExperimentRequest, ExperimentDefaults, ExperimentService,
};

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// JSON file holding an array of templates
    #[arg(long)]
    pub templates: PathBuf,

    /// Experiment name
    #[arg(long)]
    pub name: String,

    /// Id or name of the control template (variant A)
    #[arg(long)]
    pub prompt_a: String,

    /// Id or name of the treatment template (variant B)
    #[arg(long)]
    pub prompt_b: String,

    /// success_rate, user_rating, token_efficiency or latency
    #[arg(long, value_parser = parse_metric, default_value = "success_rate")]
    pub metric: ExperimentMetric,

    /// Percentage of traffic routed to A; configured default when omitted
    #[arg(long)]
    pub traffic_split: Option<u8>,

    /// Runs required per variant; configured default when omitted
    #[arg(long)]
    pub min_sample_size: Option<u64>,

    /// Confidence level; configured default when omitted
    #[arg(long)]
    pub confidence_threshold: Option<f64>,

    #[arg(long)]
    pub description: Option<String>,
}

/// Run the create command, printing the draft experiment as JSON
pub async fn run(args: CreateArgs, config: &AppConfig) -> anyhow::Result<()> {
    let prompts = Arc::new(load_templates(&args.templates).await?);
    let experiment = create_experiment(args, config, prompts).await?;

    info!(
        experiment_id = %experiment.id(),
        traffic_split = experiment.traffic_split(),
        "Experiment drafted"
    );
    println!("{}", serde_json::to_string_pretty(&experiment)?);
    Ok(())
}

async fn create_experiment(
    args: CreateArgs,
    config: &AppConfig,
    prompts: Arc<InMemoryPromptTemplateRepository>,
) -> anyhow::Result<PromptExperiment> {
    let prompt_a_id = resolve_template(prompts.as_ref(), &args.prompt_a).await?;
    let prompt_b_id = resolve_template(prompts.as_ref(), &args.prompt_b).await?;

    let service = ExperimentService::new(Arc::new(InMemoryExperimentRepository::new()), prompts)
        .with_defaults(ExperimentDefaults::from(&config.experiment));

    let experiment = service
        .create(CreateExperimentRequest {
            name: args.name,
            description: args.description,
            prompt_a_id: prompt_a_id.to_string(),
            prompt_b_id: prompt_b_id.to_string(),
            metric: args.metric,
            traffic_split: args.traffic_split,
            min_sample_size: args.min_sample_size,
            confidence_threshold: args.confidence_threshold,
            created_by: None,
        })
        .await?;

    Ok(experiment)
}

/// Resolve a template id, or a name to its latest version
async fn resolve_template(
    prompts: &InMemoryPromptTemplateRepository,
    reference: &str,
) -> anyhow::Result<TemplateId> {
    if let Ok(id) = TemplateId::new(reference) {
        if prompts.get_by_id(&id).await?.is_some() {
            return Ok(id);
        }
    }

    prompts
        .get_by_name(reference, None)
        .await?
        .map(|template| template.id().clone())
        .ok_or_else(|| anyhow!("Template '{}' not found", reference))
}

fn parse_metric(raw: &str) -> Result<ExperimentMetric, String> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| format!("Unknown metric '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::domain::prompt::PromptTemplate;

    async fn seeded_prompts() -> Arc<InMemoryPromptTemplateRepository> {
        let prompts = InMemoryPromptTemplateRepository::new();
        prompts
            .save(PromptTemplate::new("control", "Answer briefly").unwrap())
            .await
            .unwrap();
        prompts
            .save(PromptTemplate::new("treatment", "Answer in detail").unwrap())
            .await
            .unwrap();
        Arc::new(prompts)
    }

    fn args() -> CreateArgs {
        CreateArgs {
            templates: PathBuf::from("unused.json"),
            name: "tone".to_string(),
            prompt_a: "control".to_string(),
            prompt_b: "treatment".to_string(),
            metric: ExperimentMetric::SuccessRate,
            traffic_split: None,
            min_sample_size: None,
            confidence_threshold: None,
            description: None,
        }
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(parse_metric("latency").unwrap(), ExperimentMetric::Latency);
        assert_eq!(
            parse_metric("token_efficiency").unwrap(),
            ExperimentMetric::TokenEfficiency
        );
        assert!(parse_metric("speed").is_err());
    }

    #[tokio::test]
    async fn test_create_uses_configured_defaults() {
        let config = AppConfig {
            experiment: ExperimentConfig {
                traffic_split: 80,
                min_sample_size: 250,
                confidence_threshold: 0.99,
            },
            ..Default::default()
        };

        let experiment = create_experiment(args(), &config, seeded_prompts().await)
            .await
            .unwrap();

        assert_eq!(experiment.traffic_split(), 80);
        assert_eq!(experiment.min_sample_size(), 250);
        assert_eq!(experiment.confidence_threshold(), 0.99);
    }

    #[tokio::test]
    async fn test_create_arguments_override_config() {
        let prompts = seeded_prompts().await;
        let a = prompts.get_by_name("control", None).await.unwrap().unwrap();

        let experiment = create_experiment(
            CreateArgs {
                prompt_a: a.id().to_string(),
                traffic_split: Some(30),
                ..args()
            },
            &AppConfig::default(),
            prompts,
        )
        .await
        .unwrap();

        assert_eq!(experiment.prompt_a_id(), a.id());
        assert_eq!(experiment.traffic_split(), 30);
        assert_eq!(experiment.min_sample_size(), 100);
    }

    #[tokio::test]
    async fn test_create_unknown_template() {
        let err = create_experiment(
            CreateArgs {
                prompt_b: "missing".to_string(),
                ..args()
            },
            &AppConfig::default(),
            seeded_prompts().await,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("missing"));
    }
}
