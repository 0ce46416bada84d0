//! Lint command - reports brace problems in templates

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use super::render::load_templates;
use crate::domain::prompt::TemplateQuery;
use crate::infrastructure::services::PromptService;

#[derive(Args, Debug, Clone)]
pub struct LintArgs {
    /// JSON file holding an array of templates
    #[arg(long)]
    pub templates: PathBuf,
}

/// Run the lint command, printing one line per issue
pub async fn run(args: LintArgs) -> anyhow::Result<()> {
    let service = PromptService::new(Arc::new(load_templates(&args.templates).await?));
    let mut total = 0;

    for template in service.list(&TemplateQuery::new()).await? {
        for issue in service.lint(template.id().as_str()).await? {
            println!("{} v{}: {}", template.name(), template.version(), issue);
            total += 1;
        }
    }

    if total == 0 {
        println!("No issues found");
    }

    Ok(())
}
