//! Analyze command - significance report for an experiment

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use super::read_json;
use crate::domain::experiment::PromptExperiment;
use crate::infrastructure::experiment::analyze;

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// JSON file holding one experiment
    #[arg(long)]
    pub experiment: PathBuf,
}

/// Run the analyze command, printing the report as JSON
pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let experiment: PromptExperiment = read_json(&args.experiment)?;
    let analysis = analyze(&experiment);

    info!(
        experiment_id = %analysis.experiment_id,
        "{}",
        analysis.recommendation
    );
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
