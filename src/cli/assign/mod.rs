//! Assign command - shows the variant a user is routed to

use std::path::PathBuf;

use clap::Args;

use super::read_json;
use crate::domain::experiment::PromptExperiment;

#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    /// JSON file holding one experiment
    #[arg(long)]
    pub experiment: PathBuf,

    /// User identifier
    #[arg(long)]
    pub user: String,

    /// Optional session identifier
    #[arg(long)]
    pub session: Option<String>,
}

/// Run the assign command, printing the assignment as JSON
pub fn run(args: AssignArgs) -> anyhow::Result<()> {
    let experiment: PromptExperiment = read_json(&args.experiment)?;
    let assignment = experiment.assign_variant(&args.user, args.session.as_deref());

    println!("{}", serde_json::to_string_pretty(&assignment)?);
    Ok(())
}
