//! CLI module for PMP Prompt Lab
//!
//! Subcommands operate on JSON files holding serialized templates and
//! experiments:
//! - `render`: render a template with includes and inherited variables
//! - `lint`: report brace problems in templates
//! - `create`: draft an experiment with the configured defaults
//! - `assign`: show which variant a user lands in
//! - `analyze`: significance report for an experiment

pub mod analyze;
pub mod assign;
pub mod create;
pub mod lint;
pub mod render;

use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// PMP Prompt Lab - versioned prompt templates and A/B experiments
#[derive(Parser)]
#[command(name = "pmp-prompt-lab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render a template from a template collection
    Render(render::RenderArgs),

    /// Lint templates for unbalanced braces and stray placeholders
    Lint(lint::LintArgs),

    /// Draft an experiment between two templates
    Create(create::CreateArgs),

    /// Assign a user to an experiment variant
    Assign(assign::AssignArgs),

    /// Analyze an experiment's results
    Analyze(analyze::AnalyzeArgs),
}

/// Load `.env`, configuration and logging shared by every subcommand
pub fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    config
}

/// Read and deserialize a JSON file
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
