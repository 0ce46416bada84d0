use serde::Deserialize;

use crate::domain::experiment::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MIN_SAMPLE_SIZE, DEFAULT_TRAFFIC_SPLIT,
};
use crate::infrastructure::services::ExperimentDefaults;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub render: RenderConfig,
    pub experiment: ExperimentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Template rendering settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Fail on missing required variables instead of falling back to defaults
    pub strict: bool,
}

/// Defaults for newly created experiments
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub traffic_split: u8,
    pub min_sample_size: u64,
    pub confidence_threshold: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            traffic_split: DEFAULT_TRAFFIC_SPLIT,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl From<&ExperimentConfig> for ExperimentDefaults {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            traffic_split: config.traffic_split,
            min_sample_size: config.min_sample_size,
            confidence_threshold: config.confidence_threshold,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
