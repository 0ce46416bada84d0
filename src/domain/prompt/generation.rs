//! Generation backend configuration attached to a template

use serde::{Deserialize, Serialize};

use super::validation::{require_non_empty, require_range, TemplateError};

/// Immutable backend configuration used when a rendered template is sent to a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GenerationConfigData", into = "GenerationConfigData")]
pub struct GenerationConfig {
    provider: String,
    model_name: String,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

impl GenerationConfig {
    /// Create a config with default sampling parameters
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let config = Self {
            provider: provider.into(),
            model_name: model_name.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Result<Self, TemplateError> {
        self.temperature = temperature;
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Result<Self, TemplateError> {
        self.max_tokens = max_tokens;
        self.validate()?;
        Ok(self)
    }

    pub fn with_top_p(mut self, top_p: f64) -> Result<Self, TemplateError> {
        self.top_p = top_p;
        self.validate()?;
        Ok(self)
    }

    pub fn with_penalties(
        mut self,
        frequency_penalty: f64,
        presence_penalty: f64,
    ) -> Result<Self, TemplateError> {
        self.frequency_penalty = frequency_penalty;
        self.presence_penalty = presence_penalty;
        self.validate()?;
        Ok(self)
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    pub fn frequency_penalty(&self) -> f64 {
        self.frequency_penalty
    }

    pub fn presence_penalty(&self) -> f64 {
        self.presence_penalty
    }

    fn validate(&self) -> Result<(), TemplateError> {
        require_non_empty("provider", &self.provider)?;
        require_non_empty("model_name", &self.model_name)?;
        require_range("temperature", self.temperature, 0.0, 2.0)?;
        require_range("top_p", self.top_p, 0.0, 1.0)?;
        require_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        require_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;

        if self.max_tokens < 1 {
            return Err(TemplateError::validation("max_tokens must be at least 1"));
        }

        Ok(())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Wire form of [`GenerationConfig`], validated on the way in
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationConfigData {
    provider: String,
    model_name: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_top_p")]
    top_p: f64,
    #[serde(default)]
    frequency_penalty: f64,
    #[serde(default)]
    presence_penalty: f64,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_top_p() -> f64 {
    1.0
}

impl TryFrom<GenerationConfigData> for GenerationConfig {
    type Error = TemplateError;

    fn try_from(data: GenerationConfigData) -> Result<Self, Self::Error> {
        let config = Self {
            provider: data.provider,
            model_name: data.model_name,
            temperature: data.temperature,
            max_tokens: data.max_tokens,
            top_p: data.top_p,
            frequency_penalty: data.frequency_penalty,
            presence_penalty: data.presence_penalty,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<GenerationConfig> for GenerationConfigData {
    fn from(config: GenerationConfig) -> Self {
        Self {
            provider: config.provider,
            model_name: config.model_name,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        }
    }
}
