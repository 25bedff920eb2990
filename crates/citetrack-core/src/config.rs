use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::provider::OPENROUTER_API_URL;
use crate::retry::RetryPolicy;

/// One provider call target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-side model slug, e.g. `perplexity/sonar:online`.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model: model.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Display alias, falling back to the slug.
    pub fn label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.model)
    }
}

fn default_provider() -> String {
    "openrouter".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("openai/gpt-oss-20b:free:online").with_label("gpt-oss-20b-free-online"),
        ModelConfig::new("anthropic/claude-3.5-haiku:online").with_label("claude-3.5-haiku-online"),
        ModelConfig::new("perplexity/sonar:online").with_label("perplexity-sonar-online"),
    ]
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    45
}

fn default_max_attempts() -> usize {
    2
}

fn default_delay_secs() -> u64 {
    8
}

fn default_endpoint() -> String {
    OPENROUTER_API_URL.to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            endpoint: default_endpoint(),
        }
    }
}

impl TrackerConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("Invalid tracker config")
    }

    /// Load from a YAML file; a missing path or file yields the defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            delay: Duration::from_secs(self.retry.delay_secs),
        }
    }

    /// Models whose slug or label is in `requested`; every model when
    /// `requested` is empty.
    pub fn resolve_models<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<ModelConfig>, EvalError> {
        let requested: Vec<&str> = requested
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        let filtered: Vec<ModelConfig> = self
            .models
            .iter()
            .filter(|m| requested.is_empty() || requested.iter().any(|r| *r == m.model || *r == m.label()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Err(EvalError::NoModels);
        }
        Ok(filtered)
    }
}
